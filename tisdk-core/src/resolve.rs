// tisdk-core/src/resolve.rs
//! Turns an install URI into a local archive or a download URL.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use tisdk_common::config::{expand_path, Config};
use tisdk_common::error::{Result, TiError};
use tisdk_common::model::release::LATEST;
use tisdk_net::{fetch_branches, fetch_builds, fetch_releases};
use tracing::debug;

static URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://.+)|(?:file://(.+))$").expect("URI regex is valid")
});
static BRANCH_COMMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_]+?):(.+)$").expect("branch:commit regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriKind {
    Url(String),
    File(PathBuf),
    /// Release version, CI branch, `branch:commit`, build name or commit hash.
    Selector(String),
}

/// Classifies an install URI. `file://` URIs and paths that exist on disk are files,
/// `http(s)://` URIs are URLs, anything else is a selector. No URI means `latest`.
pub fn classify_uri(uri: Option<&str>) -> UriKind {
    let uri = uri.unwrap_or_default().trim();
    let caps = URI_RE.captures(uri);

    if let Some(file) = caps.as_ref().and_then(|c| c.get(2)) {
        return UriKind::File(PathBuf::from(file.as_str()));
    }
    if !uri.is_empty() && Path::new(uri).exists() {
        return UriKind::File(PathBuf::from(uri));
    }
    if let Some(url) = caps.as_ref().and_then(|c| c.get(1)) {
        return UriKind::Url(url.as_str().to_string());
    }
    if uri.is_empty() {
        UriKind::Selector(LATEST.to_string())
    } else {
        UriKind::Selector(uri.to_string())
    }
}

/// Checks that a local archive exists and carries a `.zip` extension.
pub fn validate_local_zip(file: &Path) -> Result<PathBuf> {
    let file = expand_path(file);
    if !file.exists() {
        return Err(TiError::NotFound(format!(
            "Specified file URI does not exist: {}",
            file.display()
        )));
    }
    if !file.to_string_lossy().ends_with(".zip") {
        return Err(TiError::NotFound(format!(
            "Specified file URI is not a zip file: {}",
            file.display()
        )));
    }
    Ok(file)
}

/// Where an archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    LocalFile(PathBuf),
    Download(String),
}

/// Resolves an SDK install URI against the local filesystem, the release catalog and
/// the CI build catalogs, in that order.
///
/// Branches are searched one at a time and the first match wins.
pub async fn resolve_sdk(
    uri: Option<&str>,
    config: &Config,
    client: &Client,
) -> Result<ArtifactSource> {
    let selector = match classify_uri(uri) {
        UriKind::File(file) => return validate_local_zip(&file).map(ArtifactSource::LocalFile),
        UriKind::Url(url) => {
            debug!("URI is a URL: {}", url);
            return Ok(ArtifactSource::Download(url));
        }
        UriKind::Selector(selector) => selector,
    };

    let releases = fetch_releases(client, &config.urls).await?;
    if let Some(release) = releases.lookup(&selector) {
        debug!("URI is a release: {} => {}", release.label, release.url);
        return Ok(ArtifactSource::Download(release.url.clone()));
    }

    let branch_set = fetch_branches(client, &config.urls).await?;
    let (branches, target) = if let Some(caps) = BRANCH_COMMIT_RE.captures(&selector) {
        let branch = caps[1].to_string();
        debug!("URI is a branch:hash combo: {}", selector);
        if !branch_set.contains(&branch) {
            return Err(TiError::NotFound(format!("Invalid branch \"{branch}\"")));
        }
        (vec![branch], caps[2].to_string())
    } else if branch_set.contains(&selector) {
        debug!("URI is a branch: {}:{}", selector, LATEST);
        (vec![selector.clone()], LATEST.to_string())
    } else {
        (branch_set.search_order(), selector.clone())
    };

    if branches.len() > 1 {
        debug!("Scanning {} branches for {}", branches.len(), target);
    }
    for branch in &branches {
        let builds = fetch_builds(client, &config.urls, branch).await?;
        if let Some(build) = builds.find(&target) {
            debug!("Found CI build {} on {}: {}", build.name, branch, build.url);
            return Ok(ArtifactSource::Download(build.url.clone()));
        }
    }

    Err(TiError::NotFound(format!(
        "Unable to find any SDK releases or CI builds that match \"{}\"",
        uri.unwrap_or_default()
    )))
}

/// Resolves a module install URI. Modules have no catalog, so only files and URLs are
/// accepted.
pub fn resolve_module(uri: &str) -> Result<ArtifactSource> {
    match classify_uri(Some(uri)) {
        UriKind::File(file) => validate_local_zip(&file).map(ArtifactSource::LocalFile),
        UriKind::Url(url) => Ok(ArtifactSource::Download(url)),
        UriKind::Selector(_) if uri.trim().is_empty() => {
            Err(TiError::Validation("Expected a module URI".to_string()))
        }
        UriKind::Selector(selector) => Err(TiError::NotFound(format!(
            "Module URI must be a zip file or a URL: \"{selector}\""
        ))),
    }
}
