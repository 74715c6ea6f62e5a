// tisdk-net/src/catalog.rs
//! Release and CI-build catalogs.

use std::sync::LazyLock;

use chrono::{NaiveDate, TimeZone, Utc};
use regex::Regex;
use reqwest::Client;
use tisdk_common::config::CatalogUrls;
use tisdk_common::error::{Result, TiError};
use tisdk_common::model::build::RawBuild;
use tisdk_common::model::release::ReleaseIndex;
use tisdk_common::model::{BranchSet, BuildCatalog, CiBuild, ReleaseCatalog};
use tisdk_common::platform;
use tracing::debug;

use crate::http::fetch_json;

/// `mobilesdk-<version>.v<YYYYMMDDhhmmss>-<os>...`
static CI_BUILD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^mobilesdk-(.+)(?:\.v|-)((\d{4})(\d{2})(\d{2})(\d{2})(\d{2})(\d{2}))-([^.]+)")
        .expect("CI build filename regex is valid")
});

pub async fn fetch_releases(client: &Client, urls: &CatalogUrls) -> Result<ReleaseCatalog> {
    let index: ReleaseIndex = fetch_json(client, &urls.releases).await?;
    let catalog = ReleaseCatalog::from_index(index, platform::os_name(), platform::is_64bit());
    debug!("Received {} release(s) for {}", catalog.len(), platform::os_name());
    Ok(catalog)
}

pub async fn fetch_branches(client: &Client, urls: &CatalogUrls) -> Result<BranchSet> {
    fetch_json(client, &urls.branches).await
}

pub async fn fetch_builds(client: &Client, urls: &CatalogUrls, branch: &str) -> Result<BuildCatalog> {
    if branch.is_empty() {
        return Err(TiError::Validation("Expected branch to be a non-empty string".into()));
    }
    let raw: Vec<RawBuild> = fetch_json(client, &urls.builds_url(branch)).await?;
    debug!("Received {} build(s) for branch {}", raw.len(), branch);
    Ok(parse_builds(raw, platform::os_name(), urls))
}

/// Keeps `mobile` builds for `os` whose filename follows the CI naming scheme.
pub fn parse_builds(raw: Vec<RawBuild>, os: &str, urls: &CatalogUrls) -> BuildCatalog {
    let os_marker = format!("-{os}");
    let builds = raw
        .into_iter()
        .filter_map(|build| {
            let filename = build.filename.as_deref()?;
            if build.build_type != "mobile" || !filename.contains(&os_marker) {
                return None;
            }
            let caps = CI_BUILD_RE.captures(filename)?;
            let version = caps[1].to_string();
            let ts = caps[2].to_string();
            let num = |i: usize| caps[i].parse::<u32>().ok();

            let date = NaiveDate::from_ymd_opt(num(3)? as i32, num(4)?, num(5)?)
                .and_then(|d| d.and_hms_opt(num(6)?, num(7)?, num(8)?))
                .map(|naive| Utc.from_utc_datetime(&naive))?;

            Some(CiBuild {
                name: format!("{version}.v{ts}"),
                url: urls.build_url(&build.git_branch, filename),
                version,
                ts,
                branch: build.git_branch,
                githash: build.git_revision,
                date,
            })
        })
        .collect();
    BuildCatalog::new(builds)
}
