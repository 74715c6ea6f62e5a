// tisdk-core/src/install/sdk.rs
//! Resolve, download, extract and place an SDK.

use std::path::{Path, PathBuf};

use regex::Regex;
use tisdk_common::config::{expand_path, Config};
use tisdk_common::error::{Result, TiError};
use tisdk_common::platform;
use tisdk_common::progress::{ProgressCallback, ProgressTracker};
use tisdk_net::{build_http_client, download_file};
use tracing::{debug, info};

use super::{
    close_temp_dir, discard_download, extract_in_background, place, run_blocking, staging_dir,
    ArchiveEntry, EntryInspector,
};
use crate::installed::InstalledSdk;
use crate::resolve::{classify_uri, resolve_sdk, validate_local_zip, ArtifactSource, UriKind};

pub const TASK_DOWNLOAD: &str = "Downloading SDK";
pub const TASK_EXTRACT: &str = "Extracting SDK";
pub const TASK_INSTALL: &str = "Installing SDK";
pub const TASK_MODULES: &str = "Installing bundled modules";

/// Parameters of a single SDK install.
#[derive(Default)]
pub struct InstallRequest {
    /// Release version, CI branch, `branch:commit`, build name, commit hash, local zip
    /// or URL. `None` installs the latest release.
    pub uri: Option<String>,
    /// Install root; the first configured install path when `None`.
    pub install_dir: Option<PathBuf>,
    /// Where downloads are written; the system temp dir when `None`.
    pub download_dir: Option<PathBuf>,
    pub overwrite: bool,
    /// Keep the downloaded archive after installing.
    pub keep: bool,
    pub on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for InstallRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallRequest")
            .field("uri", &self.uri)
            .field("install_dir", &self.install_dir)
            .field("download_dir", &self.download_dir)
            .field("overwrite", &self.overwrite)
            .field("keep", &self.keep)
            .finish_non_exhaustive()
    }
}

/// Records the SDK name from the first `mobilesdk/<os>/<name>` entry and fails as soon as
/// that SDK is known to exist already.
struct SdkLayoutCheck {
    pattern: Regex,
    sdk_dir: PathBuf,
    overwrite: bool,
    name: Option<String>,
}

impl SdkLayoutCheck {
    fn new(sdk_dir: PathBuf, overwrite: bool) -> Result<Self> {
        let os = regex::escape(platform::os_name());
        let pattern = Regex::new(&format!(r"^mobilesdk[/\\]{os}[/\\]([^/\\]+)"))
            .map_err(|e| TiError::Generic(format!("Invalid SDK path pattern: {e}")))?;
        Ok(Self {
            pattern,
            sdk_dir,
            overwrite,
            name: None,
        })
    }
}

impl EntryInspector for SdkLayoutCheck {
    fn on_entry(&mut self, entry: &ArchiveEntry) -> Result<()> {
        if self.name.is_some() {
            return Ok(());
        }
        let Some(caps) = self.pattern.captures(&entry.name) else {
            return Ok(());
        };
        let name = caps[1].to_string();
        let dest = self.sdk_dir.join(&name);
        if !self.overwrite && dest.is_dir() {
            return Err(TiError::AlreadyExists {
                message: format!("SDK \"{}\" already exists: {}", name, dest.display()),
                path: dest,
            });
        }
        self.name = Some(name);
        Ok(())
    }
}

fn task_list(download: bool) -> Vec<String> {
    let tasks = [TASK_DOWNLOAD, TASK_EXTRACT, TASK_INSTALL, TASK_MODULES];
    let skip = usize::from(!download);
    tasks.iter().skip(skip).map(|t| t.to_string()).collect()
}

/// Installs an SDK and returns it as read back from its final location.
///
/// The extraction directory is always removed. The downloaded archive is removed unless
/// `keep` is set, whether or not the install succeeded.
pub async fn install_sdk(config: &Config, request: InstallRequest) -> Result<InstalledSdk> {
    let InstallRequest {
        uri,
        install_dir,
        download_dir,
        overwrite,
        keep,
        on_progress,
    } = request;

    let install_root = match install_dir {
        Some(dir) => expand_path(&dir),
        None => config.default_install_path()?,
    };
    // Local archives never touch the network configuration.
    let (source, client) = match classify_uri(uri.as_deref()) {
        UriKind::File(file) => (ArtifactSource::LocalFile(validate_local_zip(&file)?), None),
        _ => {
            let client = build_http_client(&config.network)?;
            let source = resolve_sdk(uri.as_deref(), config, &client).await?;
            (source, Some(client))
        }
    };

    let mut tracker = ProgressTracker::new(
        on_progress,
        task_list(matches!(source, ArtifactSource::Download(_))),
    );

    let (archive, downloaded) = match source {
        ArtifactSource::LocalFile(file) => (file, None),
        ArtifactSource::Download(url) => {
            let client = match client {
                Some(client) => client,
                None => build_http_client(&config.network)?,
            };
            tracker.start_task(true);
            let file =
                download_file(&client, &url, download_dir.as_deref(), &mut tracker).await?;
            tracker.end_task();
            (file.clone(), Some(file))
        }
    };

    let result = install_archive(config, &archive, &install_root, overwrite, tracker).await;
    discard_download(downloaded.as_deref(), keep).await;
    result
}

async fn install_archive(
    config: &Config,
    archive: &Path,
    install_root: &Path,
    overwrite: bool,
    tracker: ProgressTracker,
) -> Result<InstalledSdk> {
    let temp_dir = staging_dir(install_root)?;
    let result = extract_and_place(
        config,
        archive,
        temp_dir.path(),
        install_root,
        overwrite,
        tracker,
    )
    .await;
    close_temp_dir(temp_dir);
    result
}

async fn extract_and_place(
    config: &Config,
    archive: &Path,
    temp: &Path,
    install_root: &Path,
    overwrite: bool,
    tracker: ProgressTracker,
) -> Result<InstalledSdk> {
    let sdk_dir = config.sdk_dir(install_root);
    let modules_dir = config.modules_dir(install_root);
    let check = SdkLayoutCheck::new(sdk_dir.clone(), overwrite)?;

    debug!("Extracting {} => {}", archive.display(), temp.display());
    let (mut tracker, check) =
        extract_in_background(archive.to_path_buf(), temp.to_path_buf(), tracker, check).await?;

    let name = check.name.ok_or_else(|| {
        TiError::Archive("Zip file does not appear to contain an SDK".to_string())
    })?;

    let temp = temp.to_path_buf();
    run_blocking(move || {
        tracker.start_task(false);
        let extracted_sdk = temp.join("mobilesdk").join(platform::os_name()).join(&name);
        let sdk_path = place::place_sdk(&extracted_sdk, &sdk_dir, &name)?;
        tracker.end_task();

        tracker.start_task(true);
        let extracted_modules = temp.join("modules");
        let moved = if extracted_modules.is_dir() {
            place::place_bundled_modules(
                &extracted_modules,
                &modules_dir,
                overwrite,
                &mut tracker,
            )?
        } else {
            Vec::new()
        };
        tracker.end_task();
        debug!("Installed {} bundled module(s)", moved.len());

        info!("Installed SDK {} to {}", name, sdk_path.display());
        InstalledSdk::load(&sdk_path)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::EntryKind;

    fn entry(name: &str) -> ArchiveEntry {
        ArchiveEntry {
            name: name.to_string(),
            path: PathBuf::from(name),
            mode: 0o100644,
            attributes: 0,
            kind: EntryKind::File,
        }
    }

    #[test]
    fn task_list_drops_download_for_local_files() {
        assert_eq!(
            task_list(true),
            vec![TASK_DOWNLOAD, TASK_EXTRACT, TASK_INSTALL, TASK_MODULES]
        );
        assert_eq!(task_list(false), vec![TASK_EXTRACT, TASK_INSTALL, TASK_MODULES]);
    }

    #[test]
    fn layout_check_records_first_sdk_name() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut check = SdkLayoutCheck::new(tmp.path().to_path_buf(), false).unwrap();
        let os = platform::os_name();

        check.on_entry(&entry("modules/android/x/1.0.0/manifest")).unwrap();
        assert_eq!(check.name, None);
        check
            .on_entry(&entry(&format!("mobilesdk/{os}/8.0.0.GA/manifest.json")))
            .unwrap();
        check
            .on_entry(&entry(&format!("mobilesdk/{os}/other/manifest.json")))
            .unwrap();
        assert_eq!(check.name.as_deref(), Some("8.0.0.GA"));
    }

    #[test]
    fn layout_check_rejects_existing_sdk() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("8.0.0.GA")).unwrap();
        let os = platform::os_name();
        let name = format!("mobilesdk/{os}/8.0.0.GA/");

        let mut check = SdkLayoutCheck::new(tmp.path().to_path_buf(), false).unwrap();
        let err = check.on_entry(&entry(&name)).unwrap_err();
        assert_eq!(err.code(), "EEXIST");
        assert!(err.to_string().starts_with("SDK \"8.0.0.GA\" already exists: "));

        let mut check = SdkLayoutCheck::new(tmp.path().to_path_buf(), true).unwrap();
        check.on_entry(&entry(&name)).unwrap();
    }
}
