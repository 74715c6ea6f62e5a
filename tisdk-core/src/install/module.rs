// tisdk-core/src/install/module.rs
//! Installs module and plugin archives that carry no SDK.

use std::path::{Path, PathBuf};

use tisdk_common::config::{expand_path, Config};
use tisdk_common::error::Result;
use tisdk_common::progress::{ProgressCallback, ProgressTracker};
use tisdk_net::{build_http_client, download_file};
use tracing::{debug, info, warn};

use super::{
    close_temp_dir, discard_download, extract_in_background, place, run_blocking, staging_dir,
    AcceptAll,
};
use crate::installed::InstalledModule;
use crate::resolve::{resolve_module, ArtifactSource};

pub const TASK_DOWNLOAD: &str = "Downloading module";
pub const TASK_EXTRACT: &str = "Extracting module";
pub const TASK_INSTALL: &str = "Installing module";

#[derive(Default)]
pub struct ModuleInstallRequest {
    /// Local zip path, `file://` URI or `http(s)` URL.
    pub uri: String,
    pub install_dir: Option<PathBuf>,
    pub download_dir: Option<PathBuf>,
    pub overwrite: bool,
    pub keep: bool,
    pub on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for ModuleInstallRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstallRequest")
            .field("uri", &self.uri)
            .field("install_dir", &self.install_dir)
            .field("download_dir", &self.download_dir)
            .field("overwrite", &self.overwrite)
            .field("keep", &self.keep)
            .finish_non_exhaustive()
    }
}

/// Installs every module and plugin in the archive and returns the installed modules.
pub async fn install_module(
    config: &Config,
    request: ModuleInstallRequest,
) -> Result<Vec<InstalledModule>> {
    let source = resolve_module(&request.uri)?;
    let install_root = match &request.install_dir {
        Some(dir) => expand_path(dir),
        None => config.default_install_path()?,
    };

    let download = matches!(source, ArtifactSource::Download(_));
    let tasks = [TASK_DOWNLOAD, TASK_EXTRACT, TASK_INSTALL]
        .iter()
        .skip(usize::from(!download))
        .map(|t| t.to_string())
        .collect();
    let mut tracker = ProgressTracker::new(request.on_progress, tasks);

    let (archive, downloaded) = match source {
        ArtifactSource::LocalFile(file) => (file, None),
        ArtifactSource::Download(url) => {
            let client = build_http_client(&config.network)?;
            tracker.start_task(true);
            let file =
                download_file(&client, &url, request.download_dir.as_deref(), &mut tracker)
                    .await?;
            tracker.end_task();
            (file.clone(), Some(file))
        }
    };

    let result =
        install_archive(config, &archive, &install_root, request.overwrite, tracker).await;
    discard_download(downloaded.as_deref(), request.keep).await;
    result
}

async fn install_archive(
    config: &Config,
    archive: &Path,
    install_root: &Path,
    overwrite: bool,
    tracker: ProgressTracker,
) -> Result<Vec<InstalledModule>> {
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
) -> Result<Vec<InstalledModule>> {
    debug!("Extracting {} => {}", archive.display(), temp.display());
    let (mut tracker, _) =
        extract_in_background(archive.to_path_buf(), temp.to_path_buf(), tracker, AcceptAll)
            .await?;

    let temp = temp.to_path_buf();
    let modules_dir = config.modules_dir(install_root);
    let plugins_dir = config.plugins_dir(install_root);
    run_blocking(move || {
        tracker.start_task(false);
        let dirs = place::place_module_tree(&temp, &modules_dir, &plugins_dir, overwrite)?;
        tracker.end_task();

        let mut modules = Vec::new();
        for dir in dirs {
            match InstalledModule::load(&dir) {
                Ok(module) => {
                    info!(
                        "Installed module {}@{} ({})",
                        module.moduleid, module.version, module.platform
                    );
                    modules.push(module);
                }
                Err(e) => warn!("Installed {} but could not read it back: {}", dir.display(), e),
            }
        }
        Ok(modules)
    })
    .await
}
