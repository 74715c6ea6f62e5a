// tisdk-core/src/install/mod.rs
//! SDK and module installation: extraction, placement and the pipelines that drive them.

use std::fs;
use std::path::{Path, PathBuf};

use tisdk_common::error::{Result, TiError};
use tisdk_common::progress::ProgressTracker;
use tracing::{debug, warn};

pub mod extract;
pub mod module;
pub mod place;
pub mod sdk;

pub use extract::{extract_zip, ArchiveEntry, EntryKind};
pub use module::{install_module, ModuleInstallRequest};
pub use sdk::{install_sdk, InstallRequest};

/// Looks at each archive entry before it is written and may veto the extraction.
pub trait EntryInspector: Send + 'static {
    fn on_entry(&mut self, entry: &ArchiveEntry) -> Result<()>;
}

/// Accepts every entry.
#[derive(Debug, Default)]
pub struct AcceptAll;

impl EntryInspector for AcceptAll {
    fn on_entry(&mut self, _entry: &ArchiveEntry) -> Result<()> {
        Ok(())
    }
}

/// Prefix of the staging directory created inside the install root.
pub const STAGING_PREFIX: &str = ".tisdk-";

/// Runs blocking filesystem work on tokio's blocking pool.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| TiError::Generic(format!("Blocking task failed: {e}")))?
}

/// Creates the extraction directory inside `install_root`, so placing the extracted
/// tree is a rename on the same filesystem.
pub(crate) fn staging_dir(install_root: &Path) -> Result<tempfile::TempDir> {
    fs::create_dir_all(install_root).map_err(|e| {
        TiError::IoError(format!(
            "Failed to create install directory {}: {}",
            install_root.display(),
            e
        ))
    })?;
    let dir = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(install_root)?;
    debug!("Staging in {}", dir.path().display());
    Ok(dir)
}

/// Runs [`extract_zip`] on the blocking pool as the tracker's current task, reporting
/// `index/total` as progress. The tracker and inspector are handed back on success.
pub(crate) async fn extract_in_background<I: EntryInspector>(
    archive: PathBuf,
    target: PathBuf,
    mut tracker: ProgressTracker,
    mut inspector: I,
) -> Result<(ProgressTracker, I)> {
    run_blocking(move || {
        tracker.start_task(true);
        let mut on_entry = |entry: &ArchiveEntry, idx: usize, total: usize| -> Result<()> {
            inspector.on_entry(entry)?;
            tracker.progress(idx as f64 / total as f64);
            Ok(())
        };
        extract_zip(&archive, &target, Some(&mut on_entry))?;
        tracker.end_task();
        Ok((tracker, inspector))
    })
    .await
}

/// Removes a downloaded archive unless the caller asked to keep it.
pub(crate) async fn discard_download(downloaded: Option<&Path>, keep: bool) {
    let Some(file) = downloaded else {
        return;
    };
    if keep {
        debug!("Keeping downloaded file {}", file.display());
        return;
    }
    debug!("Removing {}", file.display());
    if let Err(e) = tokio::fs::remove_file(file).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove downloaded file {}: {}", file.display(), e);
        }
    }
}

/// Deletes the extraction directory, logging rather than failing.
pub(crate) fn close_temp_dir(temp_dir: tempfile::TempDir) {
    let path = temp_dir.path().to_path_buf();
    debug!("Removing {}", path.display());
    if let Err(e) = temp_dir.close() {
        warn!("Failed to remove temp directory {}: {}", path.display(), e);
    }
}
