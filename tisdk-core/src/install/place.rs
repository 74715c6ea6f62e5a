// tisdk-core/src/install/place.rs
//! Moves extracted SDK, module and plugin trees from the extraction directory into an
//! install root.
//!
//! Moves are not transactional. A failure part way through leaves whatever was already
//! moved in place.

use std::fs;
use std::path::{Path, PathBuf};

use tisdk_common::error::{Result, TiError};
use tisdk_common::progress::ProgressTracker;
use tracing::{debug, error};
use walkdir::WalkDir;

/// Depth of `<platform>/<module>/<version>` below `modules/`.
const MODULE_VERSION_DEPTH: usize = 3;
/// Depth of `<plugin>/<version>` below `plugins/`.
const PLUGIN_VERSION_DEPTH: usize = 2;
const MODULE_MANIFEST: &str = "manifest";

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn remove_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Moves the directory `src` to `dest`.
///
/// An existing `dest` is an [`TiError::AlreadyExists`] unless `overwrite` is set, in
/// which case it is removed first. A rename is tried first; when that fails (for example
/// across filesystems) the tree is copied and the source removed.
pub fn move_dir(src: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    debug!("Moving {} => {}", src.display(), dest.display());
    if exists(dest) {
        if !overwrite {
            return Err(TiError::AlreadyExists {
                message: format!("Destination already exists: {}", dest.display()),
                path: dest.to_path_buf(),
            });
        }
        debug!("Removing existing {}", dest.display());
        remove_path(dest)?;
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if let Err(rename_err) = fs::rename(src, dest) {
        debug!(
            "Rename {} => {} failed ({}), copying instead",
            src.display(),
            dest.display(),
            rename_err
        );
        move_by_copy(src, dest)?;
    }
    Ok(())
}

/// Copies `src` to `dest` without following symlinks, then removes `src`.
fn move_by_copy(src: &Path, dest: &Path) -> Result<()> {
    let wrap = |e: std::io::Error| {
        error!(
            "Failed to move {} to {}: {}",
            src.display(),
            dest.display(),
            e
        );
        TiError::IoError(format!(
            "Failed to move {} to {}: {}",
            src.display(),
            dest.display(),
            e
        ))
    };

    let mut dir_perms = Vec::new();
    for entry in WalkDir::new(src).follow_links(false).follow_root_links(false) {
        let entry = entry.map_err(|e| TiError::IoError(e.to_string()))?;
        let rel = relative(entry.path(), src)?;
        let target = if rel.as_os_str().is_empty() {
            dest.to_path_buf()
        } else {
            dest.join(rel)
        };
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target).map_err(wrap)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(wrap)?;
            let meta = entry.metadata().map_err(|e| TiError::IoError(e.to_string()))?;
            dir_perms.push((target, meta.permissions()));
        } else {
            fs::copy(entry.path(), &target).map_err(wrap)?;
        }
    }
    // Directory modes go on last so read-only directories can still be filled.
    for (dir, perms) in dir_perms.into_iter().rev() {
        fs::set_permissions(&dir, perms).map_err(wrap)?;
    }
    remove_path(src)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> std::io::Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> std::io::Result<()> {
    fs::copy(src, dest).map(|_| ())
}

/// Moves a single file or symlink. Returns `false` when `dest` exists and `overwrite`
/// is not set, leaving both untouched.
fn move_file(src: &Path, dest: &Path, overwrite: bool) -> Result<bool> {
    if exists(dest) {
        if !overwrite {
            debug!("Keeping existing {}", dest.display());
            return Ok(false);
        }
        remove_path(dest)?;
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::rename(src, dest).is_err() {
        move_by_copy(src, dest)?;
    }
    Ok(true)
}

/// Moves `<extracted>/mobilesdk/<os>/<name>` to `<sdk_dir>/<name>`, replacing any
/// existing directory. Conflicts are expected to have been checked during extraction.
pub fn place_sdk(extracted_sdk: &Path, sdk_dir: &Path, name: &str) -> Result<PathBuf> {
    let dest = sdk_dir.join(name);
    debug!(
        "Moving SDK files: {} => {}",
        extracted_sdk.display(),
        dest.display()
    );
    move_dir(extracted_sdk, &dest, true)?;
    Ok(dest)
}

/// Lists directories exactly `depth` levels below `root`, in name order.
fn version_dirs(root: &Path, depth: usize) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    WalkDir::new(root)
        .min_depth(depth)
        .max_depth(depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

fn relative<'a>(path: &'a Path, root: &Path) -> Result<&'a Path> {
    path.strip_prefix(root).map_err(|e| {
        TiError::Generic(format!(
            "{} is not under {}: {}",
            path.display(),
            root.display(),
            e
        ))
    })
}

/// Moves the SDK's bundled `modules/<platform>/<name>/<version>` directories into
/// `modules_dir`, reporting progress by count on the current task.
///
/// A version that already exists at the destination is left untouched unless
/// `overwrite` is set. Returns the destination of every version that was moved.
pub fn place_bundled_modules(
    extracted_modules: &Path,
    modules_dir: &Path,
    overwrite: bool,
    tracker: &mut ProgressTracker,
) -> Result<Vec<PathBuf>> {
    let versions = version_dirs(extracted_modules, MODULE_VERSION_DEPTH);
    let total = versions.len();
    let mut moved = Vec::new();

    for (i, src) in versions.iter().enumerate() {
        let rel = relative(src, extracted_modules)?;
        let dest = modules_dir.join(rel);
        if exists(&dest) && !overwrite {
            debug!("Module {} already exists, skipping", rel.display());
        } else {
            debug!(
                "Moving module files {}: {} => {}",
                rel.display(),
                src.display(),
                dest.display()
            );
            move_dir(src, &dest, true)?;
            moved.push(dest);
        }
        tracker.progress((i + 1) as f64 / total as f64);
    }
    Ok(moved)
}

/// Source and destination of a tree rooted at `modules/` or `plugins/`.
struct TreeRoot {
    src: PathBuf,
    dest: PathBuf,
    version_depth: usize,
    holds_modules: bool,
}

/// Places the `modules/` and `plugins/` trees of a module-only archive into
/// `modules_dir` and `plugins_dir`, keeping their nested hierarchy.
///
/// Every version directory is checked for conflicts before anything moves. Files above
/// version depth are merged into the destination. Returns the installed module version
/// directories, those holding a `manifest` file.
pub fn place_module_tree(
    extracted: &Path,
    modules_dir: &Path,
    plugins_dir: &Path,
    overwrite: bool,
) -> Result<Vec<PathBuf>> {
    let roots = [
        TreeRoot {
            src: extracted.join("modules"),
            dest: modules_dir.to_path_buf(),
            version_depth: MODULE_VERSION_DEPTH,
            holds_modules: true,
        },
        TreeRoot {
            src: extracted.join("plugins"),
            dest: plugins_dir.to_path_buf(),
            version_depth: PLUGIN_VERSION_DEPTH,
            holds_modules: false,
        },
    ];

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for root in roots.iter().filter(|r| r.src.is_dir()) {
        for entry in WalkDir::new(&root.src)
            .min_depth(1)
            .max_depth(root.version_depth)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| TiError::IoError(e.to_string()))?;
            let rel = relative(entry.path(), &root.src)?.to_path_buf();
            let dest = root.dest.join(&rel);
            if entry.file_type().is_dir() {
                if entry.depth() == root.version_depth {
                    dirs.push((entry.into_path(), dest, root.holds_modules));
                }
            } else {
                files.push((entry.into_path(), dest));
            }
        }
    }

    if dirs.is_empty() && files.is_empty() {
        return Err(TiError::Archive(
            "Zip file does not appear to contain any modules or plugins".to_string(),
        ));
    }

    if !overwrite {
        if let Some((_, dest, _)) = dirs.iter().find(|(_, dest, _)| exists(dest)) {
            return Err(TiError::AlreadyExists {
                message: format!("Module already exists: {}", dest.display()),
                path: dest.clone(),
            });
        }
    }

    let mut installed = Vec::new();
    for (src, dest, holds_modules) in dirs {
        let has_manifest = src.join(MODULE_MANIFEST).is_file();
        move_dir(&src, &dest, overwrite)?;
        if holds_modules && has_manifest {
            installed.push(dest);
        }
    }
    for (src, dest) in files {
        move_file(&src, &dest, overwrite)?;
    }
    Ok(installed)
}
