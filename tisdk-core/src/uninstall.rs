// tisdk-core/src/uninstall.rs
use std::path::Path;

use tisdk_common::config::{expand_path, Config};
use tisdk_common::error::{Result, TiError};
use tracing::{debug, error, info};

use crate::installed::{get_installed_modules, get_installed_sdks, InstalledModule, InstalledSdk};

fn same_path(candidate: &Path, target: &str) -> bool {
    let target = expand_path(Path::new(target));
    if candidate == target {
        return true;
    }
    match (candidate.canonicalize(), target.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn remove_dir(path: &Path) -> Result<()> {
    debug!("Deleting {}", path.display());
    tokio::fs::remove_dir_all(path).await.map_err(|e| {
        error!("Failed to delete {}: {}", path.display(), e);
        TiError::from(e)
    })
}

/// Removes every installed SDK whose name or path equals `name_or_path`.
pub async fn uninstall_sdk(name_or_path: &str, config: &Config) -> Result<Vec<InstalledSdk>> {
    if name_or_path.trim().is_empty() {
        return Err(TiError::Validation("Expected an SDK name or path".to_string()));
    }

    let mut removed = Vec::new();
    for sdk in get_installed_sdks(config).await? {
        if sdk.name == name_or_path || same_path(&sdk.path, name_or_path) {
            remove_dir(&sdk.path).await?;
            info!("Uninstalled SDK {} from {}", sdk.name, sdk.path.display());
            removed.push(sdk);
        }
    }

    if removed.is_empty() {
        return Err(TiError::NotFound(format!(
            "Unable to find any SDKs matching \"{name_or_path}\""
        )));
    }
    Ok(removed)
}

fn module_matches(module: &InstalledModule, name_or_path: &str) -> bool {
    if module.moduleid == name_or_path {
        return true;
    }
    if let Some((id, version)) = name_or_path.rsplit_once('@') {
        if module.moduleid == id && module.version == version {
            return true;
        }
    }
    same_path(&module.path, name_or_path)
}

/// Removes every installed module version matching a module id, `<id>@<version>` or
/// a version directory path.
pub async fn uninstall_module(
    name_or_path: &str,
    config: &Config,
) -> Result<Vec<InstalledModule>> {
    if name_or_path.trim().is_empty() {
        return Err(TiError::Validation(
            "Expected a module id or path".to_string(),
        ));
    }

    let mut removed = Vec::new();
    for module in get_installed_modules(config).await? {
        if module_matches(&module, name_or_path) {
            remove_dir(&module.path).await?;
            info!(
                "Uninstalled module {}@{} from {}",
                module.moduleid,
                module.version,
                module.path.display()
            );
            removed.push(module);
        }
    }

    if removed.is_empty() {
        return Err(TiError::NotFound(format!(
            "Unable to find any modules matching \"{name_or_path}\""
        )));
    }
    Ok(removed)
}
