// tisdk-core/src/lib.rs

pub mod install;
pub mod installed;
pub mod resolve;
pub mod uninstall;

pub use install::{install_module, install_sdk, InstallRequest, ModuleInstallRequest};
pub use installed::{
    get_installed_modules, get_installed_sdks, InstalledModule, InstalledSdk, ManifestValue,
    ModuleManifest,
};
pub use resolve::{classify_uri, resolve_sdk, ArtifactSource, UriKind};
pub use uninstall::{uninstall_module, uninstall_sdk};
