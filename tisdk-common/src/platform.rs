// tisdk-common/src/platform.rs
//! Host platform names as they appear in SDK archives and catalogs.

use std::env;

/// The platform name used in `mobilesdk/<os>` paths and catalog entries.
pub fn os_name() -> &'static str {
    match env::consts::OS {
        "macos" => "osx",
        "windows" => "win32",
        other => other,
    }
}

/// Platform key used to pick the default install locations.
///
/// `TISDK_PLATFORM` overrides the detected platform, which is mostly useful for tests.
pub fn location_key() -> String {
    env::var("TISDK_PLATFORM")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| match env::consts::OS {
            "macos" => "darwin".to_string(),
            "windows" => "win32".to_string(),
            other => other.to_string(),
        })
}

pub fn is_64bit() -> bool {
    cfg!(target_pointer_width = "64")
}
