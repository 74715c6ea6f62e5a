// tisdk-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::error::{Result, TiError};
use crate::platform;

const DEFAULT_BRANCHES_URL: &str = "https://builds.appcelerator.com/mobile/branches.json";
const DEFAULT_BUILDS_URL: &str = "https://builds.appcelerator.com/mobile/<BRANCH>/index.json";
const DEFAULT_BUILD_URL: &str = "https://builds.appcelerator.com/mobile/<BRANCH>/<FILENAME>";
const DEFAULT_RELEASES_URL: &str =
    "https://s3-us-west-2.amazonaws.com/appc-mobilesdk-server/releases.json";

/// Network transport options used when building the HTTP client.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    pub proxy: Option<String>,
    /// Inline PEM-encoded CA certificate.
    pub ca: Option<String>,
    pub ca_file: Option<PathBuf>,
    /// `Some(false)` disables certificate verification.
    pub strict_ssl: Option<bool>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    /// No timeout unless set; the transport defaults apply.
    pub timeout: Option<Duration>,
}

/// Catalog URL templates. `builds` and `build` contain `<BRANCH>`, `build` also
/// contains `<FILENAME>`.
#[derive(Debug, Clone)]
pub struct CatalogUrls {
    pub branches: String,
    pub builds: String,
    pub build: String,
    pub releases: String,
}

impl Default for CatalogUrls {
    fn default() -> Self {
        Self {
            branches: DEFAULT_BRANCHES_URL.to_string(),
            builds: DEFAULT_BUILDS_URL.to_string(),
            build: DEFAULT_BUILD_URL.to_string(),
            releases: DEFAULT_RELEASES_URL.to_string(),
        }
    }
}

impl CatalogUrls {
    pub fn builds_url(&self, branch: &str) -> String {
        self.builds.replacen("<BRANCH>", branch, 1)
    }

    pub fn build_url(&self, branch: &str, filename: &str) -> String {
        self.build
            .replacen("<BRANCH>", branch, 1)
            .replacen("<FILENAME>", filename, 1)
    }
}

/// Settings read by every pipeline call. Passed explicitly, never stored globally.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Extra install roots, searched before the platform defaults.
    pub search_paths: Vec<PathBuf>,
    /// Extra module roots for the installed-module scanner.
    pub module_search_paths: Vec<PathBuf>,
    pub network: NetworkConfig,
    pub urls: CatalogUrls,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading tisdk configuration");
        let mut config = Config::default();

        if let Some(paths) = env::var_os("TISDK_SEARCH_PATHS") {
            config.search_paths = env::split_paths(&paths).collect();
            debug!("Search paths from environment: {:?}", config.search_paths);
        }
        if let Some(paths) = env::var_os("TISDK_MODULE_SEARCH_PATHS") {
            config.module_search_paths = env::split_paths(&paths).collect();
        }

        config.network.proxy = env_string("TISDK_PROXY")
            .or_else(|| env_string("HTTPS_PROXY"))
            .or_else(|| env_string("HTTP_PROXY"));
        config.network.ca_file = env_string("TISDK_CA_FILE").map(PathBuf::from);
        config.network.cert_file = env_string("TISDK_CERT_FILE").map(PathBuf::from);
        config.network.key_file = env_string("TISDK_KEY_FILE").map(PathBuf::from);

        if let Some(strict) = env_string("TISDK_STRICT_SSL") {
            config.network.strict_ssl = Some(parse_bool(&strict).ok_or_else(|| {
                TiError::Config(format!("TISDK_STRICT_SSL must be a boolean, got '{strict}'"))
            })?);
        }
        if let Some(secs) = env_string("TISDK_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                TiError::Config(format!("TISDK_TIMEOUT_SECS must be a number, got '{secs}'"))
            })?;
            config.network.timeout = Some(Duration::from_secs(secs));
        }

        if let Some(url) = env_string("TISDK_RELEASES_URL") {
            config.urls.releases = url;
        }
        if let Some(url) = env_string("TISDK_BRANCHES_URL") {
            config.urls.branches = url;
        }
        if let Some(url) = env_string("TISDK_BUILDS_URL") {
            config.urls.builds = url;
        }
        if let Some(url) = env_string("TISDK_BUILD_URL") {
            config.urls.build = url;
        }

        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    /// All install roots: configured search paths first, then the platform defaults.
    /// The first entry is the default install root.
    pub fn install_paths(&self) -> Vec<PathBuf> {
        let configured = self.search_paths.iter().map(|p| expand_path(p));
        let defaults = default_locations(&platform::location_key())
            .iter()
            .map(|p| expand_path(Path::new(p)));
        unique(configured.chain(defaults))
    }

    pub fn default_install_path(&self) -> Result<PathBuf> {
        self.install_paths().into_iter().next().ok_or_else(|| {
            TiError::Config(format!(
                "No install location known for platform '{}'; set TISDK_SEARCH_PATHS",
                platform::location_key()
            ))
        })
    }

    pub fn sdk_dir(&self, root: &Path) -> PathBuf {
        root.join("mobilesdk").join(platform::os_name())
    }

    pub fn modules_dir(&self, root: &Path) -> PathBuf {
        root.join("modules")
    }

    pub fn plugins_dir(&self, root: &Path) -> PathBuf {
        root.join("plugins")
    }

    /// Every directory that may hold `<platform>/<module>/<version>` trees.
    pub fn module_paths(&self) -> Vec<PathBuf> {
        let roots = self
            .install_paths()
            .into_iter()
            .map(|root| self.modules_dir(&root));
        unique(roots.chain(self.module_search_paths.iter().map(|p| expand_path(p))))
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_locations(platform_key: &str) -> &'static [&'static str] {
    match platform_key {
        "darwin" => &[
            "~/Library/Application Support/Titanium",
            "/Library/Application Support/Titanium",
        ],
        "linux" => &["~/.titanium"],
        "win32" => &[
            "%ProgramData%\\Titanium",
            "%APPDATA%\\Titanium",
            "%ALLUSERSPROFILE%\\Application Data\\Titanium",
        ],
        _ => &[],
    }
}

fn unique(paths: impl Iterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    for p in paths {
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

/// Expands a leading `~` and `%VAR%` references.
pub fn expand_path(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();

    let s = if s == "~" || s.starts_with("~/") || s.starts_with("~\\") {
        match dirs::home_dir() {
            Some(home) => format!("{}{}", home.display(), &s[1..]),
            None => s.into_owned(),
        }
    } else {
        s.into_owned()
    };

    let mut out = String::with_capacity(s.len());
    let mut rest = s.as_str();
    while let Some(start) = rest.find('%') {
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                out.push_str(&rest[..start]);
                match env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(&rest[..=start]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    PathBuf::from(out)
}
