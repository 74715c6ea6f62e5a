// tisdk-core/src/installed.rs
//! Reads installed SDKs and modules back from the install roots.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tisdk_common::config::{expand_path, Config};
use tisdk_common::error::{Result, TiError};
use tracing::{debug, warn};

use crate::install::run_blocking;

const SDK_MANIFEST: &str = "manifest.json";
const SDK_PACKAGE: &str = "package.json";
const MODULE_MANIFEST: &str = "manifest";

/// `key: value`, keys without whitespace or colons.
static MANIFEST_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^:\s]+)\s*:\s*(.+?)\s*$").expect("manifest line regex is valid")
});
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d*)?$").expect("number regex is valid"));

/// Keys whose values are never coerced to numbers.
const LITERAL_KEYS: &[&str] = &["version"];

#[derive(Debug, Clone, Serialize)]
pub struct InstalledSdk {
    pub name: String,
    pub path: PathBuf,
    pub manifest: serde_json::Map<String, serde_json::Value>,
    #[serde(rename = "packageJson", skip_serializing_if = "Option::is_none")]
    pub package_json: Option<serde_json::Map<String, serde_json::Value>>,
}

fn read_json_object(file: &Path) -> Result<serde_json::Map<String, serde_json::Value>> {
    let content = fs::read_to_string(file)?;
    match serde_json::from_str::<serde_json::Value>(&content)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(TiError::Manifest(format!(
            "{} is not a JSON object",
            file.display()
        ))),
    }
}

impl InstalledSdk {
    /// Loads the SDK rooted at `dir`. `manifest.json` must hold a JSON object;
    /// `package.json` is read when present.
    pub fn load(dir: &Path) -> Result<Self> {
        let dir = expand_path(dir);
        if !dir.is_dir() {
            return Err(TiError::NotFound(format!(
                "SDK directory does not exist: {}",
                dir.display()
            )));
        }
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TiError::Validation(format!("Invalid SDK path {}", dir.display())))?;

        let manifest_file = dir.join(SDK_MANIFEST);
        if !manifest_file.is_file() {
            return Err(TiError::Manifest(format!(
                "Invalid SDK: no {SDK_MANIFEST} found in {}",
                dir.display()
            )));
        }
        let manifest = read_json_object(&manifest_file).map_err(|e| {
            TiError::Manifest(format!(
                "Invalid SDK: {} does not contain a valid {SDK_MANIFEST}: {e}",
                dir.display()
            ))
        })?;

        let package_file = dir.join(SDK_PACKAGE);
        let package_json = if package_file.is_file() {
            Some(read_json_object(&package_file)?)
        } else {
            None
        };

        Ok(Self {
            name,
            path: dir,
            manifest,
            package_json,
        })
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest.get("version").and_then(|v| v.as_str())
    }
}

/// A module manifest value after coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ManifestValue {
    Str(String),
    Num(f64),
}

impl fmt::Display for ManifestValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestValue::Str(s) => f.write_str(s),
            ManifestValue::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            ManifestValue::Num(n) => write!(f, "{n}"),
        }
    }
}

/// Ordered `key: value` document read from a module's `manifest` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleManifest {
    entries: Vec<(String, ManifestValue)>,
}

impl ModuleManifest {
    /// Parses the manifest text. Comment lines and lines without a `key: value` pair are
    /// skipped; a repeated key keeps its first position and takes the last value.
    pub fn parse(content: &str) -> Self {
        let mut manifest = Self::default();
        for line in content.lines() {
            if line.trim_start().starts_with('#') {
                continue;
            }
            let Some(caps) = MANIFEST_LINE_RE.captures(line) else {
                continue;
            };
            let key = &caps[1];
            let raw = &caps[2];
            let value = if !LITERAL_KEYS.contains(&key) && NUMBER_RE.is_match(raw) {
                raw.parse::<f64>()
                    .map(ManifestValue::Num)
                    .unwrap_or_else(|_| ManifestValue::Str(raw.to_string()))
            } else {
                ManifestValue::Str(raw.to_string())
            };
            manifest.insert(key, value);
        }
        manifest
    }

    fn insert(&mut self, key: &str, value: ManifestValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ManifestValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ManifestValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ModuleManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstalledModule {
    pub path: PathBuf,
    /// `ios` for modules stored under `iphone`.
    pub platform: String,
    pub version: String,
    pub moduleid: String,
    pub manifest: ModuleManifest,
}

impl InstalledModule {
    /// Loads the module version directory `<platform>/<module>/<version>`.
    pub fn load(dir: &Path) -> Result<Self> {
        let dir = expand_path(dir);
        if !dir.is_dir() {
            return Err(TiError::NotFound(format!(
                "Module directory does not exist: {}",
                dir.display()
            )));
        }

        let basename = |p: Option<&Path>| {
            p.and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let version = basename(Some(dir.as_path()));
        let module_dir = dir.parent();
        let module_name = basename(module_dir);
        let mut platform = basename(module_dir.and_then(Path::parent));

        let content = fs::read_to_string(dir.join(MODULE_MANIFEST)).map_err(|e| {
            TiError::Manifest(format!(
                "Directory does not contain a valid manifest: {}: {e}",
                dir.display()
            ))
        })?;
        let manifest = ModuleManifest::parse(&content);

        if platform.trim().is_empty() {
            return Err(TiError::Manifest(format!(
                "Unable to determine module platform for {}",
                dir.display()
            )));
        }
        if platform == "iphone" {
            platform = "ios".to_string();
        }
        semver::Version::parse(&version).map_err(|_| {
            TiError::Manifest(format!("Version \"{version}\" is not valid"))
        })?;

        let moduleid = manifest
            .get("moduleid")
            .map(ToString::to_string)
            .unwrap_or(module_name);

        Ok(Self {
            path: dir,
            platform,
            version,
            moduleid,
            manifest,
        })
    }
}

fn handle_dir_entry(res: io::Result<fs::DirEntry>, dir: &Path) -> Option<fs::DirEntry> {
    match res {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("Error reading entry in {}: {}", dir.display(), e);
            None
        }
    }
}

/// Subdirectories of `dir` in name order. A missing directory yields nothing.
fn subdirs(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", dir.display(), e);
            }
            return Vec::new();
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|res| handle_dir_entry(res, dir))
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Every SDK under the install roots. A root holding `mobilesdk/<os>` is scanned there,
/// any other root is scanned directly.
pub async fn get_installed_sdks(config: &Config) -> Result<Vec<InstalledSdk>> {
    let config = config.clone();
    run_blocking(move || Ok(scan_sdks(&config))).await
}

fn scan_sdks(config: &Config) -> Vec<InstalledSdk> {
    let mut sdks: Vec<InstalledSdk> = Vec::new();
    for root in config.install_paths() {
        if !root.is_dir() {
            debug!("Install root {} does not exist", root.display());
            continue;
        }
        let sdk_dir = config.sdk_dir(&root);
        let scan_dir = if sdk_dir.is_dir() { sdk_dir } else { root };
        for dir in subdirs(&scan_dir) {
            match InstalledSdk::load(&dir) {
                Ok(sdk) if !sdks.iter().any(|s| s.path == sdk.path) => sdks.push(sdk),
                Ok(_) => {}
                Err(e) => warn!("Skipping {}: {}", dir.display(), e),
            }
        }
    }
    sdks
}

/// Every module version under the module roots.
pub async fn get_installed_modules(config: &Config) -> Result<Vec<InstalledModule>> {
    let config = config.clone();
    run_blocking(move || Ok(scan_modules(&config))).await
}

fn scan_modules(config: &Config) -> Vec<InstalledModule> {
    let mut modules: Vec<InstalledModule> = Vec::new();
    for root in config.module_paths() {
        if !root.is_dir() {
            continue;
        }
        for platform_dir in subdirs(&root) {
            for module_dir in subdirs(&platform_dir) {
                for version_dir in subdirs(&module_dir) {
                    match InstalledModule::load(&version_dir) {
                        Ok(module) if !modules.iter().any(|m| m.path == module.path) => {
                            modules.push(module)
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Skipping {}: {}", version_dir.display(), e),
                    }
                }
            }
        }
    }
    modules
}
