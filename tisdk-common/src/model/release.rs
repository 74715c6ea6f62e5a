// tisdk-common/src/model/release.rs
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::version;

pub const LATEST: &str = "latest";

/// Release index document as served by the release catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseIndex {
    #[serde(default)]
    pub releases: Vec<RawRelease>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRelease {
    pub name: String,
    pub os: String,
    #[serde(default)]
    pub build_type: String,
    pub version: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Label as published, e.g. `7.5.1.GA`.
    pub label: String,
    /// Label without the GA qualifier, e.g. `7.5.1`.
    pub version: String,
    pub url: String,
}

/// Releases for the current platform keyed by version label.
#[derive(Debug, Clone, Default)]
pub struct ReleaseCatalog {
    entries: BTreeMap<String, Release>,
    latest: Option<String>,
}

impl ReleaseCatalog {
    /// Keeps `mobilesdk` releases for `os`. On Linux the release `build_type` must
    /// match the host word size.
    pub fn from_index(index: ReleaseIndex, os: &str, is_64bit: bool) -> Self {
        let mut entries = BTreeMap::new();
        for raw in index.releases {
            if raw.os != os || raw.name != "mobilesdk" {
                continue;
            }
            let is_64bit_build = raw.build_type.contains("64bit");
            if os == "linux" && is_64bit != is_64bit_build {
                continue;
            }
            let release = Release {
                version: version::normalize_release_label(&raw.version),
                label: raw.version.clone(),
                url: raw.url,
            };
            entries.insert(raw.version, release);
        }

        let latest = entries
            .keys()
            .max_by(|a, b| version::compare(a, b))
            .cloned();

        Self { entries, latest }
    }

    /// Looks up a label exactly, then with the `.GA` qualifier appended. `latest`
    /// resolves to the highest version.
    pub fn lookup(&self, selector: &str) -> Option<&Release> {
        if selector == LATEST {
            return self.latest();
        }
        self.entries
            .get(selector)
            .or_else(|| self.entries.get(&format!("{selector}.GA")))
    }

    pub fn latest(&self) -> Option<&Release> {
        self.latest.as_ref().and_then(|l| self.entries.get(l))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Releases newest first.
    pub fn sorted(&self) -> Vec<&Release> {
        let mut releases: Vec<&Release> = self.entries.values().collect();
        releases.sort_by(|a, b| version::rcompare(&a.label, &b.label));
        releases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(version: &str, os: &str, build_type: &str, url: &str) -> RawRelease {
        RawRelease {
            name: "mobilesdk".into(),
            os: os.into(),
            build_type: build_type.into(),
            version: version.into(),
            url: url.into(),
        }
    }

    #[test]
    fn latest_is_highest_version() {
        let index = ReleaseIndex {
            releases: vec![
                raw("7.5.1.GA", "osx", "10.5_i386", "u1"),
                raw("8.0.0.GA", "osx", "10.5_i386", "u2"),
                raw("10.0.0.GA", "osx", "10.5_i386", "u3"),
            ],
        };
        let catalog = ReleaseCatalog::from_index(index, "osx", true);
        assert_eq!(catalog.lookup("latest").unwrap().url, "u3");
        assert_eq!(catalog.sorted()[2].label, "7.5.1.GA");
    }

    #[test]
    fn lookup_accepts_label_without_ga() {
        let index = ReleaseIndex {
            releases: vec![raw("7.5.1.GA", "osx", "", "u1"), raw("8.0.0.GA", "osx", "", "u2")],
        };
        let catalog = ReleaseCatalog::from_index(index, "osx", true);
        assert_eq!(catalog.lookup("7.5.1.GA").unwrap().url, "u1");
        assert_eq!(catalog.lookup("7.5.1").unwrap().url, "u1");
        assert_eq!(catalog.lookup("7.5.1").unwrap().version, "7.5.1");
        assert_eq!(catalog.lookup("latest").unwrap().url, "u2");
        assert!(catalog.lookup("9.9.9").is_none());
    }

    #[test]
    fn filters_other_platforms_and_word_size() {
        let index = ReleaseIndex {
            releases: vec![
                raw("7.5.1.GA", "osx", "10.5_i386", "mac"),
                raw("7.5.1.GA", "linux", "64bit_i386", "linux64"),
                raw("7.5.1.GA", "linux", "32bit_i386", "linux32"),
            ],
        };
        let catalog = ReleaseCatalog::from_index(index.clone(), "linux", true);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.lookup("7.5.1").unwrap().url, "linux64");

        let catalog = ReleaseCatalog::from_index(index, "linux", false);
        assert_eq!(catalog.lookup("7.5.1").unwrap().url, "linux32");
    }

    #[test]
    fn empty_catalog_has_no_latest() {
        let catalog = ReleaseCatalog::from_index(ReleaseIndex { releases: vec![] }, "osx", true);
        assert!(catalog.is_empty());
        assert!(catalog.lookup("latest").is_none());
    }
}
