// tisdk-common/src/model/build.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::release::LATEST;
use crate::version;

/// Branch catalog document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSet {
    pub branches: Vec<String>,
    #[serde(rename = "defaultBranch")]
    pub default_branch: String,
}

impl BranchSet {
    pub fn contains(&self, branch: &str) -> bool {
        self.branches.iter().any(|b| b == branch)
    }

    /// Default branch first, the rest in reverse name order.
    pub fn search_order(&self) -> Vec<String> {
        let mut branches = self.branches.clone();
        branches.sort_by(|a, b| {
            let a_default = *a == self.default_branch;
            let b_default = *b == self.default_branch;
            b_default.cmp(&a_default).then_with(|| b.cmp(a))
        });
        branches
    }
}

/// Entry of a branch build index as served by the CI catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBuild {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub git_branch: String,
    #[serde(default)]
    pub git_revision: String,
    #[serde(default)]
    pub build_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiBuild {
    /// `<version>.v<timestamp>`
    pub name: String,
    pub version: String,
    /// 14-digit `YYYYMMDDhhmmss` build timestamp.
    pub ts: String,
    pub branch: String,
    pub githash: String,
    pub date: DateTime<Utc>,
    pub url: String,
}

impl CiBuild {
    pub fn matches(&self, selector: &str) -> bool {
        selector == LATEST
            || self.name == selector
            || self.version == selector
            || self.githash == selector
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildCatalog {
    builds: Vec<CiBuild>,
}

impl BuildCatalog {
    pub fn new(builds: Vec<CiBuild>) -> Self {
        Self { builds }
    }

    pub fn len(&self) -> usize {
        self.builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CiBuild> {
        self.builds.iter().find(|b| b.name == name)
    }

    /// Version descending, ties broken by build timestamp descending.
    pub fn sorted(&self) -> Vec<&CiBuild> {
        let mut builds: Vec<&CiBuild> = self.builds.iter().collect();
        builds.sort_by(|a, b| {
            version::rcompare(&a.version, &b.version).then_with(|| b.ts.cmp(&a.ts))
        });
        builds
    }

    /// First build in sorted order matching the selector.
    pub fn find(&self, selector: &str) -> Option<&CiBuild> {
        self.sorted().into_iter().find(|b| b.matches(selector))
    }
}
