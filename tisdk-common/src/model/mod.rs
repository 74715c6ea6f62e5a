// tisdk-common/src/model/mod.rs
pub mod build;
pub mod release;

pub use build::{BranchSet, BuildCatalog, CiBuild};
pub use release::{Release, ReleaseCatalog};
