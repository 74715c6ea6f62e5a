// tisdk-common/src/lib.rs
pub mod config;
pub mod error;
pub mod model;
pub mod platform;
pub mod progress;
pub mod version;

// Re-export key types
pub use config::Config;
pub use error::{Result, TiError};
pub use model::{BranchSet, BuildCatalog, CiBuild, Release, ReleaseCatalog};
pub use progress::{ProgressCallback, ProgressEvent, ProgressTracker};
