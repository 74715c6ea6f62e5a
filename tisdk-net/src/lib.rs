// tisdk-net/src/lib.rs
pub mod catalog;
pub mod download;
pub mod http;

pub use catalog::{fetch_branches, fetch_builds, fetch_releases, parse_builds};
pub use download::{download_file, filename_from_content_disposition};
pub use http::{build_http_client, fetch_json};
pub use tisdk_common::{
    error::{Result, TiError},
    Config,
};
