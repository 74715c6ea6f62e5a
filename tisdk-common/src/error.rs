use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum TiError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Semantic Versioning Error: {0}")]
    SemVer(#[from] Arc<semver::Error>),

    #[error("Invalid zip file: {0}")]
    InvalidZip(String),

    #[error("Archive Error: {0}")]
    Archive(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    AlreadyExists { message: String, path: PathBuf },

    #[error("{status} {reason}")]
    HttpStatus {
        status: u16,
        reason: String,
        url: String,
    },

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Manifest Error: {0}")]
    Manifest(String),

    #[error("IoError: {0}")]
    IoError(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl TiError {
    /// Machine-readable code for the error class.
    pub fn code(&self) -> &'static str {
        match self {
            TiError::Validation(_) => "EINVALID",
            TiError::NotFound(_) => "ENOTFOUND",
            TiError::AlreadyExists { .. } => "EEXIST",
            TiError::HttpStatus { .. } => "EHTTP",
            TiError::Http(_) | TiError::Transport(_) => "ENETWORK",
            TiError::InvalidZip(_) | TiError::Archive(_) => "EZIP",
            TiError::Io(_) | TiError::IoError(_) => "EIO",
            TiError::Json(_) | TiError::SemVer(_) | TiError::Manifest(_) => "EPARSE",
            TiError::Config(_) => "ECONFIG",
            TiError::Generic(_) => "EGENERIC",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TiError::NotFound(_))
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TiError::HttpStatus { status, .. } => Some(*status),
            TiError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TiError {
    fn from(err: std::io::Error) -> Self {
        TiError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for TiError {
    fn from(err: reqwest::Error) -> Self {
        TiError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for TiError {
    fn from(err: serde_json::Error) -> Self {
        TiError::Json(Arc::new(err))
    }
}

impl From<semver::Error> for TiError {
    fn from(err: semver::Error) -> Self {
        TiError::SemVer(Arc::new(err))
    }
}

impl From<zip::result::ZipError> for TiError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => TiError::Io(Arc::new(e)),
            other => TiError::Archive(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TiError>;
