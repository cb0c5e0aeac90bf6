//! Transport error types

use thiserror::Error;

/// Result type for zarf-transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    #[error("unrecognized package source: {value}")]
    UnknownSource { value: String },

    #[error("invalid OCI reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("OCI transport error: {message}")]
    Oci { message: String },

    #[error("layer for {path} does not exist in this package")]
    LayerNotFound { path: String },

    #[error("component '{name}' does not exist in this package")]
    ComponentNotFound { name: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} fetching {url}")]
    HttpStatus { status: u16, url: String },

    #[error("operation not supported by this source: {operation}")]
    Unsupported { operation: String },

    #[error("package '{name}' has not been deployed to this cluster")]
    NotDeployed { name: String },

    #[error("cluster error: {message}")]
    Cluster { message: String },

    #[error(transparent)]
    Core(#[from] zarf_core::CoreError),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse definition: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether a retry at the same granularity can reasonably succeed.
    /// Validation and integrity failures never retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Oci { .. } | TransportError::Http(_) => true,
            TransportError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
