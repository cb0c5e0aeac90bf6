//! Build error types

use thiserror::Error;

/// Result type for zarf-build operations
pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BuildError {
    #[error("git error for {url}: {message}")]
    Git { url: String, message: String },

    #[error("ref '{reference}' not found in {url}")]
    RefNotFound { url: String, reference: String },

    #[error("chart '{name}' cannot be fetched: {message}")]
    Chart { name: String, message: String },

    #[error("file source '{path}' could not be staged: {message}")]
    File { path: String, message: String },

    #[error("image pull failed for {reference}: {message}")]
    ImagePull { reference: String, message: String },

    #[error("no manifest for architecture '{arch}' in {reference}")]
    NoArchManifest { reference: String, arch: String },

    #[error(transparent)]
    Core(#[from] zarf_core::CoreError),

    #[error(transparent)]
    Compose(#[from] zarf_compose::ComposeError),

    #[error(transparent)]
    Transport(#[from] zarf_transport::TransportError),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<git2::Error> for BuildError {
    fn from(e: git2::Error) -> Self {
        BuildError::Git {
            url: String::new(),
            message: e.to_string(),
        }
    }
}
