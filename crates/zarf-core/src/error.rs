//! Core error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type for zarf-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoreError {
    #[error("package definition not found: {path}")]
    DefinitionNotFound { path: PathBuf },

    #[error("invalid package definition: {message}")]
    InvalidDefinition { message: String },

    #[error("failed to parse zarf.yaml: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),

    #[error("archive error: {message}")]
    Archive { message: String },

    #[error("split package error: {message}")]
    Split { message: String },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("duplicate entry in checksums.txt: {path}")]
    DuplicateChecksumEntry { path: String },

    #[error("file {path} is present in the package but not listed in checksums.txt")]
    UnlistedFile { path: String },

    #[error("file {path} is listed in checksums.txt but missing from the package")]
    MissingFile { path: String },

    #[error("aggregate checksum mismatch: expected {expected}, got {actual}")]
    AggregateMismatch { expected: String, actual: String },

    #[error("package is signed but no public key was provided")]
    SignedButNoKey,

    #[error("a public key was provided but the package is not signed")]
    KeyButNotSigned,

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("value for {name} does not match pattern {pattern}")]
    PatternMismatch { name: String, pattern: String },
}
