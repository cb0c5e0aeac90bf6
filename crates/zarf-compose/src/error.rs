//! Composition error types

use thiserror::Error;

/// Result type for zarf-compose operations
pub type Result<T> = std::result::Result<T, ComposeError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ComposeError {
    #[error("import cycle detected at {reference}")]
    ImportCycle { reference: String },

    #[error("imported definition at {reference} has no component named '{name}'")]
    ImportedComponentNotFound { reference: String, name: String },

    #[error("variable '{name}' is defined differently by an imported definition")]
    VariableConflict { name: String },

    #[error("constant '{name}' is defined differently by an imported definition")]
    ConstantConflict { name: String },

    #[error("action defaults for '{component}' conflict between parent and import")]
    ActionDefaultsConflict { component: String },

    #[error("OCI imports are not resolvable here: {url}")]
    OciImportUnavailable { url: String },

    #[error("template error in {path}: {message}")]
    Template { path: String, message: String },

    #[error(transparent)]
    Core(#[from] zarf_core::CoreError),

    #[error("failed to parse definition: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
