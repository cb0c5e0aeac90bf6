//! CLI error type with exit-code classification
//!
//! Engine errors keep their kind; the CLI folds them into the four
//! non-zero exit codes the wrapper scripts rely on.

use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    #[error("{0}")]
    #[diagnostic(code(zarf::validation))]
    Validation(String),

    #[error("{0}")]
    #[diagnostic(
        code(zarf::integrity),
        help("the package contents do not match what was built and signed")
    )]
    Integrity(String),

    #[error("operation cancelled")]
    #[diagnostic(code(zarf::cancelled))]
    Cancelled,

    #[error("{0}")]
    #[diagnostic(code(zarf::error))]
    Other(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation(_) => exit_codes::VALIDATION_ERROR,
            CliError::Integrity(_) => exit_codes::INTEGRITY_ERROR,
            CliError::Cancelled => exit_codes::CANCELLED,
            CliError::Other(_) => exit_codes::ERROR,
        }
    }
}

impl From<zarf_core::CoreError> for CliError {
    fn from(e: zarf_core::CoreError) -> Self {
        use zarf_core::CoreError::*;
        match &e {
            ChecksumMismatch { .. }
            | DuplicateChecksumEntry { .. }
            | UnlistedFile { .. }
            | MissingFile { .. }
            | AggregateMismatch { .. }
            | SignedButNoKey
            | KeyButNotSigned
            | SignatureInvalid(_) => CliError::Integrity(e.to_string()),
            InvalidDefinition { .. }
            | DefinitionNotFound { .. }
            | YamlParse(_)
            | InvalidVersion(_)
            | PatternMismatch { .. } => CliError::Validation(e.to_string()),
            _ => CliError::Other(e.to_string()),
        }
    }
}

impl From<zarf_compose::ComposeError> for CliError {
    fn from(e: zarf_compose::ComposeError) -> Self {
        match e {
            zarf_compose::ComposeError::Core(core) => core.into(),
            zarf_compose::ComposeError::Io(io) => CliError::Other(io.to_string()),
            other => CliError::Validation(other.to_string()),
        }
    }
}

impl From<zarf_transport::TransportError> for CliError {
    fn from(e: zarf_transport::TransportError) -> Self {
        match e {
            zarf_transport::TransportError::Core(core) => core.into(),
            err @ zarf_transport::TransportError::UnknownSource { .. } => {
                CliError::Validation(err.to_string())
            }
            other => CliError::Other(other.to_string()),
        }
    }
}

impl From<zarf_build::BuildError> for CliError {
    fn from(e: zarf_build::BuildError) -> Self {
        match e {
            zarf_build::BuildError::Core(core) => core.into(),
            zarf_build::BuildError::Compose(compose) => compose.into(),
            zarf_build::BuildError::Transport(transport) => transport.into(),
            other => CliError::Other(other.to_string()),
        }
    }
}

impl From<zarf_kube::KubeError> for CliError {
    fn from(e: zarf_kube::KubeError) -> Self {
        match e {
            zarf_kube::KubeError::Core(core) => core.into(),
            zarf_kube::KubeError::Compose(compose) => compose.into(),
            zarf_kube::KubeError::Transport(transport) => transport.into(),
            err @ (zarf_kube::KubeError::ComponentNotFound { .. }
            | zarf_kube::KubeError::GroupConflict { .. }
            | zarf_kube::KubeError::GroupUnresolved { .. }
            | zarf_kube::KubeError::PromptRequired { .. }) => {
                CliError::Validation(err.to_string())
            }
            other => CliError::Other(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let err: CliError = zarf_core::CoreError::AggregateMismatch {
            expected: "a".to_string(),
            actual: "b".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::INTEGRITY_ERROR);

        let err: CliError = zarf_core::CoreError::InvalidDefinition {
            message: "bad".to_string(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_codes::VALIDATION_ERROR);

        assert_eq!(CliError::Cancelled.exit_code(), exit_codes::CANCELLED);
        assert_eq!(
            CliError::Other("boom".to_string()).exit_code(),
            exit_codes::ERROR
        );
    }

    #[test]
    fn test_nested_classification() {
        let err: CliError = zarf_transport::TransportError::Core(
            zarf_core::CoreError::SignedButNoKey,
        )
        .into();
        assert_eq!(err.exit_code(), exit_codes::INTEGRITY_ERROR);
    }
}
