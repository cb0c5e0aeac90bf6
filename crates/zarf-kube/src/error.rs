//! Cluster and deployment error types

use thiserror::Error;

/// Result type for zarf-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("package '{name}' has no deployment record in this cluster")]
    RecordNotFound { name: String },

    #[error("deployment record for '{name}' conflicted {attempts} times; giving up")]
    RecordConflict { name: String, attempts: u32 },

    #[error("component '{component}' action failed: {message}")]
    Action { component: String, message: String },

    #[error("action exceeded its {seconds}s budget")]
    ActionTimeout { seconds: u64 },

    #[error("variable '{name}' was not captured from action output")]
    VariableNotCaptured { name: String },

    #[error("health check {kind}/{name} did not become ready in time")]
    HealthCheckTimeout { kind: String, name: String },

    #[error("webhook '{hook}' for component '{component}' did not finish in time")]
    WebhookTimeout { hook: String, component: String },

    #[error("component '{name}' does not exist in this package")]
    ComponentNotFound { name: String },

    #[error("variable '{name}' prompts at deploy time; supply a value or pass --confirm")]
    PromptRequired { name: String },

    #[error("multiple components requested from group '{group}'")]
    GroupConflict { group: String },

    #[error("group '{group}' needs a selection and has no default")]
    GroupUnresolved { group: String },

    #[error("chart install failed for '{release}': {message}")]
    ChartInstall { release: String, message: String },

    #[error("mirror push failed: {message}")]
    Mirror { message: String },

    #[error("data injections require a pod injector; component '{component}' declares {count}")]
    NoDataInjector { component: String, count: usize },

    #[error("required component '{name}' failed; aborting package deploy")]
    RequiredComponentFailed { name: String },

    #[error(transparent)]
    Core(#[from] zarf_core::CoreError),

    #[error(transparent)]
    Compose(#[from] zarf_compose::ComposeError),

    #[error(transparent)]
    Transport(#[from] zarf_transport::TransportError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KubeError {
    /// Whether the underlying API error is a 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Whether the underlying API error is a 409 conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}
