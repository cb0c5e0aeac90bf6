//! Zarf Kube - the deployment reconciler and cluster state
//!
//! This crate reconciles loaded packages against a live cluster:
//! - `Deployer`: per-component state machine with ordered phases
//! - `StateStore`: deployment records persisted as cluster secrets
//! - `ActionRunner`: lifecycle command execution with variable capture
//! - health checks, webhook waits, and in-cluster mirroring

pub mod actions;
pub mod cluster;
pub mod deployer;
pub mod error;
pub mod health;
pub mod helm;
pub mod mirror;
pub mod state;
pub mod webhooks;

pub use actions::{ActionPhase, ActionRunner};
pub use cluster::{default_client, ClusterRecordLookup};
pub use deployer::{select_components, DataInjector, DeployOptions, DeployResult, Deployer};
pub use error::{KubeError, Result};
pub use health::wait_for_health_checks;
pub use helm::{
    generate_synthetic_chart, synthetic_chart_name, synthetic_release_name, ChartInstaller,
    HelmCli, NoHelm,
};
pub use mirror::{mirror_images, mirror_repos, GitTarget, MirrorTargets, RegistryTarget};
pub use state::{
    ComponentStatus, ConnectString, DeployedComponent, DeployedPackage, InstalledChart,
    MemoryStore, SecretStore, StateStore, Webhook, WebhookStatus, MANAGED_BY_LABEL,
    PACKAGE_INFO_LABEL, PACKAGE_SECRET_PREFIX, ZARF_NAMESPACE,
};
pub use webhooks::wait_for_webhooks;
