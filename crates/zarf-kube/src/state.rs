//! Per-package deployment records
//!
//! Records live as secrets named `zarf-package-<name>` in the zarf
//! namespace, JSON-encoded under the `data` key. Concurrent writers are
//! serialized by conditional update on the secret's resourceVersion with
//! a bounded retry.

use async_trait::async_trait;
use indexmap::IndexMap;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use zarf_core::definition::Package;

use crate::error::{KubeError, Result};

/// Namespace holding all engine state
pub const ZARF_NAMESPACE: &str = "zarf";
/// Prefix of deployment record secret names
pub const PACKAGE_SECRET_PREFIX: &str = "zarf-package-";
/// Label marking resources the engine manages
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Label carrying the package name on a record secret
pub const PACKAGE_INFO_LABEL: &str = "package";

const UPDATE_ATTEMPTS: u32 = 3;

/// One deployed package's persisted state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedPackage {
    pub name: String,

    /// The definition as deployed
    pub data: Package,

    pub cli_version: String,

    /// Increments on every successful deploy of the same package
    pub generation: u64,

    #[serde(default)]
    pub deployed_components: Vec<DeployedComponent>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub connect_strings: IndexMap<String, ConnectString>,

    /// `component -> hook-name -> webhook` observed by the reconciler
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub component_webhooks: IndexMap<String, IndexMap<String, Webhook>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedComponent {
    pub name: String,

    #[serde(default)]
    pub installed_charts: Vec<InstalledChart>,

    pub status: ComponentStatus,

    /// Generation this component was last reconciled at
    pub observed_generation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstalledChart {
    pub namespace: String,
    pub chart_name: String,
}

/// Component lifecycle within a deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentStatus {
    Pending,
    Deploying,
    Succeeded,
    Failed,
    /// Failed after on-failure handling; terminal for this generation
    Aborted,
    Removing,
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Deploying => "deploying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Removing => "removing",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectString {
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub name: String,
    pub status: WebhookStatus,

    #[serde(default)]
    pub observed_generation: u64,

    /// How long the reconciler waits for this hook before moving on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_duration_seconds: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WebhookStatus {
    Running,
    Succeeded,
    Failed,
    Removing,
}

impl DeployedPackage {
    /// Fresh record for a first deploy
    pub fn new(pkg: &Package, cli_version: &str) -> Self {
        Self {
            name: pkg.metadata.name.clone(),
            data: pkg.clone(),
            cli_version: cli_version.to_string(),
            generation: 1,
            deployed_components: Vec::new(),
            connect_strings: IndexMap::new(),
            component_webhooks: IndexMap::new(),
        }
    }

    /// Secret name for this record
    pub fn secret_name(&self) -> String {
        format!("{}{}", PACKAGE_SECRET_PREFIX, self.name)
    }
}

/// Persistent store of deployment records
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<DeployedPackage>>;
    /// Create-or-update with last-writer-wins semantics
    async fn put(&self, record: &DeployedPackage) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<DeployedPackage>>;
}

/// The default driver: records as cluster secrets
pub struct SecretStore {
    client: Client,
    namespace: String,
}

impl SecretStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            namespace: ZARF_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(client: Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
        }
    }

    fn api(&self) -> Api<Secret> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn build_secret(
        &self,
        record: &DeployedPackage,
        resource_version: Option<String>,
    ) -> Result<Secret> {
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), "zarf".to_string());
        labels.insert(PACKAGE_INFO_LABEL.to_string(), record.name.clone());

        let mut data = BTreeMap::new();
        data.insert(
            "data".to_string(),
            k8s_openapi::ByteString(serde_json::to_vec(record)?),
        );

        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(record.secret_name()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels),
                resource_version,
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(data),
            ..Default::default()
        })
    }

    fn parse_secret(secret: &Secret) -> Result<DeployedPackage> {
        let data = secret
            .data
            .as_ref()
            .and_then(|d| d.get("data"))
            .ok_or_else(|| {
                KubeError::Json(serde::de::Error::custom("secret missing 'data' key"))
            })?;
        Ok(serde_json::from_slice(&data.0)?)
    }
}

#[async_trait]
impl StateStore for SecretStore {
    async fn get(&self, name: &str) -> Result<Option<DeployedPackage>> {
        let key = format!("{}{}", PACKAGE_SECRET_PREFIX, name);
        match self.api().get(&key).await {
            Ok(secret) => Ok(Some(Self::parse_secret(&secret)?)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, record: &DeployedPackage) -> Result<()> {
        let api = self.api();
        let key = record.secret_name();

        // Read-modify-write under optimistic concurrency: carry the
        // current resourceVersion into the replace and retry on conflict.
        for _ in 0..UPDATE_ATTEMPTS {
            let existing = match api.get(&key).await {
                Ok(secret) => Some(secret),
                Err(kube::Error::Api(e)) if e.code == 404 => None,
                Err(e) => return Err(e.into()),
            };

            let result = match &existing {
                None => {
                    let secret = self.build_secret(record, None)?;
                    api.create(&PostParams::default(), &secret).await.map(|_| ())
                }
                Some(current) => {
                    let secret =
                        self.build_secret(record, current.metadata.resource_version.clone())?;
                    api.replace(&key, &PostParams::default(), &secret)
                        .await
                        .map(|_| ())
                }
            };

            match result {
                Ok(()) => return Ok(()),
                Err(kube::Error::Api(e)) if e.code == 409 => {
                    tracing::debug!(record = %key, "record conflict, re-reading");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(KubeError::RecordConflict {
            name: record.name.clone(),
            attempts: UPDATE_ATTEMPTS,
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = format!("{}{}", PACKAGE_SECRET_PREFIX, name);
        match self.api().delete(&key, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<DeployedPackage>> {
        let selector = format!("{}=zarf", MANAGED_BY_LABEL);
        let lp = ListParams::default().labels(&selector);
        let secrets = self.api().list(&lp).await?;

        Ok(secrets
            .items
            .iter()
            .filter(|s| {
                s.metadata
                    .name
                    .as_deref()
                    .map(|n| n.starts_with(PACKAGE_SECRET_PREFIX))
                    .unwrap_or(false)
            })
            .filter_map(|s| Self::parse_secret(s).ok())
            .collect())
    }
}

/// In-memory driver for tests and YOLO deploys without a cluster
#[derive(Default)]
pub struct MemoryStore {
    records: tokio::sync::RwLock<std::collections::HashMap<String, DeployedPackage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<DeployedPackage>> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn put(&self, record: &DeployedPackage) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.records.write().await.remove(name);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeployedPackage>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zarf_core::definition::PackageMetadata;

    fn sample_record() -> DeployedPackage {
        let pkg = Package {
            metadata: PackageMetadata {
                name: "p1".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        DeployedPackage::new(&pkg, "0.4.0")
    }

    #[test]
    fn test_secret_name() {
        assert_eq!(sample_record().secret_name(), "zarf-package-p1");
    }

    #[test]
    fn test_record_roundtrip() {
        let mut record = sample_record();
        record.generation = 3;
        record.deployed_components.push(DeployedComponent {
            name: "app".to_string(),
            installed_charts: vec![InstalledChart {
                namespace: "demo".to_string(),
                chart_name: "podinfo".to_string(),
            }],
            status: ComponentStatus::Succeeded,
            observed_generation: 3,
        });
        record.component_webhooks.insert(
            "app".to_string(),
            IndexMap::from([(
                "mutate-images".to_string(),
                Webhook {
                    name: "mutate-images".to_string(),
                    status: WebhookStatus::Running,
                    observed_generation: 3,
                    wait_duration_seconds: Some(60),
                },
            )]),
        );

        let bytes = serde_json::to_vec(&record).unwrap();
        let parsed: DeployedPackage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.generation, 3);
        assert_eq!(parsed.deployed_components[0].status, ComponentStatus::Succeeded);
        assert_eq!(
            parsed.component_webhooks["app"]["mutate-images"].status,
            WebhookStatus::Running
        );
    }

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = MemoryStore::new();
        assert!(store.get("p1").await.unwrap().is_none());

        let mut record = sample_record();
        store.put(&record).await.unwrap();
        assert_eq!(store.get("p1").await.unwrap().unwrap().generation, 1);

        record.generation = 2;
        store.put(&record).await.unwrap();
        assert_eq!(store.get("p1").await.unwrap().unwrap().generation, 2);
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.delete("p1").await.unwrap();
        assert!(store.get("p1").await.unwrap().is_none());
    }
}
