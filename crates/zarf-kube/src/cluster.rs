//! Cluster access helpers

use async_trait::async_trait;
use kube::api::Api;
use kube::core::DynamicObject;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;

use zarf_core::component::ActionWaitCluster;
use zarf_core::definition::Package;
use zarf_transport::source::DeployedPackageLookup;

use crate::error::{KubeError, Result};
use crate::state::StateStore;

/// Connect using the ambient kubeconfig / in-cluster environment
pub async fn default_client() -> Result<Client> {
    Ok(Client::try_default().await?)
}

/// Resolve a kind name to a dynamic API via discovery
pub async fn dynamic_api(
    client: &Client,
    kind: &str,
    namespace: Option<&str>,
) -> Result<Api<DynamicObject>> {
    let discovery = kube::discovery::Discovery::new(client.clone()).run().await?;

    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            if ar.kind.eq_ignore_ascii_case(kind) {
                let api = if caps.scope == kube::discovery::Scope::Namespaced {
                    Api::namespaced_with(
                        client.clone(),
                        namespace.unwrap_or("default"),
                        &ar,
                    )
                } else {
                    Api::all_with(client.clone(), &ar)
                };
                return Ok(api);
            }
        }
    }

    Err(KubeError::Action {
        component: String::new(),
        message: format!("unknown resource kind '{}'", kind),
    })
}

/// Poll until a cluster resource exists (and meets its condition). The
/// caller bounds this with a timeout.
pub async fn wait_for_cluster_resource(
    client: &Client,
    wait: &ActionWaitCluster,
) -> Result<()> {
    let api = dynamic_api(client, &wait.kind, wait.namespace.as_deref()).await?;

    loop {
        if let Ok(obj) = api.get(&wait.name).await {
            match wait.condition.as_deref() {
                None | Some("exists") | Some("Exists") => return Ok(()),
                Some(condition) => {
                    if has_condition(&obj, condition) {
                        return Ok(());
                    }
                }
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Whether an object reports `condition` with status True
pub fn has_condition(obj: &DynamicObject, condition: &str) -> bool {
    obj.data["status"]["conditions"]
        .as_array()
        .map(|conditions| {
            conditions.iter().any(|c| {
                c["type"].as_str() == Some(condition) && c["status"].as_str() == Some("True")
            })
        })
        .unwrap_or(false)
}

/// Bridges the transport's in-cluster source to the state store
pub struct ClusterRecordLookup {
    store: Arc<dyn StateStore>,
}

impl ClusterRecordLookup {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DeployedPackageLookup for ClusterRecordLookup {
    async fn definition(
        &self,
        name: &str,
    ) -> zarf_transport::Result<Option<Package>> {
        let record = self.store.get(name).await.map_err(|e| {
            zarf_transport::TransportError::Cluster {
                message: e.to_string(),
            }
        })?;
        Ok(record.map(|r| r.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DeployedPackage, MemoryStore};
    use zarf_core::definition::PackageMetadata;

    #[tokio::test]
    async fn test_cluster_record_lookup() {
        let store = Arc::new(MemoryStore::new());
        let pkg = Package {
            metadata: PackageMetadata {
                name: "deployed".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        store.put(&DeployedPackage::new(&pkg, "0.4.0")).await.unwrap();

        let lookup = ClusterRecordLookup::new(store);
        let found = lookup.definition("deployed").await.unwrap();
        assert_eq!(found.unwrap().metadata.name, "deployed");
        assert!(lookup.definition("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_has_condition() {
        let mut obj = DynamicObject::new("web", &kube::core::ApiResource {
            group: "apps".to_string(),
            version: "v1".to_string(),
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            plural: "deployments".to_string(),
        });
        obj.data = serde_json::json!({
            "status": {
                "conditions": [
                    { "type": "Available", "status": "True" },
                    { "type": "Progressing", "status": "False" }
                ]
            }
        });
        assert!(has_condition(&obj, "Available"));
        assert!(!has_condition(&obj, "Progressing"));
        assert!(!has_condition(&obj, "Ready"));
    }
}
