//! Webhook waits
//!
//! In-cluster mutating webhooks record their progress in the deployment
//! record. After installing a component the reconciler polls the record:
//! while any hook for the component reports `running`, it re-fetches
//! until the hook transitions or its wait budget elapses. This is a
//! plain polling state machine over the record, not a coroutine dance.

use std::time::Duration;
use tokio::time::Instant;

use crate::error::{KubeError, Result};
use crate::state::{StateStore, WebhookStatus};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Block until no webhook for `component` is running.
///
/// A hook's own `waitDurationSeconds` overrides the default budget.
pub async fn wait_for_webhooks(
    store: &dyn StateStore,
    package: &str,
    component: &str,
    default_budget: Duration,
) -> Result<()> {
    let start = Instant::now();

    loop {
        let Some(record) = store.get(package).await? else {
            // No record means nothing is mutating this package.
            return Ok(());
        };

        let running: Vec<(String, Duration)> = record
            .component_webhooks
            .get(component)
            .map(|hooks| {
                hooks
                    .values()
                    .filter(|h| h.status == WebhookStatus::Running)
                    .map(|h| {
                        let budget = h
                            .wait_duration_seconds
                            .map(|s| Duration::from_secs(s as u64))
                            .unwrap_or(default_budget);
                        (h.name.clone(), budget)
                    })
                    .collect()
            })
            .unwrap_or_default();

        if running.is_empty() {
            return Ok(());
        }

        for (hook, budget) in &running {
            if start.elapsed() >= *budget {
                return Err(KubeError::WebhookTimeout {
                    hook: hook.clone(),
                    component: component.to_string(),
                });
            }
        }

        tracing::debug!(
            package,
            component,
            waiting = running.len(),
            "waiting for webhooks"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DeployedPackage, MemoryStore, Webhook};
    use indexmap::IndexMap;
    use std::sync::Arc;
    use zarf_core::definition::{Package, PackageMetadata};

    fn record_with_hook(status: WebhookStatus, wait_seconds: Option<u32>) -> DeployedPackage {
        let pkg = Package {
            metadata: PackageMetadata {
                name: "p1".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut record = DeployedPackage::new(&pkg, "0.4.0");
        record.component_webhooks.insert(
            "app".to_string(),
            IndexMap::from([(
                "mutator".to_string(),
                Webhook {
                    name: "mutator".to_string(),
                    status,
                    observed_generation: 1,
                    wait_duration_seconds: wait_seconds,
                },
            )]),
        );
        record
    }

    #[tokio::test]
    async fn test_no_record_returns_immediately() {
        let store = MemoryStore::new();
        wait_for_webhooks(&store, "p1", "app", Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_completed_hook_returns() {
        let store = MemoryStore::new();
        store
            .put(&record_with_hook(WebhookStatus::Succeeded, None))
            .await
            .unwrap();
        wait_for_webhooks(&store, "p1", "app", Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_waits_for_transition() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(&record_with_hook(WebhookStatus::Running, Some(30)))
            .await
            .unwrap();

        let flipper = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            flipper
                .put(&record_with_hook(WebhookStatus::Succeeded, Some(30)))
                .await
                .unwrap();
        });

        wait_for_webhooks(store.as_ref(), "p1", "app", Duration::from_secs(30))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_budget_exceeded() {
        let store = MemoryStore::new();
        store
            .put(&record_with_hook(WebhookStatus::Running, Some(0)))
            .await
            .unwrap();

        let err = wait_for_webhooks(&store, "p1", "app", Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::WebhookTimeout { .. }));
    }
}
