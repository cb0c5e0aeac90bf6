//! Post-install health checks
//!
//! Each check names an object by apiVersion/kind/name/namespace and is
//! polled until it reports ready or the budget runs out. Readiness is a
//! pragmatic heuristic: a True Ready/Available condition when the object
//! publishes conditions, replica counts for workloads, existence
//! otherwise.

use kube::api::Api;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Client;
use std::time::Duration;

use zarf_core::component::HealthCheck;

use crate::error::{KubeError, Result};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll every check until ready; error on the first to exceed `timeout`.
pub async fn wait_for_health_checks(
    client: &Client,
    checks: &[HealthCheck],
    timeout: Duration,
) -> Result<()> {
    for check in checks {
        wait_for_check(client, check, timeout).await?;
    }
    Ok(())
}

async fn wait_for_check(
    client: &Client,
    check: &HealthCheck,
    timeout: Duration,
) -> Result<()> {
    let api = api_for(client, check)?;
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if let Ok(obj) = api.get(&check.name).await {
            if is_ready(&obj) {
                tracing::debug!(kind = %check.kind, name = %check.name, "health check passed");
                return Ok(());
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(KubeError::HealthCheckTimeout {
                kind: check.kind.clone(),
                name: check.name.clone(),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn api_for(client: &Client, check: &HealthCheck) -> Result<Api<DynamicObject>> {
    let (group, version) = match check.api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), check.api_version.clone()),
    };
    let gvk = GroupVersionKind {
        group,
        version,
        kind: check.kind.clone(),
    };
    let ar = ApiResource::from_gvk(&gvk);

    Ok(match &check.namespace {
        Some(namespace) => Api::namespaced_with(client.clone(), namespace, &ar),
        None => Api::all_with(client.clone(), &ar),
    })
}

/// Readiness heuristic over an arbitrary object's status
pub fn is_ready(obj: &DynamicObject) -> bool {
    let status = &obj.data["status"];

    if let Some(conditions) = status["conditions"].as_array() {
        return conditions.iter().any(|c| {
            matches!(c["type"].as_str(), Some("Ready") | Some("Available"))
                && c["status"].as_str() == Some("True")
        });
    }

    if let Some(desired) = obj.data["spec"]["replicas"].as_i64() {
        return status["readyReplicas"].as_i64().unwrap_or(0) >= desired;
    }

    // No status to judge by; existing is as ready as it gets.
    true
}
