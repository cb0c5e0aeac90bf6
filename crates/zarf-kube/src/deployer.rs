//! The deployment reconciler
//!
//! Components deploy in declaration order through a per-component state
//! machine: PENDING -> DEPLOYING -> SUCCEEDED, or FAILED -> (on-failure
//! actions) -> ABORTED. The deployment record is persisted after every
//! component so an interrupted deploy is observable and resumable.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use zarf_core::component::{Chart, Component, DataInjection};
use zarf_core::config::{HEALTH_CHECK_TIMEOUT, WEBHOOK_TIMEOUT};
use zarf_core::definition::Package;
use zarf_core::layout::PackageLayout;
use zarf_core::variables::{resolve_variables, SetVariableMap};
use zarf_compose::Templater;

use crate::actions::{ActionPhase, ActionRunner};
use crate::error::{KubeError, Result};
use crate::health::wait_for_health_checks;
use crate::helm::{
    generate_synthetic_chart, synthetic_chart_name, synthetic_release_name, ChartInstaller,
};
use crate::mirror::{mirror_images, mirror_repos, MirrorTargets};
use crate::state::{
    ComponentStatus, DeployedComponent, DeployedPackage, InstalledChart, StateStore,
};
use crate::webhooks::wait_for_webhooks;

/// Injects packaged file trees into running pods. The embedded agent
/// implementation lives with the cluster services; tests use fakes.
#[async_trait::async_trait]
pub trait DataInjector: Send + Sync {
    async fn inject(&self, injection: &DataInjection, source_dir: &Path) -> Result<()>;
}

/// Options for a package deploy or removal
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Optional components chosen by the operator
    pub components: Vec<String>,
    /// Deploy-time variable values
    pub set_variables: IndexMap<String, String>,
    /// Skip interactive prompts
    pub confirm: bool,
    pub cli_version: String,
    pub health_check_timeout: Duration,
    pub webhook_timeout: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            components: Vec::new(),
            set_variables: IndexMap::new(),
            confirm: false,
            cli_version: env!("CARGO_PKG_VERSION").to_string(),
            health_check_timeout: HEALTH_CHECK_TIMEOUT,
            webhook_timeout: WEBHOOK_TIMEOUT,
        }
    }
}

/// Outcome of a package deploy
#[derive(Debug)]
pub struct DeployResult {
    pub deployed: Vec<String>,
    pub failed: Vec<String>,
    pub generation: u64,
}

/// Reconciles loaded packages against a cluster
pub struct Deployer {
    store: Arc<dyn StateStore>,
    installer: Arc<dyn ChartInstaller>,
    client: Option<kube::Client>,
    mirror: MirrorTargets,
    injector: Option<Arc<dyn DataInjector>>,
    options: DeployOptions,
}

impl Deployer {
    pub fn new(
        store: Arc<dyn StateStore>,
        installer: Arc<dyn ChartInstaller>,
        options: DeployOptions,
    ) -> Self {
        Self {
            store,
            installer,
            client: None,
            mirror: MirrorTargets::default(),
            injector: None,
            options,
        }
    }

    pub fn with_client(mut self, client: kube::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_mirror(mut self, mirror: MirrorTargets) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_injector(mut self, injector: Arc<dyn DataInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    /// Deploy a fully loaded, verified package.
    pub async fn deploy(&self, pkg: &Package, layout: &PackageLayout) -> Result<DeployResult> {
        let mut variables = self.resolve_variables(pkg)?;
        let selected = select_components(pkg, &self.options.components)?;

        let existing = self.store.get(&pkg.metadata.name).await?;
        let mut record = DeployedPackage::new(pkg, &self.options.cli_version);
        if let Some(existing) = existing {
            record.generation = existing.generation + 1;
            // Webhook observations and connect strings survive upgrades.
            record.component_webhooks = existing.component_webhooks;
            record.connect_strings = existing.connect_strings;
        }

        let mut deployed = Vec::new();
        let mut failed = Vec::new();

        for component in selected {
            set_component_state(
                &mut record,
                &component.name,
                ComponentStatus::Deploying,
                Vec::new(),
            );
            self.store.put(&record).await?;

            match self
                .deploy_component(pkg, component, layout, &mut variables)
                .await
            {
                Ok(installed) => {
                    set_component_state(
                        &mut record,
                        &component.name,
                        ComponentStatus::Succeeded,
                        installed,
                    );
                    self.store.put(&record).await?;
                    deployed.push(component.name.clone());
                }
                Err(err) => {
                    tracing::error!(component = %component.name, error = %err, "component failed");
                    self.run_failure_actions(component, layout, &mut variables).await;
                    set_component_state(
                        &mut record,
                        &component.name,
                        ComponentStatus::Aborted,
                        Vec::new(),
                    );
                    self.store.put(&record).await?;
                    failed.push(component.name.clone());

                    if component.required {
                        return Err(KubeError::RequiredComponentFailed {
                            name: component.name.clone(),
                        });
                    }
                }
            }
        }

        Ok(DeployResult {
            deployed,
            failed,
            generation: record.generation,
        })
    }

    async fn deploy_component(
        &self,
        pkg: &Package,
        component: &Component,
        layout: &PackageLayout,
        variables: &mut SetVariableMap,
    ) -> Result<Vec<InstalledChart>> {
        let base = component_base(layout, &component.name);
        let runner = ActionRunner {
            base_dir: &base,
            client: self.client.as_ref(),
            component: &component.name,
        };

        runner
            .run_phase(&component.actions.on_deploy, ActionPhase::Before, variables)
            .await?;

        self.template_component(pkg, &base, variables)?;
        place_files(component, &base)?;

        if !pkg.metadata.yolo {
            if let Some(git) = &self.mirror.git {
                mirror_repos(&base.join("repos"), git)?;
            }
            if let Some(registry) = &self.mirror.registry {
                mirror_images(layout, registry, &component.images).await?;
            }
        }

        if !component.data_injections.is_empty() {
            let Some(injector) = &self.injector else {
                return Err(KubeError::NoDataInjector {
                    component: component.name.clone(),
                    count: component.data_injections.len(),
                });
            };
            for (idx, injection) in component.data_injections.iter().enumerate() {
                injector
                    .inject(injection, &base.join("data").join(idx.to_string()))
                    .await?;
            }
        }

        let mut installed = Vec::new();

        for chart in &component.charts {
            let chart_dir = base.join("charts").join(chart.staged_dir_name());
            let values: Vec<PathBuf> = chart
                .values_files
                .iter()
                .enumerate()
                .map(|(idx, _)| {
                    base.join("charts")
                        .join(format!("{}-values-{}.yaml", chart.name, idx))
                })
                .collect();
            let namespace = chart.namespace.clone().unwrap_or_else(|| "default".to_string());
            let release = chart
                .release_name
                .clone()
                .unwrap_or_else(|| chart.name.clone());

            self.installer
                .install_or_upgrade(chart, &chart_dir, &values, &namespace, &release, !chart.no_wait)
                .await?;
            installed.push(InstalledChart {
                namespace,
                chart_name: release,
            });
        }

        for manifest in &component.manifests {
            let files: Vec<PathBuf> = manifest
                .files
                .iter()
                .enumerate()
                .map(|(idx, _)| {
                    base.join("manifests")
                        .join(format!("{}-{}.yaml", manifest.name, idx))
                })
                .filter(|p| p.exists())
                .collect();

            let chart_name =
                synthetic_chart_name(&pkg.metadata.name, &component.name, &manifest.name);
            let release = synthetic_release_name(&chart_name);
            let chart_dir =
                generate_synthetic_chart(&chart_name, &files, &base.join(".synthetic"))?;
            let namespace = manifest
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string());

            let synthetic = Chart {
                name: chart_name,
                namespace: Some(namespace.clone()),
                release_name: Some(release.clone()),
                no_wait: manifest.no_wait,
                ..Default::default()
            };
            self.installer
                .install_or_upgrade(
                    &synthetic,
                    &chart_dir,
                    &[],
                    &namespace,
                    &release,
                    !manifest.no_wait,
                )
                .await?;
            installed.push(InstalledChart {
                namespace,
                chart_name: release,
            });
        }

        if let Some(client) = &self.client {
            if !component.health_checks.is_empty() {
                wait_for_health_checks(
                    client,
                    &component.health_checks,
                    self.options.health_check_timeout,
                )
                .await?;
            }
        }

        wait_for_webhooks(
            self.store.as_ref(),
            &pkg.metadata.name,
            &component.name,
            self.options.webhook_timeout,
        )
        .await?;

        runner
            .run_phase(&component.actions.on_deploy, ActionPhase::After, variables)
            .await?;
        runner
            .run_phase(&component.actions.on_deploy, ActionPhase::OnSuccess, variables)
            .await?;

        Ok(installed)
    }

    /// Remove deployed components in reverse order, pruning the record.
    pub async fn remove(
        &self,
        name: &str,
        layout: Option<&PackageLayout>,
        components: &[String],
    ) -> Result<()> {
        let Some(mut record) = self.store.get(name).await? else {
            return Err(KubeError::RecordNotFound {
                name: name.to_string(),
            });
        };
        let pkg = record.data.clone();
        let mut variables = SetVariableMap::new();

        let to_remove: Vec<DeployedComponent> = record
            .deployed_components
            .iter()
            .filter(|c| components.is_empty() || components.contains(&c.name))
            .cloned()
            .rev()
            .collect();

        for deployed in to_remove {
            set_component_state(
                &mut record,
                &deployed.name,
                ComponentStatus::Removing,
                deployed.installed_charts.clone(),
            );
            self.store.put(&record).await?;

            let base = layout
                .map(|l| component_base(l, &deployed.name))
                .unwrap_or_else(std::env::temp_dir);
            let component = pkg.component(&deployed.name);

            if let Some(component) = component {
                let runner = ActionRunner {
                    base_dir: &base,
                    client: self.client.as_ref(),
                    component: &deployed.name,
                };
                runner
                    .run_phase(&component.actions.on_remove, ActionPhase::Before, &mut variables)
                    .await?;
            }

            for chart in deployed.installed_charts.iter().rev() {
                self.installer
                    .uninstall(&chart.chart_name, &chart.namespace, true)
                    .await?;
            }

            if let Some(component) = component {
                let runner = ActionRunner {
                    base_dir: &base,
                    client: self.client.as_ref(),
                    component: &deployed.name,
                };
                runner
                    .run_phase(&component.actions.on_remove, ActionPhase::After, &mut variables)
                    .await?;
                runner
                    .run_phase(
                        &component.actions.on_remove,
                        ActionPhase::OnSuccess,
                        &mut variables,
                    )
                    .await?;
            }

            record.deployed_components.retain(|c| c.name != deployed.name);
            record.component_webhooks.shift_remove(&deployed.name);
            if record.deployed_components.is_empty() {
                self.store.delete(name).await?;
            } else {
                self.store.put(&record).await?;
            }
        }

        Ok(())
    }

    fn resolve_variables(&self, pkg: &Package) -> Result<SetVariableMap> {
        for variable in &pkg.variables {
            if variable.prompt
                && !self.options.set_variables.contains_key(&variable.name)
                && !self.options.confirm
            {
                return Err(KubeError::PromptRequired {
                    name: variable.name.clone(),
                });
            }
        }
        Ok(resolve_variables(&pkg.variables, &self.options.set_variables)?)
    }

    /// Substitute deploy-time tokens across the component's staged files.
    fn template_component(
        &self,
        pkg: &Package,
        base: &Path,
        variables: &SetVariableMap,
    ) -> Result<()> {
        if !base.exists() {
            return Ok(());
        }
        let templater = Templater::new()
            .with_variables(variables)
            .with_constants(&pkg.constants);

        for entry in walk_files(base) {
            if zarf_compose::is_text_file(&entry)? {
                templater.apply(&entry)?;
            }
        }
        Ok(())
    }

    async fn run_failure_actions(
        &self,
        component: &Component,
        layout: &PackageLayout,
        variables: &mut SetVariableMap,
    ) {
        let base = component_base(layout, &component.name);
        let runner = ActionRunner {
            base_dir: &base,
            client: self.client.as_ref(),
            component: &component.name,
        };
        if let Err(err) = runner
            .run_phase(&component.actions.on_deploy, ActionPhase::OnFailure, variables)
            .await
        {
            tracing::warn!(component = %component.name, error = %err, "on-failure action failed");
        }
    }
}

/// Select and order components: required always, optional by request,
/// groups single-select with defaults. Order = declaration order.
pub fn select_components<'p>(
    pkg: &'p Package,
    requested: &[String],
) -> Result<Vec<&'p Component>> {
    for name in requested {
        if pkg.component(name).is_none() {
            return Err(KubeError::ComponentNotFound { name: name.clone() });
        }
    }

    // Resolve each group to exactly one member first.
    let mut group_choice: HashMap<&str, &str> = HashMap::new();
    let mut groups: IndexMap<&str, Vec<&Component>> = IndexMap::new();
    for component in &pkg.components {
        if let Some(group) = &component.group {
            groups.entry(group.as_str()).or_default().push(component);
        }
    }
    for (group, members) in &groups {
        let requested_members: Vec<&&Component> = members
            .iter()
            .filter(|m| requested.contains(&m.name))
            .collect();
        let chosen = match requested_members.len() {
            0 => members
                .iter()
                .find(|m| m.default)
                .ok_or(KubeError::GroupUnresolved {
                    group: group.to_string(),
                })?,
            1 => requested_members[0],
            _ => {
                return Err(KubeError::GroupConflict {
                    group: group.to_string(),
                })
            }
        };
        group_choice.insert(group, &chosen.name);
    }

    let mut selected = Vec::new();
    for component in &pkg.components {
        let include = match &component.group {
            Some(group) => group_choice.get(group.as_str()) == Some(&component.name.as_str()),
            None => component.required || requested.contains(&component.name),
        };
        if include {
            selected.push(component);
        }
    }
    Ok(selected)
}

fn set_component_state(
    record: &mut DeployedPackage,
    name: &str,
    status: ComponentStatus,
    installed_charts: Vec<InstalledChart>,
) {
    let generation = record.generation;
    match record
        .deployed_components
        .iter_mut()
        .find(|c| c.name == name)
    {
        Some(existing) => {
            existing.status = status;
            existing.observed_generation = generation;
            if !installed_charts.is_empty() || status != ComponentStatus::Deploying {
                existing.installed_charts = installed_charts;
            }
        }
        None => record.deployed_components.push(DeployedComponent {
            name: name.to_string(),
            installed_charts,
            status,
            observed_generation: generation,
        }),
    }
}

fn component_base(layout: &PackageLayout, name: &str) -> PathBuf {
    let dir = layout.component_dir(name);
    if dir.exists() {
        dir
    } else {
        layout.base().to_path_buf()
    }
}

fn place_files(component: &Component, base: &Path) -> Result<()> {
    for (idx, file) in component.files.iter().enumerate() {
        let name = Path::new(&file.target)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("file-{}", idx));
        let staged = base.join("files").join(idx.to_string()).join(&name);
        if !staged.exists() {
            continue;
        }

        let dest = PathBuf::from(&file.target);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&staged, &dest)?;

        #[cfg(unix)]
        if file.executable {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&dest)?.permissions();
            perms.set_mode(perms.mode() | 0o111);
            std::fs::set_permissions(&dest, perms)?;
        }

        #[cfg(unix)]
        for link in &file.symlinks {
            let link_path = PathBuf::from(link);
            if let Some(parent) = link_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let _ = std::fs::remove_file(&link_path);
            std::os::unix::fs::symlink(&dest, &link_path)?;
        }
    }
    Ok(())
}

fn walk_files(base: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![base.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;
    use tempfile::TempDir;
    use tokio::sync::Mutex;
    use zarf_core::component::Manifest;
    use zarf_core::definition::PackageMetadata;

    /// Installer that records calls instead of talking to Helm
    #[derive(Default)]
    struct RecordingInstaller {
        installs: Mutex<Vec<(String, String)>>,
        uninstalls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl ChartInstaller for RecordingInstaller {
        async fn install_or_upgrade(
            &self,
            _chart: &Chart,
            _chart_dir: &Path,
            _values_files: &[PathBuf],
            namespace: &str,
            release_name: &str,
            _wait: bool,
        ) -> Result<()> {
            self.installs
                .lock()
                .await
                .push((namespace.to_string(), release_name.to_string()));
            Ok(())
        }

        async fn uninstall(
            &self,
            release_name: &str,
            namespace: &str,
            _wait: bool,
        ) -> Result<()> {
            self.uninstalls
                .lock()
                .await
                .push((namespace.to_string(), release_name.to_string()));
            Ok(())
        }
    }

    fn sample_package() -> Package {
        Package {
            metadata: PackageMetadata {
                name: "p1".to_string(),
                yolo: true,
                ..Default::default()
            },
            components: vec![
                Component {
                    name: "a".to_string(),
                    required: true,
                    manifests: vec![Manifest {
                        name: "core".to_string(),
                        namespace: Some("demo".to_string()),
                        files: vec!["core.yaml".to_string()],
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                Component {
                    name: "b".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    /// Stage a layout the way a load leaves it: unpacked component dirs
    /// with conventional manifest paths.
    fn staged_layout(temp: &TempDir, pkg: &Package) -> PackageLayout {
        let layout = PackageLayout::create(&temp.path().join("layout")).unwrap();
        for component in &pkg.components {
            let dir = layout.component_dir(&component.name).join("manifests");
            std::fs::create_dir_all(&dir).unwrap();
            for manifest in &component.manifests {
                for (idx, _) in manifest.files.iter().enumerate() {
                    std::fs::write(
                        dir.join(format!("{}-{}.yaml", manifest.name, idx)),
                        "kind: ConfigMap\n",
                    )
                    .unwrap();
                }
            }
        }
        layout
    }

    fn deployer(
        store: Arc<MemoryStore>,
        installer: Arc<RecordingInstaller>,
        components: Vec<String>,
    ) -> Deployer {
        Deployer::new(
            store,
            installer,
            DeployOptions {
                components,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_deploy_records_state_and_generation() {
        let temp = TempDir::new().unwrap();
        let pkg = sample_package();
        let layout = staged_layout(&temp, &pkg);
        let store = Arc::new(MemoryStore::new());
        let installer = Arc::new(RecordingInstaller::default());

        // First deploy selects the optional component too.
        let result = deployer(store.clone(), installer.clone(), vec!["b".to_string()])
            .deploy(&pkg, &layout)
            .await
            .unwrap();
        assert_eq!(result.deployed, vec!["a", "b"]);
        assert_eq!(result.generation, 1);

        let record = store.get("p1").await.unwrap().unwrap();
        assert_eq!(record.generation, 1);
        assert_eq!(record.deployed_components.len(), 2);
        assert_eq!(record.deployed_components[0].status, ComponentStatus::Succeeded);

        // The synthetic chart release is the stable SHA-1 form.
        let expected_release = synthetic_release_name(&synthetic_chart_name("p1", "a", "core"));
        assert_eq!(
            record.deployed_components[0].installed_charts,
            vec![InstalledChart {
                namespace: "demo".to_string(),
                chart_name: expected_release,
            }]
        );

        // Redeploying only the required component bumps the generation
        // and drops `b` from the record.
        let result = deployer(store.clone(), installer, vec![])
            .deploy(&pkg, &layout)
            .await
            .unwrap();
        assert_eq!(result.deployed, vec!["a"]);
        assert_eq!(result.generation, 2);

        let record = store.get("p1").await.unwrap().unwrap();
        assert_eq!(record.generation, 2);
        let names: Vec<_> = record
            .deployed_components
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, vec!["a"]);
    }

    #[tokio::test]
    async fn test_optional_component_failure_continues() {
        let temp = TempDir::new().unwrap();
        let mut pkg = sample_package();
        // Make the optional component fail via a bad action.
        pkg.components[1]
            .actions
            .on_deploy
            .before
            .push(zarf_core::component::Action {
                cmd: Some("exit 1".to_string()),
                max_total_seconds: Some(5),
                ..Default::default()
            });

        let layout = staged_layout(&temp, &pkg);
        let store = Arc::new(MemoryStore::new());
        let installer = Arc::new(RecordingInstaller::default());

        let result = deployer(store.clone(), installer, vec!["b".to_string()])
            .deploy(&pkg, &layout)
            .await
            .unwrap();
        assert_eq!(result.deployed, vec!["a"]);
        assert_eq!(result.failed, vec!["b"]);

        let record = store.get("p1").await.unwrap().unwrap();
        let b = record
            .deployed_components
            .iter()
            .find(|c| c.name == "b")
            .unwrap();
        assert_eq!(b.status, ComponentStatus::Aborted);
    }

    #[tokio::test]
    async fn test_required_component_failure_aborts() {
        let temp = TempDir::new().unwrap();
        let mut pkg = sample_package();
        pkg.components[0]
            .actions
            .on_deploy
            .before
            .push(zarf_core::component::Action {
                cmd: Some("exit 1".to_string()),
                max_total_seconds: Some(5),
                ..Default::default()
            });

        let layout = staged_layout(&temp, &pkg);
        let store = Arc::new(MemoryStore::new());
        let installer = Arc::new(RecordingInstaller::default());

        let err = deployer(store, installer, vec![])
            .deploy(&pkg, &layout)
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::RequiredComponentFailed { .. }));
    }

    #[tokio::test]
    async fn test_remove_reverses_and_prunes() {
        let temp = TempDir::new().unwrap();
        let pkg = sample_package();
        let layout = staged_layout(&temp, &pkg);
        let store = Arc::new(MemoryStore::new());
        let installer = Arc::new(RecordingInstaller::default());

        deployer(store.clone(), installer.clone(), vec!["b".to_string()])
            .deploy(&pkg, &layout)
            .await
            .unwrap();

        deployer(store.clone(), installer.clone(), vec![])
            .remove("p1", Some(&layout), &[])
            .await
            .unwrap();

        assert!(store.get("p1").await.unwrap().is_none());
        assert_eq!(installer.uninstalls.lock().await.len(), 1);
    }

    #[test]
    fn test_select_components_groups() {
        let pkg = Package {
            metadata: PackageMetadata {
                name: "p".to_string(),
                ..Default::default()
            },
            components: vec![
                Component {
                    name: "core".to_string(),
                    required: true,
                    ..Default::default()
                },
                Component {
                    name: "postgres".to_string(),
                    group: Some("db".to_string()),
                    default: true,
                    ..Default::default()
                },
                Component {
                    name: "mysql".to_string(),
                    group: Some("db".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        // Default selection picks the group default.
        let names: Vec<_> = select_components(&pkg, &[])
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, vec!["core", "postgres"]);

        // Explicit selection overrides the default.
        let names: Vec<_> = select_components(&pkg, &["mysql".to_string()])
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names, vec!["core", "mysql"]);

        // Two members of one group conflict.
        let err = select_components(
            &pkg,
            &["mysql".to_string(), "postgres".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, KubeError::GroupConflict { .. }));

        // Unknown names are rejected up front.
        let err = select_components(&pkg, &["nope".to_string()]).unwrap_err();
        assert!(matches!(err, KubeError::ComponentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_prompt_variable_requires_value() {
        let temp = TempDir::new().unwrap();
        let mut pkg = sample_package();
        pkg.variables.push(zarf_core::variables::Variable {
            name: "DB_PASSWORD".to_string(),
            prompt: true,
            sensitive: true,
            ..Default::default()
        });
        let layout = staged_layout(&temp, &pkg);
        let store = Arc::new(MemoryStore::new());
        let installer = Arc::new(RecordingInstaller::default());

        let err = deployer(store.clone(), installer.clone(), vec![])
            .deploy(&pkg, &layout)
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::PromptRequired { .. }));

        // Supplying the value unblocks the deploy.
        let mut options = DeployOptions::default();
        options
            .set_variables
            .insert("DB_PASSWORD".to_string(), "hunter2".to_string());
        Deployer::new(store, installer, options)
            .deploy(&pkg, &layout)
            .await
            .unwrap();
    }
}
