//! Component model: the logically grouped slices of a package

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::variables::SetVariable;

/// A package component - applied atomically at deploy time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Component name (unique within a package)
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Required components are always deployed
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,

    /// Mutually exclusive selection group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Whether this component is the default selection within its group
    #[serde(default, skip_serializing_if = "is_false")]
    pub default: bool,

    /// Filters restricting where this component applies
    #[serde(default, skip_serializing_if = "ComponentOnly::is_empty")]
    pub only: ComponentOnly,

    /// Optional import of another definition merged into this component
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import: Option<ComponentImport>,

    /// OCI image references to embed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    /// Git repository references, with optional `@ref` suffix
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<String>,

    /// Raw manifest groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<Manifest>,

    /// Helm charts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<Chart>,

    /// Files staged onto the target host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ComponentFile>,

    /// File trees injected into running pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_injections: Vec<DataInjection>,

    /// Lifecycle command lists
    #[serde(default, skip_serializing_if = "ComponentActions::is_empty")]
    pub actions: ComponentActions,

    /// Objects polled for readiness after install
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub health_checks: Vec<HealthCheck>,
}

/// Filters restricting where a component applies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOnly {
    /// Host OS filter (linux, darwin, windows)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_os: Option<String>,

    #[serde(default, skip_serializing_if = "OnlyCluster::is_empty")]
    pub cluster: OnlyCluster,

    /// Build flavor filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlyCluster {
    /// Target architecture (amd64, arm64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,

    /// Cluster distributions this component applies to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distros: Vec<String>,
}

impl ComponentOnly {
    pub fn is_empty(&self) -> bool {
        self.local_os.is_none() && self.cluster.is_empty() && self.flavor.is_none()
    }
}

impl OnlyCluster {
    pub fn is_empty(&self) -> bool {
        self.architecture.is_none() && self.distros.is_empty()
    }
}

/// Import of another definition into a component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentImport {
    /// Relative path to a directory containing a definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// OCI reference to a published package (`oci://...`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Component to import; defaults to the importing component's name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A group of raw Kubernetes manifests installed as one synthetic chart
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Kustomization directories rendered at create-time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kustomizations: Vec<String>,

    /// Skip waiting for resources to report ready
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_wait: bool,
}

/// A Helm chart reference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Chart source: helm repo URL, git URL, or `oci://` reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Path within a git repository holding the chart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_path: Option<String>,

    /// Chart name within a repository when it differs from `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,

    /// Path to a chart directory on the local filesystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub no_wait: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values_files: Vec<String>,

    /// Values exposed as deploy-time variable overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<ChartVariable>,
}

impl Chart {
    /// Directory name a staged chart lives under: `<name>-<version>`
    pub fn staged_dir_name(&self) -> String {
        match &self.version {
            Some(version) => format!("{}-{}", self.name, version),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVariable {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Values path the variable is written to (e.g. `replicas.count`)
    pub path: String,
}

/// A file staged to a destination path at deploy time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentFile {
    /// Local path or URL to fetch
    pub source: String,

    /// Expected SHA-256 of the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,

    /// Destination path
    pub target: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub executable: bool,

    /// Additional symlinks pointed at the target
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symlinks: Vec<String>,

    /// Path to extract from a downloaded archive instead of the whole file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_path: Option<String>,
}

/// A file tree injected into running pods by label selector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInjection {
    pub source: String,
    pub target: DataInjectionTarget,

    #[serde(default, skip_serializing_if = "is_false")]
    pub compress: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInjectionTarget {
    pub namespace: String,
    pub selector: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    pub path: String,
}

/// Lifecycle action lists grouped by operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentActions {
    #[serde(default, skip_serializing_if = "ActionSet::is_empty")]
    pub on_create: ActionSet,

    #[serde(default, skip_serializing_if = "ActionSet::is_empty")]
    pub on_deploy: ActionSet,

    #[serde(default, skip_serializing_if = "ActionSet::is_empty")]
    pub on_remove: ActionSet,
}

impl ComponentActions {
    pub fn is_empty(&self) -> bool {
        self.on_create.is_empty() && self.on_deploy.is_empty() && self.on_remove.is_empty()
    }
}

/// Actions attached to one lifecycle operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSet {
    #[serde(default, skip_serializing_if = "ActionDefaults::is_empty")]
    pub defaults: ActionDefaults,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<Action>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<Action>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<Action>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<Action>,
}

impl ActionSet {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty()
            && self.after.is_empty()
            && self.on_success.is_empty()
            && self.on_failure.is_empty()
    }
}

/// Defaults applied to every action in a set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefaults {
    #[serde(default, skip_serializing_if = "is_false")]
    pub mute: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<Shell>,
}

impl ActionDefaults {
    pub fn is_empty(&self) -> bool {
        !self.mute
            && self.max_total_seconds.is_none()
            && self.max_retries.is_none()
            && self.dir.is_none()
            && self.env.is_empty()
            && self.shell.is_none()
    }
}

/// A single lifecycle action
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Command to run; mutually exclusive with `wait`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_total_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Extra environment, `KEY=VALUE` entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<Shell>,

    /// Variables captured from the command's stdout
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set_variables: Vec<SetVariable>,

    /// Wait for a cluster resource or network endpoint; mutually exclusive with `cmd`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<ActionWait>,
}

/// Per-OS shell override for an action
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub darwin: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionWait {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ActionWaitCluster>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<ActionWaitNetwork>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionWaitCluster {
    pub kind: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Condition to wait for (e.g. `Ready`, defaults to existence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionWaitNetwork {
    /// `tcp`, `http` or `https`
    pub protocol: String,
    pub address: String,

    /// Expected HTTP status code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

/// A namespaced object reference polled for readiness post-install
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub api_version: String,
    pub kind: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !b
}

impl Component {
    /// Validate internal consistency of the component
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CoreError::InvalidDefinition {
                message: "component name cannot be empty".to_string(),
            });
        }

        if let Some(import) = &self.import {
            match (&import.path, &import.url) {
                (Some(_), Some(_)) => {
                    return Err(CoreError::InvalidDefinition {
                        message: format!(
                            "component '{}' import cannot set both path and url",
                            self.name
                        ),
                    })
                }
                (None, None) => {
                    return Err(CoreError::InvalidDefinition {
                        message: format!(
                            "component '{}' import must set either path or url",
                            self.name
                        ),
                    })
                }
                _ => {}
            }
            if let Some(url) = &import.url {
                if !url.starts_with("oci://") {
                    return Err(CoreError::InvalidDefinition {
                        message: format!(
                            "component '{}' import url must use the oci:// scheme",
                            self.name
                        ),
                    });
                }
            }
        }

        for set in [
            &self.actions.on_create,
            &self.actions.on_deploy,
            &self.actions.on_remove,
        ] {
            for action in set
                .before
                .iter()
                .chain(&set.after)
                .chain(&set.on_success)
                .chain(&set.on_failure)
            {
                match (&action.cmd, &action.wait) {
                    (Some(_), Some(_)) => {
                        return Err(CoreError::InvalidDefinition {
                            message: format!(
                                "component '{}' has an action with both cmd and wait",
                                self.name
                            ),
                        })
                    }
                    (None, None) => {
                        return Err(CoreError::InvalidDefinition {
                            message: format!(
                                "component '{}' has an action with neither cmd nor wait",
                                self.name
                            ),
                        })
                    }
                    _ => {}
                }
                for sv in &action.set_variables {
                    sv.validate()?;
                }
            }
        }

        Ok(())
    }

    /// Split a repo reference into (url, optional ref)
    pub fn parse_repo_ref(repo: &str) -> (String, Option<String>) {
        // `@` may legitimately appear in an ssh-style url before the host,
        // so only the last occurrence after the final `/` counts.
        match repo.rsplit_once('@') {
            Some((url, git_ref)) if url.contains('/') && !git_ref.contains('/') => {
                (url.to_string(), Some(git_ref.to_string()))
            }
            Some((url, git_ref)) if git_ref.starts_with("refs/") => {
                (url.to_string(), Some(git_ref.to_string()))
            }
            _ => (repo.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_requires_exactly_one_source() {
        let mut c = Component {
            name: "app".to_string(),
            import: Some(ComponentImport::default()),
            ..Default::default()
        };
        assert!(c.validate().is_err());

        c.import = Some(ComponentImport {
            path: Some("../common".to_string()),
            url: Some("oci://ghcr.io/org/pkg:1.0.0".to_string()),
            name: None,
        });
        assert!(c.validate().is_err());

        c.import = Some(ComponentImport {
            path: Some("../common".to_string()),
            url: None,
            name: None,
        });
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_import_url_scheme() {
        let c = Component {
            name: "app".to_string(),
            import: Some(ComponentImport {
                path: None,
                url: Some("https://example.com/pkg".to_string()),
                name: None,
            }),
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_action_cmd_wait_exclusive() {
        let mut c = Component {
            name: "app".to_string(),
            ..Default::default()
        };
        c.actions.on_deploy.before.push(Action {
            cmd: Some("echo hi".to_string()),
            wait: Some(ActionWait::default()),
            ..Default::default()
        });
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_parse_repo_ref() {
        let (url, r) = Component::parse_repo_ref("https://github.com/org/repo.git");
        assert_eq!(url, "https://github.com/org/repo.git");
        assert!(r.is_none());

        let (url, r) = Component::parse_repo_ref("https://github.com/org/repo.git@v1.2.3");
        assert_eq!(url, "https://github.com/org/repo.git");
        assert_eq!(r.as_deref(), Some("v1.2.3"));

        let (url, r) = Component::parse_repo_ref("https://github.com/org/repo.git@refs/heads/main");
        assert_eq!(url, "https://github.com/org/repo.git");
        assert_eq!(r.as_deref(), Some("refs/heads/main"));
    }

    #[test]
    fn test_component_yaml_defaults() {
        let yaml = r#"
name: app
required: true
images:
  - busybox:1.36
charts:
  - name: podinfo
    version: 6.4.0
    url: https://stefanprodan.github.io/podinfo
    namespace: podinfo
"#;
        let c: Component = serde_yaml::from_str(yaml).unwrap();
        assert!(c.required);
        assert_eq!(c.images, vec!["busybox:1.36"]);
        assert_eq!(c.charts[0].namespace.as_deref(), Some("podinfo"));
        assert!(!c.charts[0].no_wait);
    }
}
