//! Package definition and validation

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::component::Component;
use crate::error::{CoreError, Result};
use crate::variables::{Constant, Variable};

/// A Zarf package definition - the parsed form of `zarf.yaml`.
/// Unknown top-level fields reject; nested structures stay lenient so
/// newer packages still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Package {
    /// Package type
    #[serde(default)]
    pub kind: PackageKind,

    /// Package metadata
    pub metadata: PackageMetadata,

    /// Build information stamped at create-time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildInfo>,

    /// Package-level constants (not user-overridable at deploy)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<Constant>,

    /// Deploy-time variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,

    /// Ordered component list
    #[serde(default)]
    pub components: Vec<Component>,
}

/// Package type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageKind {
    /// A standard deployable package
    #[default]
    #[serde(rename = "ZarfPackageConfig")]
    Package,
    /// A package that bootstraps the in-cluster mirrors and agent
    #[serde(rename = "ZarfInitConfig")]
    Init,
}

/// Package metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    /// Package name (DNS-1123)
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Target architecture tag (e.g. amd64, arm64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,

    /// Skip airgap mirroring; assume external connectivity
    #[serde(default, skip_serializing_if = "is_false")]
    pub yolo: bool,

    /// SHA-256 of `checksums.txt`, binding the definition to all packaged files
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aggregate_checksum: String,

    /// Epoch seconds used for reproducible archive mtimes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_date_epoch: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

/// Build information stamped into the definition at create-time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// CLI version that built the package
    pub version: String,

    /// Build timestamp (RFC 3339, derived from source-date-epoch)
    pub timestamp: String,

    /// Architecture the package was built for
    pub architecture: String,

    /// Hostname of the build machine
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub terminal: String,

    /// User that ran the build
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,

    /// Base package reference for a differential build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub differential_base: Option<String>,

    /// Map of OCI import url -> component name, for reproducibility
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub oci_imported_components: IndexMap<String, String>,

    /// Identifiers of deprecation migrations applied during composition
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub migrations: Vec<String>,

    /// Flavor the package was built with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !b
}

impl Package {
    /// Parse a package definition from a `zarf.yaml` file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::DefinitionNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let pkg: Package = serde_yaml::from_str(&content)?;
        Ok(pkg)
    }

    /// Serialize the definition back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Serialize with the aggregate checksum cleared.
    ///
    /// These are the exact bytes the creator wrote before stamping the
    /// aggregate, so the `checksums.txt` entry for `zarf.yaml` can be
    /// re-derived after the stamp.
    pub fn to_yaml_unstamped(&self) -> Result<String> {
        let mut clone = self.clone();
        clone.metadata.aggregate_checksum = String::new();
        clone.to_yaml()
    }

    /// Whether this is an init package
    pub fn is_init(&self) -> bool {
        self.kind == PackageKind::Init
    }

    /// Look up a component by name
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Validate the definition: names, uniqueness, groups, variables.
    pub fn validate(&self) -> Result<()> {
        validate_package_name(&self.metadata.name)?;

        let mut seen = HashSet::new();
        for component in &self.components {
            if !seen.insert(component.name.clone()) {
                return Err(CoreError::InvalidDefinition {
                    message: format!("component name '{}' is not unique", component.name),
                });
            }
            component.validate()?;
        }

        // Chart release names must be unique within a namespace.
        let mut releases = HashSet::new();
        for component in &self.components {
            for chart in &component.charts {
                let ns = chart.namespace.as_deref().unwrap_or("default");
                let release = chart.release_name.as_deref().unwrap_or(&chart.name);
                if !releases.insert(format!("{}/{}", ns, release)) {
                    return Err(CoreError::InvalidDefinition {
                        message: format!(
                            "chart release name '{}' is not unique within namespace '{}'",
                            release, ns
                        ),
                    });
                }
            }
        }

        // A group must have at most one default, and required components
        // cannot participate in group selection.
        let mut group_defaults: HashSet<&str> = HashSet::new();
        for component in &self.components {
            if let Some(group) = &component.group {
                if component.required {
                    return Err(CoreError::InvalidDefinition {
                        message: format!(
                            "component '{}' cannot be both required and in group '{}'",
                            component.name, group
                        ),
                    });
                }
                if component.default && !group_defaults.insert(group.as_str()) {
                    return Err(CoreError::InvalidDefinition {
                        message: format!("group '{}' has multiple default components", group),
                    });
                }
            }
        }

        for variable in &self.variables {
            variable.validate()?;
        }
        for constant in &self.constants {
            constant.validate()?;
        }

        Ok(())
    }
}

/// Validate a DNS-1123 package name
pub fn validate_package_name(name: &str) -> Result<()> {
    // Lazily compiled once per call site; names are short so this is cheap.
    let re = Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").expect("static regex");
    if name.is_empty() || name.len() > 63 || !re.is_match(name) {
        return Err(CoreError::InvalidDefinition {
            message: format!("package name '{}' must be a valid DNS-1123 label", name),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;

    fn minimal_package() -> Package {
        Package {
            metadata: PackageMetadata {
                name: "test-pkg".to_string(),
                version: Some("0.1.0".to_string()),
                ..Default::default()
            },
            components: vec![Component {
                name: "app".to_string(),
                required: true,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_roundtrip() {
        let pkg = minimal_package();
        let yaml = pkg.to_yaml().unwrap();
        let parsed: Package = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.metadata.name, "test-pkg");
        assert_eq!(parsed.kind, PackageKind::Package);
        assert_eq!(parsed.components.len(), 1);
        assert!(parsed.components[0].required);
    }

    #[test]
    fn test_validate_names() {
        assert!(validate_package_name("my-app").is_ok());
        assert!(validate_package_name("a").is_ok());
        assert!(validate_package_name("My-App").is_err());
        assert!(validate_package_name("-bad").is_err());
        assert!(validate_package_name("bad-").is_err());
        assert!(validate_package_name("").is_err());
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let mut pkg = minimal_package();
        pkg.components.push(Component {
            name: "app".to_string(),
            ..Default::default()
        });
        assert!(pkg.validate().is_err());
    }

    #[test]
    fn test_required_component_cannot_be_grouped() {
        let mut pkg = minimal_package();
        pkg.components[0].group = Some("db".to_string());
        assert!(pkg.validate().is_err());
    }

    #[test]
    fn test_unstamped_yaml_clears_aggregate() {
        let mut pkg = minimal_package();
        pkg.metadata.aggregate_checksum = "abc123".to_string();
        let unstamped = pkg.to_yaml_unstamped().unwrap();
        assert!(!unstamped.contains("abc123"));
        // The original is untouched.
        assert_eq!(pkg.metadata.aggregate_checksum, "abc123");
    }

    #[test]
    fn test_kind_serialization() {
        let mut pkg = minimal_package();
        pkg.kind = PackageKind::Init;
        let yaml = pkg.to_yaml().unwrap();
        assert!(yaml.contains("ZarfInitConfig"));
    }
}
