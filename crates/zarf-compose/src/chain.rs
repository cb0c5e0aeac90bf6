//! Import-chain expansion
//!
//! Each component may import one component from another definition,
//! which may itself import, and so on. The chain is built head-first,
//! cycles are rejected on a canonicalized visited set, and composition
//! merges tail-to-head: parent scalars win, lists concatenate
//! child-then-parent, and child paths are rewritten relative to the
//! parent's base directory.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use zarf_core::component::{ActionSet, Component};
use zarf_core::definition::Package;
use zarf_core::variables::{Constant, Variable};

use crate::error::{ComposeError, Result};
use crate::migrations::migrate_definition;

/// Resolves an `oci://` import reference to a local directory holding the
/// fetched definition. Implemented by the build pipeline; composition
/// itself never touches the network.
pub trait OciImportResolver {
    fn resolve(&self, url: &str) -> Result<PathBuf>;
}

/// Resolver for contexts where OCI imports cannot appear (lint, tests).
pub struct RejectOciImports;

impl OciImportResolver for RejectOciImports {
    fn resolve(&self, url: &str) -> Result<PathBuf> {
        Err(ComposeError::OciImportUnavailable {
            url: url.to_string(),
        })
    }
}

/// One resolved link of an import chain
#[derive(Debug, Clone)]
struct ChainLink {
    component: Component,
    /// Directory the component's relative paths are anchored to
    base_dir: PathBuf,
    /// Relative path from the head's base to this link's base
    rel_to_head: PathBuf,
    /// Variables and constants declared by this link's definition
    variables: Vec<Variable>,
    constants: Vec<Constant>,
    /// Set when this link was imported through an OCI reference
    oci_url: Option<String>,
}

/// A fully resolved import chain for one component
#[derive(Debug)]
pub struct ImportChain {
    links: Vec<ChainLink>,
}

/// Load a definition applying deprecation migrations first.
///
/// Returns the parsed package and the migration warnings.
pub fn load_definition(dir: &Path) -> Result<(Package, Vec<String>)> {
    let path = dir.join(zarf_core::layout::DEFINITION);
    let content = std::fs::read_to_string(&path).map_err(|_| ComposeError::Core(
        zarf_core::CoreError::DefinitionNotFound { path: path.clone() },
    ))?;
    let mut doc: serde_yaml::Value = serde_yaml::from_str(&content)?;
    let warnings = migrate_definition(&mut doc);
    let pkg: Package = serde_yaml::from_value(doc)?;
    Ok((pkg, warnings))
}

impl ImportChain {
    /// Build the chain for `head`, following imports until a component
    /// without one. `base_dir` anchors the head's relative paths.
    pub fn build(
        head: Component,
        base_dir: &Path,
        arch: Option<&str>,
        flavor: Option<&str>,
        resolver: &dyn OciImportResolver,
    ) -> Result<Self> {
        let mut links = vec![ChainLink {
            component: head,
            base_dir: base_dir.to_path_buf(),
            rel_to_head: PathBuf::new(),
            variables: Vec::new(),
            constants: Vec::new(),
            oci_url: None,
        }];
        let mut visited: HashSet<String> = HashSet::new();

        loop {
            let tail = links.last().expect("chain is never empty");
            let Some(import) = tail.component.import.clone() else {
                break;
            };

            let wanted = import
                .name
                .clone()
                .unwrap_or_else(|| tail.component.name.clone());

            let (child_dir, oci_url, reference) = if let Some(path) = &import.path {
                let dir = tail.base_dir.join(path);
                let canonical = dir
                    .canonicalize()
                    .unwrap_or_else(|_| dir.clone())
                    .to_string_lossy()
                    .to_string();
                (dir, None, format!("{}#{}", canonical, wanted))
            } else if let Some(url) = &import.url {
                let dir = resolver.resolve(url)?;
                (dir, Some(url.clone()), format!("{}#{}", url, wanted))
            } else {
                break;
            };

            if !visited.insert(reference.clone()) {
                return Err(ComposeError::ImportCycle { reference });
            }

            let (child_pkg, _) = load_definition(&child_dir)?;
            let child = child_pkg
                .components
                .iter()
                .find(|c| c.name == wanted && compatible(c, arch, flavor))
                .cloned()
                .ok_or_else(|| ComposeError::ImportedComponentNotFound {
                    reference: child_dir.to_string_lossy().to_string(),
                    name: wanted.clone(),
                })?;

            let rel_to_head = if let Some(path) = &import.path {
                links.last().unwrap().rel_to_head.join(path)
            } else {
                // OCI imports stage into an absolute scratch dir; their
                // paths are already anchored there.
                PathBuf::new()
            };

            links.push(ChainLink {
                component: child,
                base_dir: child_dir,
                rel_to_head,
                variables: child_pkg.variables.clone(),
                constants: child_pkg.constants.clone(),
                oci_url,
            });
        }

        Ok(Self { links })
    }

    /// Whether any link was imported through an OCI reference
    pub fn contains_oci_import(&self) -> bool {
        self.links.iter().any(|l| l.oci_url.is_some())
    }

    /// The first OCI import's `(url, component-name)` for build info
    pub fn oci_import_definition(&self) -> Option<(String, String)> {
        self.links
            .iter()
            .find(|l| l.oci_url.is_some())
            .map(|l| (l.oci_url.clone().unwrap(), l.component.name.clone()))
    }

    /// Merge the chain into one component, tail-to-head.
    pub fn compose(&self) -> Result<Component> {
        let mut links = self.links.clone();
        let mut composed = links.pop().expect("chain is never empty");

        // Rewrite the deepest link's paths before folding upward.
        let anchor = link_anchor(&composed);
        rewrite_paths(&mut composed.component, &anchor);

        while let Some(mut parent) = links.pop() {
            let anchor = link_anchor(&parent);
            rewrite_paths(&mut parent.component, &anchor);
            composed.component = merge_component(parent.component, composed.component)?;
        }

        Ok(composed.component)
    }

    /// Fold imported variables into an existing set, deduplicated by name.
    pub fn merge_variables(&self, mut existing: Vec<Variable>) -> Result<Vec<Variable>> {
        for link in &self.links {
            for variable in &link.variables {
                match existing.iter().find(|v| v.name == variable.name) {
                    None => existing.push(variable.clone()),
                    Some(found) if found == variable => {}
                    Some(_) => {
                        return Err(ComposeError::VariableConflict {
                            name: variable.name.clone(),
                        })
                    }
                }
            }
        }
        Ok(existing)
    }

    /// Fold imported constants into an existing set, deduplicated by name.
    pub fn merge_constants(&self, mut existing: Vec<Constant>) -> Result<Vec<Constant>> {
        for link in &self.links {
            for constant in &link.constants {
                match existing.iter().find(|c| c.name == constant.name) {
                    None => existing.push(constant.clone()),
                    Some(found) if found == constant => {}
                    Some(_) => {
                        return Err(ComposeError::ConstantConflict {
                            name: constant.name.clone(),
                        })
                    }
                }
            }
        }
        Ok(existing)
    }
}

/// Whether a component passes the architecture/flavor filters
fn compatible(component: &Component, arch: Option<&str>, flavor: Option<&str>) -> bool {
    if let (Some(arch), Some(only_arch)) = (arch, component.only.cluster.architecture.as_deref())
    {
        if arch != only_arch {
            return false;
        }
    }
    if let Some(only_flavor) = component.only.flavor.as_deref() {
        if flavor != Some(only_flavor) {
            return false;
        }
    }
    true
}

/// Merge a child component into its importing parent.
///
/// Parent scalars win when non-empty; list fields concatenate
/// child-then-parent preserving order; conflicting action defaults are a
/// hard error rather than a silent overwrite.
fn merge_component(parent: Component, child: Component) -> Result<Component> {
    let mut merged = child;

    // Identity and selection always come from the importer.
    merged.name = parent.name.clone();
    merged.required = parent.required;
    merged.default = parent.default;
    merged.group = parent.group.clone().or(merged.group);
    merged.import = None;

    if parent.description.is_some() {
        merged.description = parent.description.clone();
    }
    if !parent.only.is_empty() {
        merged.only = parent.only.clone();
    }

    merged.images.extend(parent.images);
    merged.repos.extend(parent.repos);
    merged.manifests.extend(parent.manifests);
    merged.charts.extend(parent.charts);
    merged.files.extend(parent.files);
    merged.data_injections.extend(parent.data_injections);
    merged.health_checks.extend(parent.health_checks);

    let name = merged.name.clone();
    merged.actions.on_create =
        merge_action_set(&name, parent.actions.on_create, merged.actions.on_create)?;
    merged.actions.on_deploy =
        merge_action_set(&name, parent.actions.on_deploy, merged.actions.on_deploy)?;
    merged.actions.on_remove =
        merge_action_set(&name, parent.actions.on_remove, merged.actions.on_remove)?;

    Ok(merged)
}

fn merge_action_set(component: &str, parent: ActionSet, child: ActionSet) -> Result<ActionSet> {
    let defaults = match (parent.defaults.is_empty(), child.defaults.is_empty()) {
        (true, _) => child.defaults,
        (false, true) => parent.defaults,
        (false, false) => {
            return Err(ComposeError::ActionDefaultsConflict {
                component: component.to_string(),
            })
        }
    };

    let mut merged = ActionSet {
        defaults,
        ..Default::default()
    };
    merged.before.extend(child.before);
    merged.before.extend(parent.before);
    merged.after.extend(child.after);
    merged.after.extend(parent.after);
    merged.on_success.extend(child.on_success);
    merged.on_success.extend(parent.on_success);
    merged.on_failure.extend(child.on_failure);
    merged.on_failure.extend(parent.on_failure);
    Ok(merged)
}

/// Anchor for a link's relative paths: the relative walk from the head
/// for path imports, or the absolute staging directory for OCI imports.
fn link_anchor(link: &ChainLink) -> PathBuf {
    if link.oci_url.is_some() {
        link.base_dir.clone()
    } else {
        link.rel_to_head.clone()
    }
}

/// Rewrite a link's relative paths so they resolve from the head's base.
fn rewrite_paths(component: &mut Component, rel: &Path) {
    if rel.as_os_str().is_empty() {
        return;
    }

    let rebase = |value: &mut String| {
        if is_remote(value) || Path::new(value.as_str()).is_absolute() {
            return;
        }
        *value = rel.join(value.as_str()).to_string_lossy().to_string();
    };

    for manifest in &mut component.manifests {
        manifest.files.iter_mut().for_each(rebase);
        manifest.kustomizations.iter_mut().for_each(rebase);
    }
    for chart in &mut component.charts {
        if let Some(local) = &mut chart.local_path {
            rebase(local);
        }
        chart.values_files.iter_mut().for_each(rebase);
    }
    for file in &mut component.files {
        rebase(&mut file.source);
    }
    for injection in &mut component.data_injections {
        rebase(&mut injection.source);
    }
    for set in [
        &mut component.actions.on_create,
        &mut component.actions.on_deploy,
        &mut component.actions.on_remove,
    ] {
        if let Some(dir) = &mut set.defaults.dir {
            rebase(dir);
        }
        for action in set
            .before
            .iter_mut()
            .chain(&mut set.after)
            .chain(&mut set.on_success)
            .chain(&mut set.on_failure)
        {
            if let Some(dir) = &mut action.dir {
                rebase(dir);
            }
        }
    }
}

fn is_remote(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://") || value.starts_with("oci://")
}

/// Result of composing a whole package
#[derive(Debug, Default)]
pub struct ComposeOutput {
    /// Deprecation warnings accumulated across the chain
    pub warnings: Vec<String>,
    /// `url -> component` map of OCI imports for build info
    pub oci_imported: IndexMap<String, String>,
}

/// Compose every component of a package in place.
///
/// Components filtered out by architecture or flavor are dropped;
/// imported variables and constants are folded into the package.
pub fn compose_package(
    pkg: &mut Package,
    base_dir: &Path,
    arch: Option<&str>,
    flavor: Option<&str>,
    resolver: &dyn OciImportResolver,
) -> Result<ComposeOutput> {
    let mut output = ComposeOutput::default();
    let mut composed_components = Vec::new();
    let mut variables = std::mem::take(&mut pkg.variables);
    let mut constants = std::mem::take(&mut pkg.constants);

    for component in pkg.components.drain(..).collect::<Vec<_>>() {
        if !compatible(&component, arch, flavor) {
            tracing::debug!(component = %component.name, "skipped by architecture/flavor filter");
            continue;
        }

        let chain = ImportChain::build(component, base_dir, arch, flavor, resolver)?;

        if let Some((url, name)) = chain.oci_import_definition() {
            output.oci_imported.insert(url, name);
        }

        composed_components.push(chain.compose()?);
        variables = chain.merge_variables(variables)?;
        constants = chain.merge_constants(constants)?;
    }

    pkg.components = composed_components;
    pkg.variables = variables;
    pkg.constants = constants;

    Ok(output)
}
