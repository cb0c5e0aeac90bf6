//! Differential package creation
//!
//! A differential build references a base package and omits the images
//! and repos it already ships. Pinned references are matched exactly;
//! mutable tags (`latest` and friends) are always re-pulled because the
//! base's copy may be stale. Blob-level sharing is handled separately by
//! the digest-keyed layout writes.

use std::collections::BTreeSet;

use zarf_core::component::Component;
use zarf_core::definition::Package;

/// Artifacts already present in the differential base
#[derive(Debug, Clone, Default)]
pub struct DifferentialData {
    /// Reference of the base package (recorded in build info)
    pub base_ref: String,
    pub images: BTreeSet<String>,
    pub repos: BTreeSet<String>,
}

const MUTABLE_TAGS: &[&str] = &["latest", "stable", "nightly"];

impl DifferentialData {
    /// Collect the base package's artifact references from its definition
    pub fn from_base(base_ref: &str, base: &Package) -> Self {
        let mut data = Self {
            base_ref: base_ref.to_string(),
            ..Default::default()
        };
        for component in &base.components {
            data.images.extend(component.images.iter().cloned());
            data.repos.extend(component.repos.iter().cloned());
        }
        data
    }

    /// Drop artifacts the base already ships from every component.
    /// Returns how many references were elided.
    pub fn strip(&self, pkg: &mut Package) -> usize {
        let mut stripped = 0;
        for component in &mut pkg.components {
            stripped += retain_new(&mut component.images, &self.images, is_mutable_image);
            stripped += retain_new(&mut component.repos, &self.repos, is_mutable_repo);
        }
        stripped
    }
}

fn retain_new(
    refs: &mut Vec<String>,
    base: &BTreeSet<String>,
    mutable: impl Fn(&str) -> bool,
) -> usize {
    let before = refs.len();
    refs.retain(|r| mutable(r) || !base.contains(r));
    before - refs.len()
}

/// Mutable image tags must always be re-pulled
fn is_mutable_image(image: &str) -> bool {
    match image.rsplit_once(':') {
        Some((_, tag)) if !tag.contains('/') => MUTABLE_TAGS.contains(&tag),
        // No tag at all implies `latest`.
        _ => !image.contains('@'),
    }
}

/// Repos without a pinned ref track a moving head
fn is_mutable_repo(repo: &str) -> bool {
    Component::parse_repo_ref(repo).1.is_none()
}
