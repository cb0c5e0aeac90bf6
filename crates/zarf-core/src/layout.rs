//! On-disk package layout
//!
//! The canonical tree of an unpacked package:
//!
//! ```text
//! <root>/
//!   zarf.yaml
//!   zarf.yaml.sig          (optional)
//!   checksums.txt
//!   components/<name>.tar
//!   images/                (OCI image layout)
//!   sboms.tar              (optional)
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::archive::{posix_path, tar_dir, untar};
use crate::definition::Package;
use crate::error::Result;

/// Package definition file
pub const DEFINITION: &str = "zarf.yaml";
/// Signature over the definition
pub const SIGNATURE: &str = "zarf.yaml.sig";
/// Per-file checksum list
pub const CHECKSUMS: &str = "checksums.txt";
/// Directory of per-component tars
pub const COMPONENTS_DIR: &str = "components";
/// OCI image layout directory
pub const IMAGES_DIR: &str = "images";
/// SBOM archive
pub const SBOM_TAR: &str = "sboms.tar";
/// Directory sboms.tar unpacks into
pub const SBOM_DIR: &str = "sboms";
/// OCI layout marker file
pub const OCI_LAYOUT: &str = "images/oci-layout";
/// OCI image index
pub const IMAGE_INDEX: &str = "images/index.json";
/// OCI blob directory
pub const IMAGE_BLOBS: &str = "images/blobs/sha256";

/// The canonical on-disk representation of an unpacked package
#[derive(Debug, Clone)]
pub struct PackageLayout {
    base: PathBuf,
    /// Relative paths known to be populated
    present: BTreeSet<String>,
}

impl PackageLayout {
    /// Create a fresh layout rooted at `base`, creating the directory.
    pub fn create(base: &Path) -> Result<Self> {
        std::fs::create_dir_all(base)?;
        Ok(Self {
            base: base.to_path_buf(),
            present: BTreeSet::new(),
        })
    }

    /// Open an existing layout, scanning the tree for populated slots.
    pub fn open(base: &Path) -> Result<Self> {
        let mut layout = Self::create(base)?;
        let paths: Vec<String> = layout.files()?.keys().cloned().collect();
        layout.set_from_paths(&paths);
        Ok(layout)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Record which relative paths are actually present.
    pub fn set_from_paths(&mut self, paths: &[String]) {
        for path in paths {
            self.present.insert(path.clone());
        }
    }

    pub fn definition_path(&self) -> PathBuf {
        self.base.join(DEFINITION)
    }

    pub fn signature_path(&self) -> PathBuf {
        self.base.join(SIGNATURE)
    }

    pub fn checksums_path(&self) -> PathBuf {
        self.base.join(CHECKSUMS)
    }

    pub fn components_dir(&self) -> PathBuf {
        self.base.join(COMPONENTS_DIR)
    }

    pub fn component_tar(&self, name: &str) -> PathBuf {
        self.components_dir().join(format!("{}.tar", name))
    }

    /// Directory a component tar unpacks into
    pub fn component_dir(&self, name: &str) -> PathBuf {
        self.components_dir().join(name)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.base.join(IMAGES_DIR)
    }

    pub fn image_blobs_dir(&self) -> PathBuf {
        self.base.join(IMAGE_BLOBS)
    }

    pub fn image_index_path(&self) -> PathBuf {
        self.base.join(IMAGE_INDEX)
    }

    pub fn oci_layout_path(&self) -> PathBuf {
        self.base.join(OCI_LAYOUT)
    }

    pub fn sbom_tar_path(&self) -> PathBuf {
        self.base.join(SBOM_TAR)
    }

    pub fn sbom_dir(&self) -> PathBuf {
        self.base.join(SBOM_DIR)
    }

    pub fn has_signature(&self) -> bool {
        self.signature_path().exists()
    }

    pub fn has_sboms(&self) -> bool {
        self.sbom_tar_path().exists()
    }

    pub fn has_images(&self) -> bool {
        self.image_index_path().exists()
    }

    /// Relative paths recorded as populated
    pub fn populated(&self) -> impl Iterator<Item = &str> {
        self.present.iter().map(String::as_str)
    }

    /// Walk the tree, returning `relative posix path -> absolute path`
    /// for every regular file, sorted by path.
    pub fn files(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        for entry in walkdir::WalkDir::new(&self.base)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(&self.base) {
                    files.insert(posix_path(rel), entry.path().to_path_buf());
                }
            }
        }
        Ok(files)
    }

    /// Parse the package definition from the layout
    pub fn read_definition(&self) -> Result<Package> {
        Package::load(&self.definition_path())
    }

    /// Write the package definition into the layout
    pub fn write_definition(&mut self, pkg: &Package) -> Result<()> {
        std::fs::write(self.definition_path(), pkg.to_yaml()?)?;
        self.present.insert(DEFINITION.to_string());
        Ok(())
    }

    /// Archive a staged component directory into `components/<name>.tar`.
    pub fn archive_component(&mut self, name: &str, staged: &Path, epoch: i64) -> Result<()> {
        std::fs::create_dir_all(self.components_dir())?;
        tar_dir(staged, &self.component_tar(name), name, epoch)?;
        self.present
            .insert(format!("{}/{}.tar", COMPONENTS_DIR, name));
        Ok(())
    }

    /// Unpack `components/<name>.tar` into `components/<name>/`,
    /// removing the tar afterwards.
    pub fn unarchive_component(&mut self, name: &str) -> Result<PathBuf> {
        let tar_path = self.component_tar(name);
        untar(&tar_path, &self.components_dir())?;
        std::fs::remove_file(&tar_path)?;
        self.present
            .remove(&format!("{}/{}.tar", COMPONENTS_DIR, name));
        Ok(self.component_dir(name))
    }

    /// Archive a staged SBOM directory into `sboms.tar`.
    pub fn archive_sboms(&mut self, staged: &Path, epoch: i64) -> Result<()> {
        tar_dir(staged, &self.sbom_tar_path(), SBOM_DIR, epoch)?;
        self.present.insert(SBOM_TAR.to_string());
        Ok(())
    }

    /// Unpack `sboms.tar` next to itself if present. Missing SBOMs are
    /// not an error; most loads never request them.
    pub fn unarchive_sboms(&mut self) -> Result<Option<PathBuf>> {
        if !self.has_sboms() {
            return Ok(None);
        }
        untar(&self.sbom_tar_path(), &self.base)?;
        Ok(Some(self.sbom_dir()))
    }
}
