//! OCI transport for packages
//!
//! A package is published as an image manifest whose layers are the
//! package files, titled with their in-package relative paths. The
//! config blob carries the package definition JSON. Pulls may be
//! partial: callers select components and the transitive layer set is
//! computed from the package's embedded image index.

use futures::future::join_all;
use oci_distribution::client::{Client, ClientConfig, Config, ImageLayer};
use oci_distribution::manifest::{OciDescriptor, OciImageManifest, OciManifest};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Reference;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Semaphore;

use zarf_core::checksums::sha256_hex;
use zarf_core::definition::Package;
use zarf_core::layout::{self, PackageLayout};

use crate::error::{Result, TransportError};
use crate::progress::ProgressSink;
use crate::retry::{with_retries, RetryConfig};

/// Media types identifying package artifacts in a registry
pub mod media_types {
    /// Config blob carrying the package definition JSON
    pub const ZARF_CONFIG: &str = "application/vnd.zarf.config.v1+json";
    /// Layer blob holding one package file
    pub const ZARF_LAYER: &str = "application/vnd.zarf.layer.v1.blob";
    /// Annotation carrying a layer's in-package relative path
    pub const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";
    /// Annotation carrying an embedded image's original reference
    pub const BASE_IMAGE_ANNOTATION: &str = "org.opencontainers.image.base.name";
}

/// Paths always pulled from a remote package, whatever the selection
pub const PACKAGE_ALWAYS_PULL: &[&str] =
    &[layout::DEFINITION, layout::CHECKSUMS, layout::SIGNATURE];

/// A remote package held in an OCI registry
pub struct OciRemote {
    reference: Reference,
    client: Client,
    auth: RegistryAuth,
    concurrency: usize,
    retry: RetryConfig,
}

impl OciRemote {
    /// Connect to `oci://registry/repo:tag`. The scheme prefix is
    /// optional; `insecure` additionally accepts invalid certificates.
    pub fn new(reference: &str, insecure: bool, concurrency: usize) -> Result<Self> {
        let clean = reference.trim_start_matches("oci://");
        let parsed =
            Reference::try_from(clean).map_err(|e| TransportError::InvalidReference {
                reference: reference.to_string(),
                message: e.to_string(),
            })?;

        let config = ClientConfig {
            accept_invalid_certificates: insecure,
            ..Default::default()
        };

        Ok(Self {
            reference: parsed,
            client: Client::new(config),
            auth: RegistryAuth::Anonymous,
            concurrency: concurrency.max(1),
            retry: RetryConfig::default(),
        })
    }

    /// Use basic credentials instead of anonymous access
    pub fn with_basic_auth(mut self, username: String, password: String) -> Self {
        self.auth = RegistryAuth::Basic(username, password);
        self
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Fetch the package's root image manifest
    pub async fn fetch_root(&self) -> Result<OciImageManifest> {
        let (manifest, _digest) = self
            .client
            .pull_manifest(&self.reference, &self.auth)
            .await
            .map_err(|e| TransportError::Oci {
                message: format!("failed to pull manifest: {}", e),
            })?;

        match manifest {
            OciManifest::Image(image) => Ok(image),
            OciManifest::ImageIndex(_) => Err(TransportError::Oci {
                message: "expected a package manifest, found an image index".to_string(),
            }),
        }
    }

    /// Fetch a single layer into memory, with retries
    pub async fn fetch_layer(&self, desc: &OciDescriptor) -> Result<Vec<u8>> {
        with_retries(&self.retry, "layer fetch", || async {
            let mut data = Vec::with_capacity(desc.size.max(0) as usize);
            self.client
                .pull_blob(&self.reference, desc, &mut data)
                .await
                .map_err(|e| TransportError::Oci {
                    message: format!("failed to pull blob {}: {}", desc.digest, e),
                })?;
            Ok(data)
        })
        .await
    }

    /// Fetch and parse the package definition layer
    pub async fn fetch_definition(&self, root: &OciImageManifest) -> Result<Package> {
        let desc = locate(root, layout::DEFINITION).ok_or(TransportError::LayerNotFound {
            path: layout::DEFINITION.to_string(),
        })?;
        let data = self.fetch_layer(&desc).await?;
        Ok(serde_yaml::from_slice(&data)?)
    }

    /// Compute the transitive layer set for the requested components:
    /// their tars, the blobs of every image they need, the image layout
    /// metadata, and `sboms.tar` when present.
    pub async fn layers_from_components(
        &self,
        root: &OciImageManifest,
        pkg: &Package,
        requested: &[String],
    ) -> Result<Vec<OciDescriptor>> {
        let (tar_paths, images) = select_components(pkg, requested)?;

        let mut layers = Vec::new();
        for path in &tar_paths {
            layers.push(locate(root, path).ok_or_else(|| TransportError::LayerNotFound {
                path: path.clone(),
            })?);
        }

        // sboms.tar is a light addition; pull it whenever it is published.
        if let Some(sboms) = locate(root, layout::SBOM_TAR) {
            layers.push(sboms);
        }

        if images.is_empty() {
            return Ok(layers);
        }

        for path in [layout::OCI_LAYOUT, layout::IMAGE_INDEX] {
            layers.push(locate(root, path).ok_or(TransportError::LayerNotFound {
                path: path.to_string(),
            })?);
        }

        let index_desc = locate(root, layout::IMAGE_INDEX).expect("located above");
        let index_bytes = self.fetch_layer(&index_desc).await?;

        for image in &images {
            let manifest_digest = manifest_digest_for_image(&index_bytes, image)?;
            let manifest_path = blob_path(&manifest_digest);
            let manifest_desc =
                locate(root, &manifest_path).ok_or(TransportError::LayerNotFound {
                    path: manifest_path.clone(),
                })?;
            layers.push(manifest_desc.clone());

            let manifest_bytes = self.fetch_layer(&manifest_desc).await?;
            for digest in image_blob_digests(&manifest_bytes)? {
                let path = blob_path(&digest);
                layers.push(locate(root, &path).ok_or(TransportError::LayerNotFound {
                    path,
                })?);
            }
        }

        // Shared image layers appear once per image; dedupe by digest.
        let mut seen = BTreeSet::new();
        layers.retain(|d| seen.insert(d.digest.clone()));

        Ok(layers)
    }

    /// Pull the package into a layout.
    ///
    /// `layers` of `None` pulls everything; a selection always gains the
    /// mandatory set. Already-present destination blobs are skipped and
    /// blob writes go through a temp file and an atomic rename. Returns
    /// the relative paths pulled.
    pub async fn pull_package(
        &self,
        dst: &mut PackageLayout,
        layers: Option<Vec<OciDescriptor>>,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<String>> {
        let root = self.fetch_root().await?;

        let mut to_pull = match layers {
            None => root.layers.clone(),
            Some(mut selected) => {
                for path in PACKAGE_ALWAYS_PULL {
                    let already = selected.iter().any(|d| title_of(d) == Some(*path));
                    if !already {
                        // The signature layer only exists for signed packages.
                        if let Some(desc) = locate(&root, path) {
                            selected.push(desc);
                        }
                    }
                }
                selected
            }
        };

        let mut seen = BTreeSet::new();
        to_pull.retain(|d| seen.insert(d.digest.clone()));

        let total: u64 = to_pull.iter().map(|d| d.size.max(0) as u64).sum();
        progress.start(total);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let tasks = to_pull.iter().map(|desc| {
            let semaphore = semaphore.clone();
            let base = dst.base().to_path_buf();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                self.pull_layer_to(desc, &base).await?;
                progress.update(desc.size.max(0) as u64);
                Ok::<(), TransportError>(())
            }
        });

        for result in join_all(tasks).await {
            result?;
        }
        progress.finish();

        let pulled: Vec<String> = to_pull
            .iter()
            .filter_map(|d| title_of(d).map(str::to_string))
            .collect();
        dst.set_from_paths(&pulled);

        Ok(pulled)
    }

    /// Pull only the named paths (metadata loads). Missing optional
    /// layers are skipped; returns what was actually pulled.
    pub async fn pull_paths(
        &self,
        paths: &[&str],
        dst: &mut PackageLayout,
    ) -> Result<Vec<String>> {
        let root = self.fetch_root().await?;
        let mut pulled = Vec::new();
        for path in paths {
            if let Some(desc) = locate(&root, path) {
                self.pull_layer_to(&desc, dst.base()).await?;
                pulled.push(path.to_string());
            }
        }
        dst.set_from_paths(&pulled);
        Ok(pulled)
    }

    async fn pull_layer_to(&self, desc: &OciDescriptor, base: &std::path::Path) -> Result<()> {
        let rel = title_of(desc).ok_or_else(|| TransportError::Oci {
            message: format!("layer {} carries no title annotation", desc.digest),
        })?;
        let dest = base.join(rel);

        if let Ok(meta) = std::fs::metadata(&dest) {
            if meta.len() == desc.size.max(0) as u64 {
                tracing::debug!(path = rel, "destination blob already present, skipping");
                return Ok(());
            }
        }

        let data = self.fetch_layer(desc).await?;

        if let Some(expected) = desc.digest.strip_prefix("sha256:") {
            let actual = sha256_hex(&data);
            if actual != expected {
                return Err(TransportError::Core(
                    zarf_core::CoreError::ChecksumMismatch {
                        path: rel.to_string(),
                        expected: expected.to_string(),
                        actual,
                    },
                ));
            }
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = tempfile::NamedTempFile::new_in(
            dest.parent().unwrap_or(base),
        )?;
        tmp.write_all(&data)?;
        tmp.flush()?;
        tmp.persist(&dest).map_err(|e| TransportError::Oci {
            message: format!("failed to place blob {}: {}", rel, e),
        })?;

        Ok(())
    }

    /// Publish a layout as an OCI artifact. Every package file becomes a
    /// titled layer; the config blob is the definition JSON.
    pub async fn push_package(
        &self,
        src: &PackageLayout,
        pkg: &Package,
        progress: &dyn ProgressSink,
    ) -> Result<String> {
        let files = src.files()?;

        let mut layers = Vec::with_capacity(files.len());
        let mut total = 0u64;
        for (rel, abs) in &files {
            let data = std::fs::read(abs)?;
            total += data.len() as u64;
            let mut annotations = HashMap::new();
            annotations.insert(media_types::TITLE_ANNOTATION.to_string(), rel.clone());
            layers.push(ImageLayer {
                data,
                media_type: media_types::ZARF_LAYER.to_string(),
                annotations: Some(annotations),
            });
        }
        progress.start(total);

        let config = Config {
            data: serde_json::to_vec(pkg)?,
            media_type: media_types::ZARF_CONFIG.to_string(),
            annotations: None,
        };

        let mut manifest_annotations = HashMap::new();
        if let Some(description) = &pkg.metadata.description {
            manifest_annotations.insert(
                "org.opencontainers.image.description".to_string(),
                description.clone(),
            );
        }
        let manifest =
            OciImageManifest::build(&layers, &config, Some(manifest_annotations));

        let response = self
            .client
            .push(&self.reference, &layers, config, &self.auth, Some(manifest))
            .await
            .map_err(|e| TransportError::Oci {
                message: format!("failed to push package: {}", e),
            })?;

        progress.update(total);
        progress.finish();

        Ok(response.manifest_url)
    }
}

/// Find a layer by its title annotation
pub fn locate(manifest: &OciImageManifest, path: &str) -> Option<OciDescriptor> {
    manifest
        .layers
        .iter()
        .find(|d| title_of(d) == Some(path))
        .cloned()
}

fn title_of(desc: &OciDescriptor) -> Option<&str> {
    desc.annotations
        .as_ref()
        .and_then(|a| a.get(media_types::TITLE_ANNOTATION))
        .map(String::as_str)
}

/// Package-relative path of an image blob
fn blob_path(digest: &str) -> String {
    format!(
        "{}/{}",
        layout::IMAGE_BLOBS,
        digest.strip_prefix("sha256:").unwrap_or(digest)
    )
}

/// Resolve the requested component selection: required components ride
/// along, unknown names are an error. Returns the component tar paths
/// and the union of images to pull.
fn select_components(
    pkg: &Package,
    requested: &[String],
) -> Result<(Vec<String>, BTreeSet<String>)> {
    for name in requested {
        if pkg.component(name).is_none() {
            return Err(TransportError::ComponentNotFound { name: name.clone() });
        }
    }

    let mut tar_paths = Vec::new();
    let mut images = BTreeSet::new();
    for component in &pkg.components {
        if component.required || requested.iter().any(|n| n == &component.name) {
            tar_paths.push(format!("{}/{}.tar", layout::COMPONENTS_DIR, component.name));
            images.extend(component.images.iter().cloned());
        }
    }

    Ok((tar_paths, images))
}

/// Look up an image's manifest digest in the package's embedded index
fn manifest_digest_for_image(index_bytes: &[u8], image: &str) -> Result<String> {
    let index: serde_json::Value = serde_json::from_slice(index_bytes)?;
    let manifests = index["manifests"].as_array().ok_or(TransportError::Oci {
        message: "embedded image index has no manifests".to_string(),
    })?;

    manifests
        .iter()
        .find(|m| {
            m["annotations"][media_types::BASE_IMAGE_ANNOTATION]
                .as_str()
                .map(|a| a == image)
                .unwrap_or(false)
        })
        .and_then(|m| m["digest"].as_str())
        .map(str::to_string)
        .ok_or_else(|| TransportError::Oci {
            message: format!("image {} is not present in the embedded index", image),
        })
}

/// Config and layer digests referenced by an image manifest
fn image_blob_digests(manifest_bytes: &[u8]) -> Result<Vec<String>> {
    let manifest: serde_json::Value = serde_json::from_slice(manifest_bytes)?;
    let mut digests = Vec::new();

    if let Some(config) = manifest["config"]["digest"].as_str() {
        digests.push(config.to_string());
    }
    if let Some(manifest_layers) = manifest["layers"].as_array() {
        for entry in manifest_layers {
            if let Some(digest) = entry["digest"].as_str() {
                digests.push(digest.to_string());
            }
        }
    }

    Ok(digests)
}
