//! Image pulls into the package's shared OCI layout
//!
//! All components share one `images/` OCI layout; blob writes are keyed
//! by digest so images that share layers are stored once. Multi-arch
//! references resolve to the manifest matching the package architecture.

use futures::future::join_all;
use oci_distribution::client::{Client, ClientConfig};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Reference;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

use zarf_core::checksums::sha256_hex;
use zarf_core::layout::PackageLayout;
use zarf_transport::cache::ContentCache;
use zarf_transport::oci::media_types;

use crate::error::{BuildError, Result};

const OCI_LAYOUT_CONTENT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;
const IMAGE_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

const ACCEPTED_MANIFEST_TYPES: &[&str] = &[
    "application/vnd.oci.image.manifest.v1+json",
    "application/vnd.oci.image.index.v1+json",
    "application/vnd.docker.distribution.manifest.v2+json",
    "application/vnd.docker.distribution.manifest.list.v2+json",
];

/// Pulls images from registries into a package layout
pub struct ImagePuller {
    client: Client,
    auth: RegistryAuth,
    arch: String,
    concurrency: usize,
    cache: Option<ContentCache>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OciIndex {
    schema_version: u32,
    manifests: Vec<OciIndexEntry>,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct OciIndexEntry {
    media_type: String,
    digest: String,
    size: i64,
    annotations: BTreeMap<String, String>,
}

impl ImagePuller {
    pub fn new(arch: &str, concurrency: usize, insecure: bool) -> Self {
        let config = ClientConfig {
            accept_invalid_certificates: insecure,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            auth: RegistryAuth::Anonymous,
            arch: arch.to_string(),
            concurrency: concurrency.max(1),
            cache: None,
        }
    }

    /// Reuse blobs from (and populate) a local content cache
    pub fn with_cache(mut self, cache: ContentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Pull every reference into the layout's `images/` OCI layout.
    ///
    /// References are deduplicated by the caller; blob writes dedupe by
    /// digest here. `index.json` entries are merged in digest order so
    /// the layout is byte-stable across runs.
    pub async fn pull_into_layout(
        &self,
        refs: &[String],
        dst: &mut PackageLayout,
    ) -> Result<()> {
        if refs.is_empty() {
            return Ok(());
        }

        std::fs::create_dir_all(dst.image_blobs_dir())?;
        std::fs::write(dst.oci_layout_path(), OCI_LAYOUT_CONTENT)?;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let blobs_dir = dst.image_blobs_dir();
        let tasks = refs.iter().map(|image| {
            let semaphore = semaphore.clone();
            let blobs_dir = blobs_dir.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                self.pull_image(image, &blobs_dir).await
            }
        });

        let mut entries = Vec::new();
        for result in join_all(tasks).await {
            entries.push(result?);
        }

        // Deterministic reduce: order is not observable within the batch,
        // so the merged index is sorted by digest.
        entries.sort_by(|a, b| a.digest.cmp(&b.digest));
        entries.dedup_by(|a, b| a.digest == b.digest);

        let index = OciIndex {
            schema_version: 2,
            manifests: entries,
        };
        std::fs::write(
            dst.image_index_path(),
            serde_json::to_vec_pretty(&index)?,
        )?;

        dst.set_from_paths(&[
            zarf_core::layout::OCI_LAYOUT.to_string(),
            zarf_core::layout::IMAGE_INDEX.to_string(),
        ]);

        Ok(())
    }

    async fn pull_image(&self, image: &str, blobs_dir: &Path) -> Result<OciIndexEntry> {
        let reference =
            Reference::try_from(image).map_err(|e| BuildError::ImagePull {
                reference: image.to_string(),
                message: e.to_string(),
            })?;

        let (manifest_bytes, manifest_digest, reference) =
            self.resolve_arch_manifest(&reference, image).await?;

        let manifest: serde_json::Value = serde_json::from_slice(&manifest_bytes)?;

        write_blob_if_absent(blobs_dir, &manifest_digest, &manifest_bytes)?;

        let mut blobs: Vec<OciDescriptor> = Vec::new();
        if let Some(config) = descriptor_from(&manifest["config"]) {
            blobs.push(config);
        }
        if let Some(layers) = manifest["layers"].as_array() {
            blobs.extend(layers.iter().filter_map(descriptor_from));
        }

        for desc in &blobs {
            self.fetch_blob(&reference, desc, blobs_dir, image).await?;
        }

        let media_type = manifest["mediaType"]
            .as_str()
            .unwrap_or(IMAGE_MANIFEST_MEDIA_TYPE)
            .to_string();
        let mut annotations = BTreeMap::new();
        annotations.insert(
            media_types::BASE_IMAGE_ANNOTATION.to_string(),
            image.to_string(),
        );

        tracing::info!(image, digest = %manifest_digest, "pulled image into layout");

        Ok(OciIndexEntry {
            media_type,
            digest: manifest_digest,
            size: manifest_bytes.len() as i64,
            annotations,
        })
    }

    /// Resolve a multi-arch index down to the manifest for our
    /// architecture; single-arch manifests pass straight through.
    async fn resolve_arch_manifest(
        &self,
        reference: &Reference,
        image: &str,
    ) -> Result<(Vec<u8>, String, Reference)> {
        let (bytes, digest) = self
            .client
            .pull_manifest_raw(reference, &self.auth, ACCEPTED_MANIFEST_TYPES)
            .await
            .map_err(|e| BuildError::ImagePull {
                reference: image.to_string(),
                message: e.to_string(),
            })?;

        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        let Some(manifests) = value["manifests"].as_array() else {
            return Ok((bytes, digest, reference.clone()));
        };

        let arch_digest = manifests
            .iter()
            .find(|m| {
                m["platform"]["architecture"].as_str() == Some(self.arch.as_str())
                    && m["platform"]["os"].as_str() == Some("linux")
            })
            .and_then(|m| m["digest"].as_str())
            .ok_or_else(|| BuildError::NoArchManifest {
                reference: image.to_string(),
                arch: self.arch.clone(),
            })?;

        let pinned = Reference::with_digest(
            reference.registry().to_string(),
            reference.repository().to_string(),
            arch_digest.to_string(),
        );
        let (bytes, digest) = self
            .client
            .pull_manifest_raw(&pinned, &self.auth, ACCEPTED_MANIFEST_TYPES)
            .await
            .map_err(|e| BuildError::ImagePull {
                reference: image.to_string(),
                message: e.to_string(),
            })?;

        Ok((bytes, digest, pinned))
    }

    async fn fetch_blob(
        &self,
        reference: &Reference,
        desc: &OciDescriptor,
        blobs_dir: &Path,
        image: &str,
    ) -> Result<()> {
        let hex = desc
            .digest
            .strip_prefix("sha256:")
            .unwrap_or(&desc.digest)
            .to_string();
        let dest = blobs_dir.join(&hex);
        if dest.exists() {
            return Ok(());
        }

        // Cache hit: hard copy into the layout without touching the network.
        if let Some(cache) = &self.cache {
            if cache.has_blob(&hex) {
                std::fs::copy(cache.blob_path(&hex), &dest)?;
                return Ok(());
            }
        }

        let mut data = Vec::with_capacity(desc.size.max(0) as usize);
        self.client
            .pull_blob(reference, desc, &mut data)
            .await
            .map_err(|e| BuildError::ImagePull {
                reference: image.to_string(),
                message: format!("blob {}: {}", desc.digest, e),
            })?;

        let actual = sha256_hex(&data);
        if actual != hex {
            return Err(BuildError::Core(zarf_core::CoreError::ChecksumMismatch {
                path: format!("{}@{}", image, desc.digest),
                expected: hex,
                actual,
            }));
        }

        if let Some(cache) = &self.cache {
            let staged = cache.stage_path(&hex);
            std::fs::write(&staged, &data)?;
            cache.commit_blob(&hex, &staged)?;
        }

        write_blob_if_absent(blobs_dir, &desc.digest, &data)?;
        Ok(())
    }
}

/// Write a blob under its digest; first writer wins.
fn write_blob_if_absent(blobs_dir: &Path, digest: &str, data: &[u8]) -> Result<()> {
    let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
    let dest = blobs_dir.join(hex);
    if dest.exists() {
        return Ok(());
    }
    let mut tmp = tempfile::NamedTempFile::new_in(blobs_dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    // A concurrent writer may have landed the same content; the rename
    // replacing it is byte-identical either way.
    tmp.persist(&dest)
        .map_err(|e| BuildError::Io(e.error))?;
    Ok(())
}

fn descriptor_from(value: &serde_json::Value) -> Option<OciDescriptor> {
    Some(OciDescriptor {
        media_type: value["mediaType"].as_str()?.to_string(),
        digest: value["digest"].as_str()?.to_string(),
        size: value["size"].as_i64().unwrap_or(0),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_blob_first_writer_wins() {
        let temp = TempDir::new().unwrap();
        write_blob_if_absent(temp.path(), "sha256:aa", b"first").unwrap();
        write_blob_if_absent(temp.path(), "sha256:aa", b"second").unwrap();
        assert_eq!(std::fs::read(temp.path().join("aa")).unwrap(), b"first");
    }

    #[test]
    fn test_descriptor_from_manifest_json() {
        let value = serde_json::json!({
            "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
            "digest": "sha256:abc",
            "size": 123
        });
        let desc = descriptor_from(&value).unwrap();
        assert_eq!(desc.digest, "sha256:abc");
        assert_eq!(desc.size, 123);

        assert!(descriptor_from(&serde_json::json!({})).is_none());
    }

    #[test]
    fn test_index_serialization_shape() {
        let index = OciIndex {
            schema_version: 2,
            manifests: vec![OciIndexEntry {
                media_type: IMAGE_MANIFEST_MEDIA_TYPE.to_string(),
                digest: "sha256:abc".to_string(),
                size: 10,
                annotations: BTreeMap::from([(
                    media_types::BASE_IMAGE_ANNOTATION.to_string(),
                    "busybox:1.36".to_string(),
                )]),
            }],
        };
        let json = serde_json::to_value(&index).unwrap();
        assert_eq!(json["schemaVersion"], 2);
        assert_eq!(json["manifests"][0]["digest"], "sha256:abc");
        assert_eq!(
            json["manifests"][0]["annotations"][media_types::BASE_IMAGE_ANNOTATION],
            "busybox:1.36"
        );
    }
}
