//! Mirroring package content into in-cluster services
//!
//! Images move from the embedded OCI layout into the cluster's registry;
//! bare repo mirrors are pushed to the cluster's git server. Both run
//! before any chart installs so workloads resolve against the mirrors.

use git2::{PushOptions, RemoteCallbacks, Repository};
use oci_distribution::client::{Client, ClientConfig, Config, ImageLayer};
use oci_distribution::manifest::OciImageManifest;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::Reference;
use std::path::Path;

use zarf_core::layout::PackageLayout;
use zarf_transport::oci::media_types;

use crate::error::{KubeError, Result};

/// Where mirrored content lands
#[derive(Debug, Clone, Default)]
pub struct MirrorTargets {
    pub registry: Option<RegistryTarget>,
    pub git: Option<GitTarget>,
}

#[derive(Debug, Clone)]
pub struct RegistryTarget {
    /// Registry address, e.g. `registry.zarf.svc:5000`
    pub address: String,
    pub username: String,
    pub password: String,
    pub insecure: bool,
}

#[derive(Debug, Clone)]
pub struct GitTarget {
    /// Git server base url, e.g. `http://git.zarf.svc:3000/zarf`
    pub address: String,
    pub username: String,
    pub password: String,
}

/// Push selected images from the embedded layout into the registry.
/// Returns the mirrored references. Blobs the registry already holds are
/// skipped by the push protocol's existence checks.
pub async fn mirror_images(
    src: &PackageLayout,
    target: &RegistryTarget,
    images: &[String],
) -> Result<Vec<String>> {
    if images.is_empty() {
        return Ok(Vec::new());
    }

    let index: serde_json::Value =
        serde_json::from_slice(&std::fs::read(src.image_index_path())?)?;
    let manifests = index["manifests"].as_array().ok_or(KubeError::Mirror {
        message: "embedded image index has no manifests".to_string(),
    })?;

    let client = Client::new(ClientConfig {
        accept_invalid_certificates: target.insecure,
        ..Default::default()
    });
    let auth = RegistryAuth::Basic(target.username.clone(), target.password.clone());

    let mut mirrored = Vec::new();
    for entry in manifests {
        let Some(original) = entry["annotations"][media_types::BASE_IMAGE_ANNOTATION].as_str()
        else {
            continue;
        };
        if !images.iter().any(|i| i == original) {
            continue;
        }

        let digest = entry["digest"].as_str().ok_or(KubeError::Mirror {
            message: format!("index entry for {} has no digest", original),
        })?;
        let reference = push_one_image(&client, &auth, src, target, original, digest).await?;
        mirrored.push(reference);
    }

    Ok(mirrored)
}

async fn push_one_image(
    client: &Client,
    auth: &RegistryAuth,
    src: &PackageLayout,
    target: &RegistryTarget,
    original: &str,
    manifest_digest: &str,
) -> Result<String> {
    let blobs = src.image_blobs_dir();
    let manifest_bytes = std::fs::read(blobs.join(hex_of(manifest_digest)))?;
    let manifest: OciImageManifest =
        serde_json::from_slice(&manifest_bytes).map_err(|e| KubeError::Mirror {
            message: format!("manifest for {}: {}", original, e),
        })?;

    let config_data = std::fs::read(blobs.join(hex_of(&manifest.config.digest)))?;
    let config = Config {
        data: config_data,
        media_type: manifest.config.media_type.clone(),
        annotations: None,
    };

    let mut layers = Vec::with_capacity(manifest.layers.len());
    for layer in &manifest.layers {
        layers.push(ImageLayer {
            data: std::fs::read(blobs.join(hex_of(&layer.digest)))?,
            media_type: layer.media_type.clone(),
            annotations: None,
        });
    }

    let source = Reference::try_from(original).map_err(|e| KubeError::Mirror {
        message: format!("invalid reference {}: {}", original, e),
    })?;
    let mirrored = Reference::with_tag(
        target.address.clone(),
        source.repository().to_string(),
        source.tag().unwrap_or("latest").to_string(),
    );

    client
        .push(&mirrored, &layers, config, auth, Some(manifest))
        .await
        .map_err(|e| KubeError::Mirror {
            message: format!("push of {} failed: {}", original, e),
        })?;

    tracing::info!(from = original, to = %mirrored, "mirrored image");
    Ok(mirrored.to_string())
}

/// Push every bare mirror under `repos_dir` to the git server.
/// Returns the mirror directory names pushed.
pub fn mirror_repos(repos_dir: &Path, target: &GitTarget) -> Result<Vec<String>> {
    if !repos_dir.exists() {
        return Ok(Vec::new());
    }

    let mut pushed = Vec::new();
    for entry in std::fs::read_dir(repos_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        push_repo(&entry.path(), &name, target)?;
        pushed.push(name);
    }
    Ok(pushed)
}

fn push_repo(mirror: &Path, name: &str, target: &GitTarget) -> Result<()> {
    let repo = Repository::open_bare(mirror).map_err(|e| KubeError::Mirror {
        message: format!("open {}: {}", mirror.display(), e),
    })?;

    let url = format!("{}/{}", target.address.trim_end_matches('/'), name);
    let mut remote = repo
        .remote_anonymous(&url)
        .map_err(|e| KubeError::Mirror {
            message: format!("remote {}: {}", url, e),
        })?;

    let mut callbacks = RemoteCallbacks::new();
    let (username, password) = (target.username.clone(), target.password.clone());
    callbacks.credentials(move |_, _, _| git2::Cred::userpass_plaintext(&username, &password));
    let mut options = PushOptions::new();
    options.remote_callbacks(callbacks);

    remote
        .push(
            &["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"],
            Some(&mut options),
        )
        .map_err(|e| KubeError::Mirror {
            message: format!("push {}: {}", url, e),
        })?;

    tracing::info!(repo = name, to = %url, "mirrored repository");
    Ok(())
}

fn hex_of(digest: &str) -> &str {
    digest.strip_prefix("sha256:").unwrap_or(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_of() {
        assert_eq!(hex_of("sha256:abc"), "abc");
        assert_eq!(hex_of("abc"), "abc");
    }

    #[tokio::test]
    async fn test_mirror_images_empty_selection() {
        let temp = tempfile::TempDir::new().unwrap();
        let layout = PackageLayout::create(temp.path()).unwrap();
        let target = RegistryTarget {
            address: "registry.zarf.svc:5000".to_string(),
            username: "push".to_string(),
            password: "secret".to_string(),
            insecure: true,
        };
        let mirrored = mirror_images(&layout, &target, &[]).await.unwrap();
        assert!(mirrored.is_empty());
    }

    #[test]
    fn test_mirror_repos_missing_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = GitTarget {
            address: "http://git.zarf.svc:3000/zarf".to_string(),
            username: "git".to_string(),
            password: "secret".to_string(),
        };
        let pushed = mirror_repos(&temp.path().join("repos"), &target).unwrap();
        assert!(pushed.is_empty());
    }
}
