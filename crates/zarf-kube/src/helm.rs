//! Chart installation seam and synthetic charts
//!
//! Actual Helm rendering and release management are delegated behind
//! `ChartInstaller`. Raw manifests are wrapped in a generated chart so
//! install, upgrade and uninstall all flow through the same path; the
//! release name is the SHA-1 of the chart name so it stays stable across
//! upgrades.

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};

use zarf_core::component::Chart;

use crate::error::{KubeError, Result};

/// Installs, upgrades and uninstalls chart releases
#[async_trait]
pub trait ChartInstaller: Send + Sync {
    /// Install or upgrade a release from an unpacked chart directory
    async fn install_or_upgrade(
        &self,
        chart: &Chart,
        chart_dir: &Path,
        values_files: &[PathBuf],
        namespace: &str,
        release_name: &str,
        wait: bool,
    ) -> Result<()>;

    /// Uninstall a release, optionally waiting for deletion
    async fn uninstall(&self, release_name: &str, namespace: &str, wait: bool) -> Result<()>;
}

/// Installer for contexts without a Helm implementation (lint, dry runs,
/// tests). Every call fails loudly.
pub struct NoHelm;

#[async_trait]
impl ChartInstaller for NoHelm {
    async fn install_or_upgrade(
        &self,
        _chart: &Chart,
        _chart_dir: &Path,
        _values_files: &[PathBuf],
        _namespace: &str,
        release_name: &str,
        _wait: bool,
    ) -> Result<()> {
        Err(KubeError::ChartInstall {
            release: release_name.to_string(),
            message: "no chart installer configured".to_string(),
        })
    }

    async fn uninstall(&self, release_name: &str, _namespace: &str, _wait: bool) -> Result<()> {
        Err(KubeError::ChartInstall {
            release: release_name.to_string(),
            message: "no chart installer configured".to_string(),
        })
    }
}

/// Installer that delegates to the `helm` binary on the PATH. Rendering
/// and release bookkeeping stay entirely Helm's problem.
pub struct HelmCli {
    pub kubeconfig: Option<PathBuf>,
}

impl HelmCli {
    pub fn new() -> Self {
        Self { kubeconfig: None }
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("helm");
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd
    }
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChartInstaller for HelmCli {
    async fn install_or_upgrade(
        &self,
        _chart: &Chart,
        chart_dir: &Path,
        values_files: &[PathBuf],
        namespace: &str,
        release_name: &str,
        wait: bool,
    ) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("upgrade")
            .arg("--install")
            .arg(release_name)
            .arg(chart_dir)
            .arg("--namespace")
            .arg(namespace)
            .arg("--create-namespace");
        for values in values_files {
            cmd.arg("--values").arg(values);
        }
        if wait {
            cmd.arg("--wait");
        }

        let output = cmd.output().await.map_err(|e| KubeError::ChartInstall {
            release: release_name.to_string(),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(KubeError::ChartInstall {
                release: release_name.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn uninstall(&self, release_name: &str, namespace: &str, wait: bool) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("uninstall")
            .arg(release_name)
            .arg("--namespace")
            .arg(namespace);
        if wait {
            cmd.arg("--wait");
        }

        let output = cmd.output().await.map_err(|e| KubeError::ChartInstall {
            release: release_name.to_string(),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(KubeError::ChartInstall {
                release: release_name.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Chart name for a wrapped raw-manifest group
pub fn synthetic_chart_name(package: &str, component: &str, manifest: &str) -> String {
    format!("raw-{}-{}-{}", package, component, manifest)
}

/// Release name for a synthetic chart: the 40 hex chars of the chart
/// name's SHA-1, stable across upgrades.
pub fn synthetic_release_name(chart_name: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(chart_name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a minimal chart wrapping raw manifest files so they install
/// through the same path as real charts. Template braces in the
/// manifests are escaped so Helm passes them through untouched.
pub fn generate_synthetic_chart(
    chart_name: &str,
    manifest_files: &[PathBuf],
    dest: &Path,
) -> Result<PathBuf> {
    let chart_dir = dest.join(chart_name);
    let templates = chart_dir.join("templates");
    std::fs::create_dir_all(&templates)?;

    std::fs::write(
        chart_dir.join("Chart.yaml"),
        format!(
            "apiVersion: v1\nname: {}\nversion: 0.1.0\ndescription: Generated from raw manifests\n",
            chart_name
        ),
    )?;

    for (idx, file) in manifest_files.iter().enumerate() {
        let content = std::fs::read_to_string(file)?;
        let escaped = content.replace("{{", "{{\"{{\"}}");
        let name = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| idx.to_string());
        std::fs::write(templates.join(format!("{}.yaml", name)), escaped)?;
    }

    Ok(chart_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_synthetic_names() {
        let chart = synthetic_chart_name("p1", "app", "hello");
        assert_eq!(chart, "raw-p1-app-hello");

        let release = synthetic_release_name(&chart);
        assert_eq!(release.len(), 40);
        assert!(release.chars().all(|c| c.is_ascii_hexdigit()));
        // Stable across calls.
        assert_eq!(release, synthetic_release_name(&chart));
        assert_ne!(release, synthetic_release_name("raw-p1-app-other"));
    }

    #[test]
    fn test_generate_synthetic_chart() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("cm.yaml");
        std::fs::write(&manifest, "data:\n  tpl: \"{{ not-helm }}\"\n").unwrap();

        let chart_dir = generate_synthetic_chart(
            "raw-p1-app-hello",
            &[manifest],
            temp.path(),
        )
        .unwrap();

        let chart_yaml = std::fs::read_to_string(chart_dir.join("Chart.yaml")).unwrap();
        assert!(chart_yaml.contains("name: raw-p1-app-hello"));

        let rendered = std::fs::read_to_string(chart_dir.join("templates/cm.yaml")).unwrap();
        // Braces escaped so Helm emits them verbatim.
        assert!(rendered.contains("{{\"{{\"}}"));
    }
}
