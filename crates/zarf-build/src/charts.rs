//! Chart staging
//!
//! Charts land at the well-known path `charts/<name>-<version>/` inside
//! a component's scratch directory; values files are staged next to
//! them. Rendering (to discover the images a chart needs) is delegated
//! to a Helm-capable implementation behind `ChartRenderer` - this crate
//! never renders templates itself.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use zarf_core::component::Chart;

use crate::error::{BuildError, Result};

/// Fetches and renders charts. The deploy-side Helm integration provides
/// the real implementation; `LocalChartRenderer` covers local-path
/// charts without any Helm dependency.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Materialize the chart under `dest/<name>-<version>/`
    async fn fetch(&self, chart: &Chart, base_dir: &Path, dest: &Path) -> Result<PathBuf>;

    /// Render once with the staged values to discover required images
    async fn render_images(&self, chart_dir: &Path, chart: &Chart) -> Result<Vec<String>>;
}

/// Renderer that can only stage `localPath` charts and discovers no
/// images. Remote chart sources need a Helm-backed renderer.
pub struct LocalChartRenderer;

#[async_trait]
impl ChartRenderer for LocalChartRenderer {
    async fn fetch(&self, chart: &Chart, base_dir: &Path, dest: &Path) -> Result<PathBuf> {
        let Some(local) = &chart.local_path else {
            return Err(BuildError::Chart {
                name: chart.name.clone(),
                message: "only localPath charts can be staged without a Helm renderer"
                    .to_string(),
            });
        };

        let target = dest.join(chart_dir_name(chart));
        copy_dir(&base_dir.join(local), &target)?;
        Ok(target)
    }

    async fn render_images(&self, _chart_dir: &Path, _chart: &Chart) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// `<name>-<version>` directory name for a staged chart
pub fn chart_dir_name(chart: &Chart) -> String {
    chart.staged_dir_name()
}

/// Stage a chart and its values files, returning discovered images.
pub async fn stage_chart(
    renderer: &dyn ChartRenderer,
    chart: &Chart,
    base_dir: &Path,
    component_dir: &Path,
) -> Result<Vec<String>> {
    let charts_dir = component_dir.join("charts");
    std::fs::create_dir_all(&charts_dir)?;

    let chart_dir = renderer.fetch(chart, base_dir, &charts_dir).await?;

    for (idx, values) in chart.values_files.iter().enumerate() {
        let src = base_dir.join(values);
        let dest = charts_dir.join(format!("{}-values-{}.yaml", chart.name, idx));
        std::fs::copy(&src, &dest).map_err(|e| BuildError::Chart {
            name: chart.name.clone(),
            message: format!("values file {}: {}", values, e),
        })?;
    }

    renderer.render_images(&chart_dir, chart).await
}

fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in walkdir::WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => continue,
        };
        let target = dest.join(&rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stage_local_chart() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("pkg");
        std::fs::create_dir_all(base.join("chart/templates")).unwrap();
        std::fs::write(base.join("chart/Chart.yaml"), "name: podinfo\n").unwrap();
        std::fs::write(base.join("chart/templates/deploy.yaml"), "kind: Deployment\n")
            .unwrap();
        std::fs::write(base.join("prod-values.yaml"), "replicas: 3\n").unwrap();

        let chart = Chart {
            name: "podinfo".to_string(),
            version: Some("6.4.0".to_string()),
            local_path: Some("chart".to_string()),
            values_files: vec!["prod-values.yaml".to_string()],
            ..Default::default()
        };

        let component_dir = temp.path().join("component");
        let images = stage_chart(&LocalChartRenderer, &chart, &base, &component_dir)
            .await
            .unwrap();
        assert!(images.is_empty());

        let staged = component_dir.join("charts/podinfo-6.4.0");
        assert!(staged.join("Chart.yaml").exists());
        assert!(staged.join("templates/deploy.yaml").exists());
        assert!(component_dir.join("charts/podinfo-values-0.yaml").exists());
    }

    #[tokio::test]
    async fn test_remote_chart_needs_renderer() {
        let temp = TempDir::new().unwrap();
        let chart = Chart {
            name: "podinfo".to_string(),
            url: Some("https://stefanprodan.github.io/podinfo".to_string()),
            ..Default::default()
        };
        let err = stage_chart(&LocalChartRenderer, &chart, temp.path(), temp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Chart { .. }));
    }

    #[test]
    fn test_chart_dir_name() {
        let chart = Chart {
            name: "podinfo".to_string(),
            version: Some("6.4.0".to_string()),
            ..Default::default()
        };
        assert_eq!(chart_dir_name(&chart), "podinfo-6.4.0");
    }
}
