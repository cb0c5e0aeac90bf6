//! The package creation pipeline
//!
//! Compose -> stage -> pull -> template -> checksum -> sign -> archive.
//! Every staged file's mtime and the build timestamp derive from the
//! definition's source-date-epoch so identical inputs produce
//! bit-identical archives.

use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use zarf_compose::{
    compose_package, load_definition, ComposeError, OciImportResolver, TemplateValue, Templater,
};
use zarf_core::archive::archive_layout;
use zarf_core::checksums::Checksums;
use zarf_core::component::Component;
use zarf_core::config::RuntimeOptions;
use zarf_core::definition::{BuildInfo, Package};
use zarf_core::layout::PackageLayout;
use zarf_core::scratch::Scratch;
use zarf_core::signing::sign_definition;
use zarf_core::split::split_archive;
use zarf_transport::oci::OciRemote;
use zarf_transport::progress::NoProgress;
use zarf_transport::source::{PackageSource, SourceContext};

use crate::charts::{stage_chart, ChartRenderer, LocalChartRenderer};
use crate::differential::DifferentialData;
use crate::error::Result;
use crate::files::stage_file;
use crate::images::ImagePuller;
use crate::repos::mirror_repo;

/// Options for a package build
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Directory holding `zarf.yaml`
    pub base_dir: PathBuf,
    /// Directory the archive is written to
    pub output_dir: PathBuf,
    /// Override the target architecture
    pub architecture: Option<String>,
    /// Build flavor filter
    pub flavor: Option<String>,
    /// Skip zstd compression of the final archive
    pub uncompressed: bool,
    /// Split the archive into parts of at most this many bytes
    pub max_size: Option<u64>,
    /// Sign the definition with this minisign secret key
    pub signing_key: Option<PathBuf>,
    pub signing_key_password: Option<String>,
    /// Base package for a differential build
    pub differential_base: Option<String>,
    /// Publish the finished package to this OCI repository base
    pub publish_to: Option<String>,
    /// Create-time template values (`###ZARF_PKG_TMPL_*###`)
    pub create_set: IndexMap<String, String>,
    pub runtime: RuntimeOptions,
}

impl CreateOptions {
    pub fn new(base_dir: &Path, output_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            architecture: None,
            flavor: None,
            uncompressed: false,
            max_size: None,
            signing_key: None,
            signing_key_password: None,
            differential_base: None,
            publish_to: None,
            create_set: IndexMap::new(),
            runtime: RuntimeOptions::default(),
        }
    }
}

/// What a build produced
#[derive(Debug)]
pub struct CreateResult {
    /// The composed, stamped definition
    pub package: Package,
    /// Archive path, or the part paths for a split build
    pub artifacts: Vec<PathBuf>,
    /// Manifest URL when the package was published
    pub published: Option<String>,
    /// Deprecation and lint warnings gathered along the way
    pub warnings: Vec<String>,
}

/// Builds packages from definitions
pub struct Creator {
    options: CreateOptions,
    renderer: Box<dyn ChartRenderer>,
}

impl Creator {
    pub fn new(options: CreateOptions) -> Self {
        Self {
            options,
            renderer: Box::new(LocalChartRenderer),
        }
    }

    /// Use a Helm-capable chart renderer instead of the local-only one
    pub fn with_renderer(mut self, renderer: Box<dyn ChartRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Run the full pipeline.
    pub async fn create(&self) -> Result<CreateResult> {
        let scratch = Scratch::new(self.options.runtime.tmp_dir.as_deref())?;
        let (mut pkg, mut warnings) = load_definition(&self.options.base_dir)?;
        pkg.validate()?;

        let arch = self
            .options
            .architecture
            .clone()
            .or_else(|| pkg.metadata.architecture.clone())
            .unwrap_or_else(|| default_architecture().to_string());

        // Template tokens inside import references are never substituted.
        for component in &pkg.components {
            if let Some(import) = &component.import {
                for reference in [&import.path, &import.url].into_iter().flatten() {
                    if reference.contains("###ZARF") {
                        warnings.push(format!(
                            "component '{}': template token in import '{}' will not be substituted",
                            component.name, reference
                        ));
                    }
                }
            }
        }

        let resolver = OciSkeletonResolver {
            scratch_dir: scratch.subdir("oci-imports")?,
            runtime: self.options.runtime.clone(),
        };
        let composed = compose_package(
            &mut pkg,
            &self.options.base_dir,
            Some(&arch),
            self.options.flavor.as_deref(),
            &resolver,
        )?;
        warnings.extend(composed.warnings.iter().cloned());

        let differential = match &self.options.differential_base {
            Some(base_ref) => Some(self.load_differential(base_ref, &scratch).await?),
            None => None,
        };
        if let Some(diff) = &differential {
            let stripped = diff.strip(&mut pkg);
            tracing::info!(base = %diff.base_ref, stripped, "differential build");
        }

        let epoch = pkg
            .metadata
            .source_date_epoch
            .unwrap_or_else(|| Utc::now().timestamp());

        pkg.metadata.architecture = Some(arch.clone());
        pkg.build = Some(BuildInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc
                .timestamp_opt(epoch, 0)
                .single()
                .unwrap_or_else(Utc::now)
                .to_rfc3339(),
            architecture: arch.clone(),
            terminal: std::env::var("HOSTNAME").unwrap_or_default(),
            user: std::env::var("USER").unwrap_or_default(),
            differential_base: differential.as_ref().map(|d| d.base_ref.clone()),
            oci_imported_components: composed.oci_imported,
            migrations: migration_ids(&warnings),
            flavor: self.options.flavor.clone(),
        });

        let mut layout = PackageLayout::create(&scratch.subdir("layout")?)?;

        // Stage every component, then template and archive it.
        let staging_root = scratch.subdir("components")?;
        let mut all_images: BTreeSet<String> = BTreeSet::new();
        for component in &mut pkg.components {
            let component_dir = staging_root.join(&component.name);
            std::fs::create_dir_all(&component_dir)?;
            self.stage_component(component, &component_dir).await?;
            all_images.extend(component.images.iter().cloned());
        }

        if !all_images.is_empty() {
            let cache =
                zarf_transport::cache::ContentCache::new(&self.options.runtime.cache_dir)?;
            let puller = ImagePuller::new(
                &arch,
                self.options.runtime.oci_concurrency,
                self.options.runtime.insecure,
            )
            .with_cache(cache);
            let refs: Vec<String> = all_images.into_iter().collect();
            puller.pull_into_layout(&refs, &mut layout).await?;
        }

        warnings.extend(self.apply_create_templates(&pkg, &staging_root)?);

        for component in &pkg.components {
            let component_dir = staging_root.join(&component.name);
            layout.archive_component(&component.name, &component_dir, epoch)?;
        }

        // Write the definition without the aggregate, hash everything,
        // then stamp the aggregate back in.
        pkg.metadata.aggregate_checksum = String::new();
        layout.write_definition(&pkg)?;
        let checksums = Checksums::generate(&layout)?;
        checksums.write(&mut layout)?;
        pkg.metadata.aggregate_checksum = checksums.aggregate();
        layout.write_definition(&pkg)?;

        if let Some(key) = &self.options.signing_key {
            sign_definition(
                &mut layout,
                key,
                self.options.signing_key_password.clone(),
            )?;
        }

        std::fs::create_dir_all(&self.options.output_dir)?;
        let archive = self.options.output_dir.join(archive_name(
            &pkg,
            &arch,
            self.options.uncompressed,
        ));
        archive_layout(&layout, &archive, epoch)?;

        let artifacts = match self.options.max_size {
            Some(max) => split_archive(&archive, max)?,
            None => vec![archive],
        };

        let published = match &self.options.publish_to {
            Some(base) => Some(self.publish(base, &layout, &pkg, &arch).await?),
            None => None,
        };

        Ok(CreateResult {
            package: pkg,
            artifacts,
            published,
            warnings,
        })
    }

    async fn stage_component(&self, component: &mut Component, dir: &Path) -> Result<()> {
        let base = &self.options.base_dir;

        for repo in &component.repos {
            mirror_repo(repo, &dir.join("repos"))?;
        }

        for (idx, file) in component.files.iter().enumerate() {
            stage_file(file, base, dir, idx).await?;
        }

        for manifest in &component.manifests {
            let manifests_dir = dir.join("manifests");
            std::fs::create_dir_all(&manifests_dir)?;
            for (idx, file) in manifest.files.iter().enumerate() {
                let dest = manifests_dir.join(format!("{}-{}.yaml", manifest.name, idx));
                std::fs::copy(base.join(file), &dest)?;
            }
            // Kustomizations are rendered by an external kustomize step;
            // the referenced trees ride along opaque.
            for (idx, kustomization) in manifest.kustomizations.iter().enumerate() {
                let dest = manifests_dir.join(format!("kustomization-{}-{}", manifest.name, idx));
                copy_tree(&base.join(kustomization), &dest)?;
            }
        }

        for chart in &component.charts {
            let discovered = stage_chart(self.renderer.as_ref(), chart, base, dir).await?;
            for image in discovered {
                if !component.images.contains(&image) {
                    component.images.push(image);
                }
            }
        }

        for (idx, injection) in component.data_injections.iter().enumerate() {
            let dest = dir.join("data").join(idx.to_string());
            copy_tree(&base.join(&injection.source), &dest)?;
        }

        Ok(())
    }

    /// Substitute `###ZARF_PKG_TMPL_*###` tokens across staged text
    /// files. Values come from `--set` pairs, variable defaults, and
    /// constants, in that order of precedence.
    fn apply_create_templates(&self, pkg: &Package, staging_root: &Path) -> Result<Vec<String>> {
        let mut templater = Templater::new();
        let mut known: BTreeSet<String> = BTreeSet::new();

        for (name, value) in &self.options.create_set {
            known.insert(name.clone());
            templater = templater.with_application_template(
                &format!("###ZARF_PKG_TMPL_{}###", name),
                TemplateValue {
                    value: value.clone(),
                    ..Default::default()
                },
            );
        }
        for variable in &pkg.variables {
            if let Some(default) = &variable.default {
                if known.insert(variable.name.clone()) {
                    templater = templater.with_application_template(
                        &format!("###ZARF_PKG_TMPL_{}###", variable.name),
                        TemplateValue {
                            value: default.clone(),
                            sensitive: variable.sensitive,
                            ..Default::default()
                        },
                    );
                }
            }
        }
        for constant in &pkg.constants {
            if known.insert(constant.name.clone()) {
                templater = templater.with_application_template(
                    &format!("###ZARF_PKG_TMPL_{}###", constant.name),
                    TemplateValue {
                        value: constant.value.clone(),
                        ..Default::default()
                    },
                );
            }
        }

        let mut warnings = Vec::new();
        for entry in walkdir::WalkDir::new(staging_root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if !zarf_compose::is_text_file(entry.path())? {
                continue;
            }
            let file_warnings = templater.apply(entry.path())?;
            // Deploy-time tokens legitimately stay literal here.
            warnings.extend(
                file_warnings
                    .into_iter()
                    .filter(|w| w.contains("ZARF_PKG_TMPL_")),
            );
        }
        Ok(warnings)
    }

    async fn load_differential(
        &self,
        base_ref: &str,
        scratch: &Scratch,
    ) -> Result<DifferentialData> {
        let source = PackageSource::identify(base_ref)?;
        let ctx = SourceContext {
            options: &self.options.runtime,
            public_key: None,
            cluster: None,
            progress: &NoProgress,
        };
        let mut base_layout = PackageLayout::create(&scratch.subdir("differential-base")?)?;
        let base_pkg = source
            .load_metadata(&ctx, &mut base_layout, false, true)
            .await?;
        Ok(DifferentialData::from_base(base_ref, &base_pkg))
    }

    async fn publish(
        &self,
        base: &str,
        layout: &PackageLayout,
        pkg: &Package,
        arch: &str,
    ) -> Result<String> {
        let version = pkg.metadata.version.as_deref().unwrap_or("latest");
        let reference = format!(
            "{}/{}:{}-{}",
            base.trim_end_matches('/'),
            pkg.metadata.name,
            version,
            arch
        );
        let remote = OciRemote::new(
            &reference,
            self.options.runtime.insecure,
            self.options.runtime.oci_concurrency,
        )?;
        let url = remote.push_package(layout, pkg, &NoProgress).await?;
        tracing::info!(reference = %reference, "published package");
        Ok(url)
    }
}

/// Resolves `oci://` imports by pulling the remote definition into the
/// build scratch. Composition is synchronous, so the fetch blocks in
/// place on the runtime.
struct OciSkeletonResolver {
    scratch_dir: PathBuf,
    runtime: RuntimeOptions,
}

impl OciImportResolver for OciSkeletonResolver {
    fn resolve(&self, url: &str) -> zarf_compose::Result<PathBuf> {
        let dir = self.scratch_dir.join(sanitize_ref(url));
        if dir.join(zarf_core::layout::DEFINITION).exists() {
            return Ok(dir);
        }

        let handle = tokio::runtime::Handle::current();
        let fetched = tokio::task::block_in_place(|| {
            handle.block_on(async {
                let remote =
                    OciRemote::new(url, self.runtime.insecure, self.runtime.oci_concurrency)?;
                let mut dst = PackageLayout::create(&dir)
                    .map_err(zarf_transport::TransportError::Core)?;
                remote
                    .pull_paths(&[zarf_core::layout::DEFINITION], &mut dst)
                    .await
            })
        });

        match fetched {
            Ok(paths) if !paths.is_empty() => Ok(dir),
            Ok(_) | Err(_) => Err(ComposeError::OciImportUnavailable {
                url: url.to_string(),
            }),
        }
    }
}

fn sanitize_ref(reference: &str) -> String {
    reference
        .trim_start_matches("oci://")
        .replace(['/', ':', '@'], "-")
}

fn migration_ids(warnings: &[String]) -> Vec<String> {
    let mut ids: Vec<String> = warnings
        .iter()
        .filter_map(|w| w.split_once(':').map(|(id, _)| id.to_string()))
        .filter(|id| {
            id == zarf_compose::migrations::PLURALIZE_SET_VARIABLE
                || id == zarf_compose::migrations::SCRIPTS_TO_ACTIONS
        })
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Archive file name: `zarf-package-<name>-<arch>[-<version>].tar.zst`,
/// or the init form for init packages.
pub fn archive_name(pkg: &Package, arch: &str, uncompressed: bool) -> String {
    let suffix = if uncompressed { "tar" } else { "tar.zst" };
    let version = pkg
        .metadata
        .version
        .as_ref()
        .map(|v| format!("-{}", v))
        .unwrap_or_default();
    if pkg.is_init() {
        format!("zarf-init-{}{}.{}", arch, version, suffix)
    } else {
        format!(
            "zarf-package-{}-{}{}.{}",
            pkg.metadata.name, arch, version, suffix
        )
    }
}

fn default_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    if src.is_file() {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dest)?;
        return Ok(());
    }
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
    use zarf_core::checksums::{sha256_file, verify_layout, VerifyMode};
    use zarf_core::signing::generate_keypair;

    fn write_minimal_package(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join("zarf.yaml"),
            r#"kind: ZarfPackageConfig
metadata:
  name: hello
  version: 0.1.0
  sourceDateEpoch: 1700000000
components:
  - name: app
    required: true
    manifests:
      - name: hello
        namespace: demo
        files:
          - hello.yaml
"#,
        )
        .unwrap();
        std::fs::write(dir.join("hello.yaml"), "kind: ConfigMap\nmetadata:\n  name: hello\n")
            .unwrap();
    }

    fn test_options(temp: &TempDir) -> CreateOptions {
        let mut options = CreateOptions::new(&temp.path().join("pkg"), &temp.path().join("out"));
        options.runtime.cache_dir = temp.path().join("cache");
        options.architecture = Some("amd64".to_string());
        options
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_minimal_create() {
        let temp = TempDir::new().unwrap();
        write_minimal_package(&temp.path().join("pkg"));

        let result = Creator::new(test_options(&temp)).create().await.unwrap();
        assert_eq!(result.artifacts.len(), 1);
        let archive = &result.artifacts[0];
        assert!(archive
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("zarf-package-hello-amd64"));

        // Load it back and check the layout contract.
        let extract = temp.path().join("extracted");
        let paths = zarf_core::archive::extract_archive(archive, &extract).unwrap();
        assert!(paths.contains(&"zarf.yaml".to_string()));
        assert!(paths.contains(&"checksums.txt".to_string()));
        assert!(paths.contains(&"components/app.tar".to_string()));

        let loaded = PackageLayout::open(&extract).unwrap();
        let pkg = loaded.read_definition().unwrap();
        assert!(!pkg.metadata.aggregate_checksum.is_empty());

        // checksums.txt has exactly two entries: the definition and the
        // component tar.
        let checksums = Checksums::load(&loaded).unwrap();
        assert_eq!(checksums.len(), 2);

        // aggregate checksum == sha256(checksums.txt)
        assert_eq!(
            pkg.metadata.aggregate_checksum,
            sha256_file(&loaded.checksums_path()).unwrap()
        );
        verify_layout(&loaded, &pkg.metadata.aggregate_checksum, VerifyMode::Full).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_is_reproducible() {
        let temp = TempDir::new().unwrap();
        write_minimal_package(&temp.path().join("pkg"));

        let first = Creator::new(test_options(&temp)).create().await.unwrap();
        let first_bytes = std::fs::read(&first.artifacts[0]).unwrap();

        let second = Creator::new(test_options(&temp)).create().await.unwrap();
        let second_bytes = std::fs::read(&second.artifacts[0]).unwrap();

        assert_eq!(first_bytes, second_bytes);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_signed_create() {
        let temp = TempDir::new().unwrap();
        write_minimal_package(&temp.path().join("pkg"));
        let (sk, pk) = generate_keypair(&temp.path().join("keys"), "zarf").unwrap();

        let mut options = test_options(&temp);
        options.signing_key = Some(sk);
        let result = Creator::new(options).create().await.unwrap();

        let extract = temp.path().join("extracted");
        zarf_core::archive::extract_archive(&result.artifacts[0], &extract).unwrap();
        let loaded = PackageLayout::open(&extract).unwrap();
        assert!(loaded.has_signature());
        zarf_core::signing::verify_definition(&loaded, Some(&pk)).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_split_create() {
        let temp = TempDir::new().unwrap();
        write_minimal_package(&temp.path().join("pkg"));

        let mut options = test_options(&temp);
        options.max_size = Some(512);
        let result = Creator::new(options).create().await.unwrap();

        assert!(result.artifacts.len() >= 2);
        assert!(result.artifacts[0]
            .to_string_lossy()
            .ends_with(".part000"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_template_substitution() {
        let temp = TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("zarf.yaml"),
            r#"kind: ZarfPackageConfig
metadata:
  name: templated
  version: 0.1.0
  sourceDateEpoch: 1700000000
constants:
  - name: PORT
    value: "8080"
components:
  - name: app
    required: true
    manifests:
      - name: svc
        files:
          - svc.yaml
"#,
        )
        .unwrap();
        std::fs::write(
            pkg_dir.join("svc.yaml"),
            "port: ###ZARF_PKG_TMPL_PORT###\nkeep: ###ZARF_VAR_RUNTIME###\n",
        )
        .unwrap();

        let mut options = test_options(&temp);
        options.base_dir = pkg_dir;
        let result = Creator::new(options).create().await.unwrap();

        let extract = temp.path().join("extracted");
        zarf_core::archive::extract_archive(&result.artifacts[0], &extract).unwrap();
        let mut loaded = PackageLayout::open(&extract).unwrap();
        loaded.unarchive_component("app").unwrap();
        let rendered = std::fs::read_to_string(
            loaded.component_dir("app").join("manifests/svc-0.yaml"),
        )
        .unwrap();
        // Create-time token substituted; deploy-time token intact.
        assert!(rendered.contains("port: 8080"));
        assert!(rendered.contains("keep: ###ZARF_VAR_RUNTIME###"));
    }

    #[test]
    fn test_archive_name() {
        let mut pkg = Package {
            metadata: zarf_core::definition::PackageMetadata {
                name: "hello".to_string(),
                version: Some("0.1.0".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            archive_name(&pkg, "amd64", false),
            "zarf-package-hello-amd64-0.1.0.tar.zst"
        );
        pkg.kind = zarf_core::definition::PackageKind::Init;
        assert_eq!(archive_name(&pkg, "arm64", true), "zarf-init-arm64-0.1.0.tar");
    }
}
