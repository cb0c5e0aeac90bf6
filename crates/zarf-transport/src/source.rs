//! Polymorphic package sources
//!
//! A source is recognized once from the operator's string and carries no
//! hidden dispatch: tarballs and split archives by suffix, OCI and
//! HTTP(S) by scheme, and anything shaped like a package name by asking
//! the cluster's deployment records.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use zarf_core::checksums::{verify_layout, VerifyMode};
use zarf_core::config::RuntimeOptions;
use zarf_core::definition::{validate_package_name, Package};
use zarf_core::layout::PackageLayout;
use zarf_core::scratch::Scratch;
use zarf_core::signing::verify_definition;
use zarf_core::CoreError;

use crate::error::{Result, TransportError};
use crate::http::{fetch_to, parse_url_shasum};
use crate::oci::{OciRemote, PACKAGE_ALWAYS_PULL};
use crate::progress::ProgressSink;
use crate::tarball::{extract_all, extract_paths};

/// Looks up deployed packages in a cluster's state store. Implemented by
/// the reconciler crate; the transport only needs the definition back.
#[async_trait]
pub trait DeployedPackageLookup: Send + Sync {
    async fn definition(&self, name: &str) -> Result<Option<Package>>;
}

/// Everything a load needs beyond the source itself
pub struct SourceContext<'a> {
    pub options: &'a RuntimeOptions,
    /// Public key for signature validation, when the operator has one
    pub public_key: Option<&'a Path>,
    /// Cluster record access for the in-cluster variant
    pub cluster: Option<&'a dyn DeployedPackageLookup>,
    pub progress: &'a dyn ProgressSink,
}

/// A package source, constructed once from the operator's string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    Tarball { path: PathBuf },
    Split { part000: PathBuf },
    Oci { reference: String },
    Http { url: String, shasum: Option<String> },
    Cluster { name: String },
}

impl PackageSource {
    /// Classify a source string. Bare DNS-1123 names resolve through the
    /// cluster's deployment records.
    pub fn identify(src: &str) -> Result<Self> {
        if src.starts_with("oci://") {
            return Ok(Self::Oci {
                reference: src.to_string(),
            });
        }
        if src.starts_with("http://") || src.starts_with("https://") {
            let (url, shasum) = parse_url_shasum(src);
            return Ok(Self::Http { url, shasum });
        }
        if src.ends_with(".part000") {
            return Ok(Self::Split {
                part000: PathBuf::from(src),
            });
        }
        if src.ends_with(".tar") || src.ends_with(".tar.zst") {
            return Ok(Self::Tarball {
                path: PathBuf::from(src),
            });
        }
        if validate_package_name(src).is_ok() {
            return Ok(Self::Cluster {
                name: src.to_string(),
            });
        }
        Err(TransportError::UnknownSource {
            value: src.to_string(),
        })
    }

    /// Pull at minimum the definition, signature and checksums into the
    /// layout, validate them, and return the parsed definition.
    pub async fn load_metadata(
        &self,
        ctx: &SourceContext<'_>,
        dst: &mut PackageLayout,
        want_sbom: bool,
        skip_sig_validation: bool,
    ) -> Result<Package> {
        match self {
            Self::Tarball { path } => {
                tarball_metadata(path, dst, want_sbom, skip_sig_validation, ctx.public_key)
            }
            Self::Split { part000 } => {
                let joined = zarf_core::split::join_parts(part000)?;
                tarball_metadata(&joined, dst, want_sbom, skip_sig_validation, ctx.public_key)
            }
            Self::Http { url, shasum } => {
                let scratch = Scratch::new(ctx.options.tmp_dir.as_deref())?;
                let local = scratch.file(archive_name(url));
                fetch_to(url, &local, shasum.as_deref()).await?;
                tarball_metadata(&local, dst, want_sbom, skip_sig_validation, ctx.public_key)
            }
            Self::Oci { reference } => {
                let remote = OciRemote::new(
                    reference,
                    ctx.options.insecure,
                    ctx.options.oci_concurrency,
                )?;
                let mut wanted: Vec<&str> = PACKAGE_ALWAYS_PULL.to_vec();
                if want_sbom {
                    wanted.push(zarf_core::layout::SBOM_TAR);
                }
                remote.pull_paths(&wanted, dst).await?;
                finish_metadata_load(dst, want_sbom, skip_sig_validation, ctx.public_key)
            }
            Self::Cluster { name } => {
                let cluster = ctx.cluster.ok_or(TransportError::Unsupported {
                    operation: "in-cluster lookup without cluster access".to_string(),
                })?;
                let pkg = cluster
                    .definition(name)
                    .await?
                    .ok_or_else(|| TransportError::NotDeployed { name: name.clone() })?;
                dst.write_definition(&pkg)?;
                Ok(pkg)
            }
        }
    }

    /// Materialize the package layout verbatim - verified, but with
    /// component tars left packed - so it can be re-archived or
    /// published without disturbing the shipped checksums.
    pub async fn collect(
        &self,
        ctx: &SourceContext<'_>,
        dst: &mut PackageLayout,
    ) -> Result<Package> {
        match self {
            Self::Tarball { path } => {
                tarball_collect(path, dst, ctx.public_key, ctx.options.insecure)
            }
            Self::Split { part000 } => {
                let joined = zarf_core::split::join_parts(part000)?;
                tarball_collect(&joined, dst, ctx.public_key, ctx.options.insecure)
            }
            Self::Http { url, shasum } => {
                let scratch = Scratch::new(ctx.options.tmp_dir.as_deref())?;
                let local = scratch.file(archive_name(url));
                fetch_to(url, &local, shasum.as_deref()).await?;
                tarball_collect(&local, dst, ctx.public_key, ctx.options.insecure)
            }
            Self::Oci { reference } => {
                let remote = OciRemote::new(
                    reference,
                    ctx.options.insecure,
                    ctx.options.oci_concurrency,
                )?;
                remote.pull_package(dst, None, ctx.progress).await?;
                let pkg = dst.read_definition()?;
                verify_layout(dst, &pkg.metadata.aggregate_checksum, VerifyMode::Full)?;
                verify_signature(dst, ctx.public_key, ctx.options.insecure)?;
                Ok(pkg)
            }
            Self::Cluster { name } => Err(TransportError::Unsupported {
                operation: format!("collect of deployed package '{}'", name),
            }),
        }
    }

    /// Fully materialize the package into the layout. Component selection
    /// only narrows OCI pulls; every other variant loads whole.
    pub async fn load(
        &self,
        ctx: &SourceContext<'_>,
        dst: &mut PackageLayout,
        optional_components: &[String],
    ) -> Result<Package> {
        match self {
            Self::Tarball { path } => {
                tarball_load(path, dst, ctx.public_key, ctx.options.insecure)
            }
            Self::Split { part000 } => {
                let joined = zarf_core::split::join_parts(part000)?;
                tarball_load(&joined, dst, ctx.public_key, ctx.options.insecure)
            }
            Self::Http { url, shasum } => {
                let scratch = Scratch::new(ctx.options.tmp_dir.as_deref())?;
                let local = scratch.file(archive_name(url));
                fetch_to(url, &local, shasum.as_deref()).await?;
                tarball_load(&local, dst, ctx.public_key, ctx.options.insecure)
            }
            Self::Oci { reference } => {
                let remote = OciRemote::new(
                    reference,
                    ctx.options.insecure,
                    ctx.options.oci_concurrency,
                )?;
                let root = remote.fetch_root().await?;
                let pkg = remote.fetch_definition(&root).await?;

                let (layers, partial) = if optional_components.is_empty() {
                    (None, false)
                } else {
                    let selected = remote
                        .layers_from_components(&root, &pkg, optional_components)
                        .await?;
                    let partial = selected.len() != root.layers.len();
                    (Some(selected), partial)
                };

                remote.pull_package(dst, layers, ctx.progress).await?;

                let pkg = dst.read_definition()?;
                let mode = if partial {
                    VerifyMode::Partial
                } else {
                    VerifyMode::Full
                };
                verify_layout(dst, &pkg.metadata.aggregate_checksum, mode)?;
                verify_signature(dst, ctx.public_key, ctx.options.insecure)?;
                unpack_components(&pkg, dst)?;
                dst.unarchive_sboms()?;
                Ok(pkg)
            }
            Self::Cluster { name } => Err(TransportError::Unsupported {
                operation: format!(
                    "full load of deployed package '{}' (the cluster stores the definition, not the artifacts)",
                    name
                ),
            }),
        }
    }
}

/// Metadata load from a local archive: extract only the mandatory
/// members (plus `sboms.tar` when wanted) and validate them.
fn tarball_metadata(
    path: &Path,
    dst: &mut PackageLayout,
    want_sbom: bool,
    skip_sig_validation: bool,
    public_key: Option<&Path>,
) -> Result<Package> {
    let mut wanted: Vec<&str> = PACKAGE_ALWAYS_PULL.to_vec();
    if want_sbom {
        wanted.push(zarf_core::layout::SBOM_TAR);
    }
    extract_paths(path, dst, &wanted)?;
    finish_metadata_load(dst, want_sbom, skip_sig_validation, public_key)
}

/// Full load from a local archive: extract, verify, unpack components.
fn tarball_load(
    path: &Path,
    dst: &mut PackageLayout,
    public_key: Option<&Path>,
    insecure: bool,
) -> Result<Package> {
    let pkg = tarball_collect(path, dst, public_key, insecure)?;
    unpack_components(&pkg, dst)?;
    dst.unarchive_sboms()?;
    Ok(pkg)
}

/// Verified extraction with component tars left packed.
fn tarball_collect(
    path: &Path,
    dst: &mut PackageLayout,
    public_key: Option<&Path>,
    insecure: bool,
) -> Result<Package> {
    extract_all(path, dst)?;
    let pkg = dst.read_definition()?;
    verify_layout(dst, &pkg.metadata.aggregate_checksum, VerifyMode::Full)?;
    verify_signature(dst, public_key, insecure)?;
    Ok(pkg)
}

fn finish_metadata_load(
    dst: &mut PackageLayout,
    want_sbom: bool,
    skip_sig_validation: bool,
    public_key: Option<&Path>,
) -> Result<Package> {
    let pkg = dst.read_definition()?;

    verify_layout(dst, &pkg.metadata.aggregate_checksum, VerifyMode::Partial)?;

    match verify_definition(dst, public_key) {
        Err(CoreError::SignedButNoKey) if skip_sig_validation => {
            tracing::warn!(
                "package is signed but no public key was provided, skipping signature validation"
            );
        }
        Err(e) => return Err(e.into()),
        Ok(()) => {}
    }

    if want_sbom && !dst.has_sboms() {
        return Err(TransportError::Core(CoreError::MissingFile {
            path: zarf_core::layout::SBOM_TAR.to_string(),
        }));
    }
    dst.unarchive_sboms()?;

    Ok(pkg)
}

fn verify_signature(
    dst: &PackageLayout,
    public_key: Option<&Path>,
    insecure: bool,
) -> Result<()> {
    match verify_definition(dst, public_key) {
        Err(CoreError::SignedButNoKey) if insecure => {
            tracing::warn!("skipping signature validation of signed package (insecure)");
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}

fn unpack_components(pkg: &Package, dst: &mut PackageLayout) -> Result<()> {
    for component in &pkg.components {
        if dst.component_tar(&component.name).exists() {
            dst.unarchive_component(&component.name)?;
        }
    }
    Ok(())
}

fn archive_name(url: &str) -> &str {
    url.rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("package.tar.zst")
}
