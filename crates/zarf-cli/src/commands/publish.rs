//! Publish command - push a local archive to an OCI registry

use console::style;
use std::path::PathBuf;

use zarf_core::config::RuntimeOptions;
use zarf_core::layout::PackageLayout;
use zarf_core::scratch::Scratch;
use zarf_transport::{NoProgress, OciRemote, PackageSource, SourceContext};

use crate::error::{CliError, Result};

pub async fn run(source: PathBuf, reference: String, options: RuntimeOptions) -> Result<()> {
    let src = PackageSource::identify(&source.to_string_lossy())?;
    if !matches!(src, PackageSource::Tarball { .. } | PackageSource::Split { .. }) {
        return Err(CliError::Validation(format!(
            "'{}' is not a local package archive",
            source.display()
        )));
    }

    let scratch = Scratch::new(options.tmp_dir.as_deref())?;
    let mut layout = PackageLayout::create(&scratch.subdir("package")?)?;
    let ctx = SourceContext {
        options: &options,
        public_key: None,
        cluster: None,
        progress: &NoProgress,
    };
    // Collect keeps the layout exactly as shipped: component tars packed,
    // every layer ready to become an OCI blob.
    let pkg = src.collect(&ctx, &mut layout).await?;

    let version = pkg.metadata.version.as_deref().unwrap_or("latest");
    let arch = pkg.metadata.architecture.clone().unwrap_or_default();
    let full_reference = format!(
        "{}/{}:{}-{}",
        reference.trim_end_matches('/'),
        pkg.metadata.name,
        version,
        arch
    );

    println!(
        "{} {} -> {}",
        style("Publishing").cyan().bold(),
        source.display(),
        full_reference
    );

    let remote = OciRemote::new(&full_reference, options.insecure, options.oci_concurrency)?;
    let url = remote.push_package(&layout, &pkg, &NoProgress).await?;
    println!("  {} {}", style("Published").green().bold(), url);

    Ok(())
}
