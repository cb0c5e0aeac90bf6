//! Pull command - fetch a remote package into a local archive

use console::style;
use std::path::PathBuf;

use zarf_build::archive_name;
use zarf_core::archive::archive_layout;
use zarf_core::config::RuntimeOptions;
use zarf_core::layout::PackageLayout;
use zarf_core::scratch::Scratch;
use zarf_transport::{NoProgress, PackageSource, SourceContext};

use crate::error::{CliError, Result};

pub async fn run(
    source: String,
    output: PathBuf,
    key: Option<PathBuf>,
    options: RuntimeOptions,
) -> Result<()> {
    let src = PackageSource::identify(&source)?;
    if matches!(src, PackageSource::Cluster { .. }) {
        return Err(CliError::Validation(format!(
            "'{}' is not a pullable source",
            source
        )));
    }

    println!("{} {}", style("Pulling").cyan().bold(), source);

    let scratch = Scratch::new(options.tmp_dir.as_deref())?;
    let mut layout = PackageLayout::create(&scratch.subdir("package")?)?;
    let ctx = SourceContext {
        options: &options,
        public_key: key.as_deref(),
        cluster: None,
        progress: &NoProgress,
    };
    // Collect leaves component tars packed so the shipped checksums
    // stay valid in the re-written archive.
    let pkg = src.collect(&ctx, &mut layout).await?;

    let epoch = pkg.metadata.source_date_epoch.unwrap_or(0);
    let arch = pkg.metadata.architecture.clone().unwrap_or_default();
    std::fs::create_dir_all(&output)?;
    let dest = output.join(archive_name(&pkg, &arch, false));
    archive_layout(&layout, &dest, epoch)?;

    println!("  {} {}", style("Wrote").green().bold(), dest.display());
    Ok(())
}
