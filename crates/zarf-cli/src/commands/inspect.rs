//! Inspect command - show a package's composed definition

use console::style;
use std::path::PathBuf;

use zarf_core::config::RuntimeOptions;
use zarf_core::layout::PackageLayout;
use zarf_core::scratch::Scratch;
use zarf_transport::{NoProgress, PackageSource, SourceContext};

use crate::error::Result;

pub async fn run(
    source: String,
    want_sbom: bool,
    key: Option<PathBuf>,
    options: RuntimeOptions,
) -> Result<()> {
    let scratch = Scratch::new(options.tmp_dir.as_deref())?;
    let mut layout = PackageLayout::create(&scratch.subdir("package")?)?;

    let src = PackageSource::identify(&source)?;
    let ctx = SourceContext {
        options: &options,
        public_key: key.as_deref(),
        cluster: None,
        progress: &NoProgress,
    };
    // Signature validation downgrades to a warning only when the
    // operator explicitly allows it.
    let pkg = src
        .load_metadata(&ctx, &mut layout, want_sbom, options.insecure)
        .await?;

    println!("{}", serde_yaml::to_string(&pkg).map_err(|e| {
        crate::error::CliError::Other(e.to_string())
    })?);

    if want_sbom {
        if let Some(dir) = layout.unarchive_sboms()? {
            println!(
                "{} SBOMs extracted to {}",
                style("Note:").cyan().bold(),
                dir.display()
            );
        }
    }

    Ok(())
}
