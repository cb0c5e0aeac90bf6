//! Create command - build a package from a definition

use console::style;
use indexmap::IndexMap;
use std::path::PathBuf;

use zarf_build::{CreateOptions, Creator};
use zarf_core::config::RuntimeOptions;

use crate::error::Result;

pub struct CreateArgs {
    pub base_dir: PathBuf,
    pub output: PathBuf,
    pub architecture: Option<String>,
    pub flavor: Option<String>,
    pub uncompressed: bool,
    pub max_size_mb: Option<u64>,
    pub signing_key: Option<PathBuf>,
    pub differential: Option<String>,
    pub publish: Option<String>,
    pub set: IndexMap<String, String>,
    pub options: RuntimeOptions,
}

pub async fn run(args: CreateArgs) -> Result<()> {
    let mut options = CreateOptions::new(&args.base_dir, &args.output);
    options.architecture = args.architecture;
    options.flavor = args.flavor;
    options.uncompressed = args.uncompressed;
    options.max_size = args.max_size_mb.map(|mb| mb * 1024 * 1024);
    options.signing_key = args.signing_key;
    options.differential_base = args.differential;
    options.publish_to = args.publish;
    options.create_set = args.set;
    options.runtime = args.options;

    println!(
        "{} package in {}",
        style("Creating").cyan().bold(),
        args.base_dir.display()
    );

    let result = Creator::new(options).create().await?;

    for warning in &result.warnings {
        println!("  {} {}", style("Warning:").yellow().bold(), warning);
    }
    for artifact in &result.artifacts {
        println!("  {} {}", style("Wrote").green().bold(), artifact.display());
    }
    if let Some(url) = &result.published {
        println!("  {} {}", style("Published").green().bold(), url);
    }

    Ok(())
}
