//! Deploy command - reconcile a package against the cluster

use console::style;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;

use zarf_core::config::RuntimeOptions;
use zarf_core::layout::PackageLayout;
use zarf_core::scratch::Scratch;
use zarf_kube::{
    default_client, DeployOptions, Deployer, HelmCli, MemoryStore, SecretStore, StateStore,
};
use zarf_transport::{NoProgress, PackageSource, SourceContext};

use crate::error::Result;

pub async fn run(
    source: String,
    components: Vec<String>,
    set: IndexMap<String, String>,
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
    let pkg = src.load(&ctx, &mut layout, &components).await?;

    println!(
        "{} package {} ({} components)",
        style("Deploying").cyan().bold(),
        style(&pkg.metadata.name).bold(),
        pkg.components.len()
    );

    // YOLO packages reconcile without cluster-state prerequisites; the
    // record then lives only for the duration of the process.
    let (store, client): (Arc<dyn StateStore>, _) = if pkg.metadata.yolo {
        (Arc::new(MemoryStore::new()), None)
    } else {
        let client = default_client().await?;
        (Arc::new(SecretStore::new(client.clone())), Some(client))
    };

    let deploy_options = DeployOptions {
        components,
        set_variables: set,
        confirm: options.confirm,
        ..Default::default()
    };

    let mut deployer = Deployer::new(store, Arc::new(HelmCli::new()), deploy_options);
    if let Some(client) = client {
        deployer = deployer.with_client(client);
    }

    let result = deployer.deploy(&pkg, &layout).await?;

    for name in &result.deployed {
        println!("  {} {}", style("Deployed").green().bold(), name);
    }
    for name in &result.failed {
        println!("  {} {}", style("Failed").red().bold(), name);
    }
    println!(
        "{} generation {}",
        style("Recorded").green().bold(),
        result.generation
    );

    Ok(())
}
