//! Remove command - tear down a deployed package

use console::style;
use std::sync::Arc;

use zarf_core::config::RuntimeOptions;
use zarf_core::layout::PackageLayout;
use zarf_core::scratch::Scratch;
use zarf_kube::{default_client, DeployOptions, Deployer, HelmCli, SecretStore};
use zarf_transport::{NoProgress, PackageSource, SourceContext};

use crate::error::Result;

pub async fn run(
    source: String,
    components: Vec<String>,
    options: RuntimeOptions,
) -> Result<()> {
    let scratch = Scratch::new(options.tmp_dir.as_deref())?;
    let src = PackageSource::identify(&source)?;

    // A local archive gives us staged component dirs for remove actions;
    // a bare name only needs the cluster record.
    let (name, layout) = match &src {
        PackageSource::Cluster { name } => (name.clone(), None),
        _ => {
            let mut layout = PackageLayout::create(&scratch.subdir("package")?)?;
            let ctx = SourceContext {
                options: &options,
                public_key: None,
                cluster: None,
                progress: &NoProgress,
            };
            let pkg = src.load(&ctx, &mut layout, &[]).await?;
            (pkg.metadata.name, Some(layout))
        }
    };

    println!(
        "{} package {}",
        style("Removing").cyan().bold(),
        style(&name).bold()
    );

    let client = default_client().await?;
    let store = Arc::new(SecretStore::new(client.clone()));
    let deployer = Deployer::new(store, Arc::new(HelmCli::new()), DeployOptions::default())
        .with_client(client);

    deployer.remove(&name, layout.as_ref(), &components).await?;
    println!("{} {}", style("Removed").green().bold(), name);

    Ok(())
}
