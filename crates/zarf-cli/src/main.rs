//! Zarf CLI - airgap software delivery for Kubernetes

use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;

use zarf_core::config::RuntimeOptions;

mod commands;
mod error;
mod exit_codes;

use error::CliError;

#[derive(Parser)]
#[command(name = "zarf")]
#[command(version)]
#[command(about = "Build, transport and deploy self-contained packages across airgaps", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Accept unverified TLS and skipped signature validation
    #[arg(long, global = true)]
    insecure: bool,

    /// Skip interactive prompts
    #[arg(long, global = true)]
    confirm: bool,

    /// Log output filter (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Disable terminal color
    #[arg(long, global = true)]
    no_color: bool,

    /// Cache for git clones and image blobs
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Scratch root for builds and deploys
    #[arg(long, global = true)]
    tmp_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a package from a definition directory
    Create {
        /// Directory containing zarf.yaml
        #[arg(default_value = ".")]
        base_dir: PathBuf,

        /// Output directory for the archive
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Target architecture (amd64, arm64)
        #[arg(short, long)]
        architecture: Option<String>,

        /// Build flavor
        #[arg(short, long)]
        flavor: Option<String>,

        /// Skip zstd compression
        #[arg(long)]
        uncompressed: bool,

        /// Split the archive into parts of at most this many megabytes
        #[arg(long)]
        max_size: Option<u64>,

        /// Sign the package with this minisign secret key
        #[arg(long)]
        signing_key: Option<PathBuf>,

        /// Base package for a differential build
        #[arg(long)]
        differential: Option<String>,

        /// Publish the finished package to an OCI repository base
        #[arg(long)]
        publish: Option<String>,

        /// Create-time template values (NAME=value)
        #[arg(long = "set")]
        set: Vec<String>,
    },

    /// Deploy a package to the connected cluster
    Deploy {
        /// Package source: tarball, .part000, oci://, https://, or name
        source: String,

        /// Optional components to include (comma separated or repeated)
        #[arg(long = "components", value_delimiter = ',')]
        components: Vec<String>,

        /// Deploy-time variable values (NAME=value)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Public key for signature validation
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,
    },

    /// Remove a deployed package from the cluster
    Remove {
        /// Package source or deployed package name
        source: String,

        /// Only remove these components
        #[arg(long = "components", value_delimiter = ',')]
        components: Vec<String>,
    },

    /// Pull a remote package to a local archive
    Pull {
        /// oci:// or https:// package reference
        source: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Public key for signature validation
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,
    },

    /// Publish a local package archive to an OCI registry
    Publish {
        /// Package archive path
        source: PathBuf,

        /// OCI repository base, e.g. oci://ghcr.io/org
        reference: String,
    },

    /// Show a package's composed definition
    Inspect {
        /// Package source
        source: String,

        /// Also extract the SBOM archive
        #[arg(long)]
        sbom: bool,

        /// Public key for signature validation
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,
    },

    /// Generate a minisign keypair for package signing
    Keygen {
        /// Output directory for zarf.key / zarf.pub
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn runtime_options(cli: &Cli) -> RuntimeOptions {
    let mut options = RuntimeOptions::from_env();
    if cli.insecure {
        options.insecure = true;
    }
    if cli.confirm {
        options.confirm = true;
    }
    if cli.no_color {
        options.no_color = true;
    }
    if let Some(level) = &cli.log_level {
        options.log_level = level.clone();
    }
    if let Some(dir) = &cli.cache_dir {
        options.cache_dir = dir.clone();
    }
    if let Some(dir) = &cli.tmp_dir {
        options.tmp_dir = Some(dir.clone());
    }
    options
}

fn init_logging(options: &RuntimeOptions) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(&options.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!options.no_color)
        .with_target(false)
        .init();
}

/// Parse repeated `NAME=value` flags
fn parse_set_pairs(pairs: &[String]) -> Result<indexmap::IndexMap<String, String>, CliError> {
    let mut map = indexmap::IndexMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::Validation(format!(
                "--set '{}' is not NAME=value",
                pair
            )));
        };
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    let options = runtime_options(&cli);
    init_logging(&options);

    let work = run(cli, options);
    let outcome = tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => Err(CliError::Cancelled),
    };

    match outcome {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{} {:?}", style("Error:").red().bold(), miette::Report::new(err));
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli, options: RuntimeOptions) -> Result<(), CliError> {
    match cli.command {
        Commands::Create {
            base_dir,
            output,
            architecture,
            flavor,
            uncompressed,
            max_size,
            signing_key,
            differential,
            publish,
            set,
        } => {
            commands::create::run(commands::create::CreateArgs {
                base_dir,
                output,
                architecture,
                flavor,
                uncompressed,
                max_size_mb: max_size,
                signing_key,
                differential,
                publish,
                set: parse_set_pairs(&set)?,
                options,
            })
            .await
        }
        Commands::Deploy {
            source,
            components,
            set,
            key,
        } => {
            commands::deploy::run(source, components, parse_set_pairs(&set)?, key, options).await
        }
        Commands::Remove { source, components } => {
            commands::remove::run(source, components, options).await
        }
        Commands::Pull {
            source,
            output,
            key,
        } => commands::pull::run(source, output, key, options).await,
        Commands::Publish { source, reference } => {
            commands::publish::run(source, reference, options).await
        }
        Commands::Inspect { source, sbom, key } => {
            commands::inspect::run(source, sbom, key, options).await
        }
        Commands::Keygen { output } => commands::keygen::run(output),
    }
}
