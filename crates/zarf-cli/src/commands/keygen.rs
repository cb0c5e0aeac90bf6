//! Keygen command - generate a signing keypair

use console::style;
use std::path::PathBuf;

use zarf_core::signing::generate_keypair;

use crate::error::Result;

pub fn run(output: PathBuf) -> Result<()> {
    let (sk, pk) = generate_keypair(&output, "zarf")?;

    println!("{} signing keypair", style("Generated").green().bold());
    println!("  {} {}", style("Secret key").dim(), sk.display());
    println!("  {} {}", style("Public key").dim(), pk.display());
    println!();
    println!("Keep the secret key offline; distribute the public key with your packages.");

    Ok(())
}
