//! Zarf Core - Package model and on-disk layout for the airgap package engine
//!
//! This crate provides the foundational types used throughout Zarf:
//! - `Package`: The package definition (`zarf.yaml`)
//! - `Component`: A logically grouped slice of a package applied atomically
//! - `PackageLayout`: The canonical unpacked directory tree
//! - `Checksums`: The `checksums.txt` integrity model
//! - Archive, split and signing primitives for package transport

pub mod archive;
pub mod checksums;
pub mod component;
pub mod config;
pub mod definition;
pub mod error;
pub mod layout;
pub mod scratch;
pub mod signing;
pub mod split;
pub mod variables;

pub use archive::{archive_layout, extract_archive, is_zstd_archive};
pub use checksums::{sha256_file, sha256_hex, verify_layout, Checksums, VerifyMode};
pub use component::{
    Action, ActionDefaults, ActionSet, ActionWait, ActionWaitCluster, ActionWaitNetwork,
    Chart, ChartVariable, Component, ComponentActions, ComponentFile, ComponentImport,
    ComponentOnly, DataInjection, DataInjectionTarget, HealthCheck, Manifest, OnlyCluster,
    Shell,
};
pub use config::{RuntimeOptions, DEFAULT_OCI_CONCURRENCY};
pub use definition::{BuildInfo, Package, PackageKind, PackageMetadata};
pub use error::{CoreError, Result};
pub use layout::PackageLayout;
pub use scratch::Scratch;
pub use signing::{generate_keypair, sign_definition, verify_definition};
pub use split::{join_parts, split_archive, SplitHeader};
pub use variables::{Constant, SetVariable, SetVariableMap, Variable, VariableType};
