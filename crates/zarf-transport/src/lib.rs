//! Zarf Transport - moving packages across boundaries
//!
//! Packages travel as local archives, split multi-part files, OCI
//! artifacts, or HTTP(S) downloads, and can be looked up from a cluster's
//! deployment records. Every variant materializes into the same
//! `PackageLayout` with integrity and signature verification.

pub mod cache;
pub mod error;
pub mod http;
pub mod oci;
pub mod progress;
pub mod retry;
pub mod source;
pub mod tarball;

pub use cache::ContentCache;
pub use error::{Result, TransportError};
pub use oci::{media_types, OciRemote, PACKAGE_ALWAYS_PULL};
pub use progress::{NoProgress, ProgressSink};
pub use retry::{with_retries, RetryConfig};
pub use source::{DeployedPackageLookup, PackageSource, SourceContext};
