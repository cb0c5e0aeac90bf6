//! Zarf Build - the package creation pipeline
//!
//! Takes a declarative definition, composes imports, stages every
//! referenced artifact (repos, files, charts, images), and produces a
//! signed, checksummed, reproducible archive or OCI artifact.

pub mod charts;
pub mod creator;
pub mod differential;
pub mod error;
pub mod files;
pub mod images;
pub mod repos;

pub use charts::{ChartRenderer, LocalChartRenderer};
pub use creator::{archive_name, CreateOptions, CreateResult, Creator};
pub use differential::DifferentialData;
pub use error::{BuildError, Result};
pub use images::ImagePuller;
pub use repos::mirror_repo;
