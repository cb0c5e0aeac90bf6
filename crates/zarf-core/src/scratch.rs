//! Scratch directories with guaranteed cleanup
//!
//! Every create or deploy runs inside one scratch root; temp files
//! produced inside it live exactly as long as the scratch. Cleanup runs
//! on both success and failure paths via `Drop`.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::Result;

/// A temporary working tree removed when dropped
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    /// Create a scratch root, honoring an explicit temp base when given.
    pub fn new(tmp_base: Option<&Path>) -> Result<Self> {
        let dir = match tmp_base {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                TempDir::with_prefix_in("zarf-", base)?
            }
            None => TempDir::with_prefix("zarf-")?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create and return a named subdirectory
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Reserve a file path inside the scratch without creating it
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
