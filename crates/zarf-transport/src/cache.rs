//! Content-addressed local cache
//!
//! Image blobs and repo mirrors are cached under digest-keyed paths.
//! Writers stage into a temp path and rename atomically; readers may
//! coincide without locking because a completed rename is the only way
//! content appears under its final path.

use std::path::{Path, PathBuf};

use zarf_core::checksums::sha256_hex;

use crate::error::Result;

/// Digest-keyed cache for blobs and repo mirrors
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root.join("blobs/sha256"))?;
        std::fs::create_dir_all(root.join("repos"))?;
        std::fs::create_dir_all(root.join("staging"))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path for a blob, keyed by its hex digest
    pub fn blob_path(&self, digest_hex: &str) -> PathBuf {
        self.root.join("blobs/sha256").join(digest_hex)
    }

    pub fn has_blob(&self, digest_hex: &str) -> bool {
        self.blob_path(digest_hex).exists()
    }

    /// Commit a staged file under its digest. First writer wins; a blob
    /// already in place makes this a no-op and the staged copy is dropped.
    pub fn commit_blob(&self, digest_hex: &str, staged: &Path) -> Result<PathBuf> {
        let dest = self.blob_path(digest_hex);
        if dest.exists() {
            let _ = std::fs::remove_file(staged);
            return Ok(dest);
        }
        std::fs::rename(staged, &dest)?;
        Ok(dest)
    }

    /// Allocate a unique staging path for an in-flight download
    pub fn stage_path(&self, hint: &str) -> PathBuf {
        let unique = format!("{}-{}", std::process::id(), hint.replace('/', "-"));
        self.root.join("staging").join(unique)
    }

    /// Stable directory for a git repo mirror, keyed by its url
    pub fn repo_dir(&self, url: &str) -> PathBuf {
        let name = url
            .rsplit('/')
            .next()
            .unwrap_or("repo")
            .trim_end_matches(".git");
        let key = &sha256_hex(url.as_bytes())[..12];
        self.root.join("repos").join(format!("{}-{}", name, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_commit_blob_atomic() {
        let temp = TempDir::new().unwrap();
        let cache = ContentCache::new(temp.path()).unwrap();

        let staged = cache.stage_path("layer-1");
        std::fs::write(&staged, b"blob bytes").unwrap();

        let dest = cache.commit_blob("abc123", &staged).unwrap();
        assert!(dest.exists());
        assert!(!staged.exists());
        assert!(cache.has_blob("abc123"));
    }

    #[test]
    fn test_first_writer_wins() {
        let temp = TempDir::new().unwrap();
        let cache = ContentCache::new(temp.path()).unwrap();

        let first = cache.stage_path("a");
        std::fs::write(&first, b"first").unwrap();
        cache.commit_blob("d1", &first).unwrap();

        let second = cache.stage_path("b");
        std::fs::write(&second, b"second").unwrap();
        cache.commit_blob("d1", &second).unwrap();

        assert_eq!(std::fs::read(cache.blob_path("d1")).unwrap(), b"first");
        assert!(!second.exists());
    }

    #[test]
    fn test_repo_dir_stable_and_distinct() {
        let temp = TempDir::new().unwrap();
        let cache = ContentCache::new(temp.path()).unwrap();

        let a = cache.repo_dir("https://github.com/org/app.git");
        let b = cache.repo_dir("https://github.com/org/app.git");
        let c = cache.repo_dir("https://github.com/other/app.git");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("app-"));
    }
}
