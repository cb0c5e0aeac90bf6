//! File staging for components
//!
//! Files are staged under `files/<index>/<name>` inside the component's
//! scratch directory. Remote sources download with an optional SHA-256
//! pin; local sources copy relative to the package base. Exec bits are
//! applied at stage time, symlinks at deploy time.

use std::path::{Path, PathBuf};

use zarf_core::checksums::sha256_file;
use zarf_core::component::ComponentFile;
use zarf_transport::http::fetch_to;

use crate::error::{BuildError, Result};

/// Stage one declared file, returning the staged path.
pub async fn stage_file(
    file: &ComponentFile,
    base_dir: &Path,
    component_dir: &Path,
    index: usize,
) -> Result<PathBuf> {
    let name = Path::new(&file.target)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("file-{}", index));
    let dest_dir = component_dir.join("files").join(index.to_string());
    std::fs::create_dir_all(&dest_dir)?;
    let dest = dest_dir.join(&name);

    if file.source.starts_with("http://") || file.source.starts_with("https://") {
        fetch_to(&file.source, &dest, file.shasum.as_deref()).await?;
    } else {
        let src = base_dir.join(&file.source);
        std::fs::copy(&src, &dest).map_err(|e| BuildError::File {
            path: file.source.clone(),
            message: e.to_string(),
        })?;
        if let Some(expected) = &file.shasum {
            let actual = sha256_file(&dest)?;
            if &actual != expected {
                return Err(BuildError::Core(
                    zarf_core::CoreError::ChecksumMismatch {
                        path: file.source.clone(),
                        expected: expected.clone(),
                        actual,
                    },
                ));
            }
        }
    }

    if file.executable {
        set_executable(&dest)?;
    }

    Ok(dest)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zarf_core::checksums::sha256_hex;

    #[tokio::test]
    async fn test_stage_local_file_with_shasum() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("pkg");
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(base.join("run.sh"), "#!/bin/sh\necho hi\n").unwrap();

        let file = ComponentFile {
            source: "run.sh".to_string(),
            target: "/usr/local/bin/run.sh".to_string(),
            shasum: Some(sha256_hex(b"#!/bin/sh\necho hi\n")),
            executable: true,
            ..Default::default()
        };

        let component_dir = temp.path().join("component");
        let staged = stage_file(&file, &base, &component_dir, 0).await.unwrap();
        assert!(staged.ends_with("files/0/run.sh"));
        assert!(staged.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&staged).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[tokio::test]
    async fn test_bad_shasum_rejected() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("pkg");
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(base.join("data.txt"), "content").unwrap();

        let file = ComponentFile {
            source: "data.txt".to_string(),
            target: "/opt/data.txt".to_string(),
            shasum: Some("0".repeat(64)),
            ..Default::default()
        };

        let err = stage_file(&file, &base, &temp.path().join("c"), 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Core(zarf_core::CoreError::ChecksumMismatch { .. })
        ));
    }
}
