//! Tarball and split-tarball sources

use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::Archive;

use zarf_core::archive::{extract_archive, is_zstd_archive, posix_path};
use zarf_core::layout::PackageLayout;

use crate::error::Result;

/// Extract the whole archive into the layout, recording the paths.
pub fn extract_all(archive: &Path, dst: &mut PackageLayout) -> Result<()> {
    let paths = extract_archive(archive, dst.base())?;
    dst.set_from_paths(&paths);
    Ok(())
}

/// Extract only the named members into the layout.
///
/// Missing members are not an error; the caller checks what arrived.
pub fn extract_paths(archive: &Path, dst: &mut PackageLayout, wanted: &[&str]) -> Result<()> {
    let file = File::open(archive)?;
    let extracted = if is_zstd_archive(archive) {
        let decoder = zstd::stream::read::Decoder::new(file)
            .map_err(|e| zarf_core::CoreError::Archive {
                message: format!("failed to start zstd decoder: {}", e),
            })?;
        extract_matching(&mut Archive::new(decoder), dst.base(), wanted)?
    } else {
        extract_matching(&mut Archive::new(file), dst.base(), wanted)?
    };
    dst.set_from_paths(&extracted);
    Ok(())
}

fn extract_matching<R: Read>(
    archive: &mut Archive<R>,
    base: &Path,
    wanted: &[&str],
) -> Result<Vec<String>> {
    let mut extracted = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let rel = posix_path(entry.path()?.as_ref());
        if wanted.iter().any(|w| *w == rel) {
            entry.unpack_in(base)?;
            extracted.push(rel);
        }
    }
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zarf_core::archive::archive_layout;

    fn build_archive(temp: &TempDir, name: &str) -> std::path::PathBuf {
        let mut src = PackageLayout::create(&temp.path().join("src")).unwrap();
        std::fs::write(src.definition_path(), "kind: ZarfPackageConfig\n").unwrap();
        std::fs::write(src.checksums_path(), "").unwrap();
        std::fs::create_dir_all(src.components_dir()).unwrap();
        std::fs::write(src.component_tar("app"), b"tar").unwrap();
        src.set_from_paths(&[
            "zarf.yaml".to_string(),
            "checksums.txt".to_string(),
            "components/app.tar".to_string(),
        ]);
        archive_layout(&src, &temp.path().join(name), 0).unwrap()
    }

    #[test]
    fn test_extract_all() {
        let temp = TempDir::new().unwrap();
        let archive = build_archive(&temp, "pkg.tar");

        let mut dst = PackageLayout::create(&temp.path().join("dst")).unwrap();
        extract_all(&archive, &mut dst).unwrap();

        assert!(dst.definition_path().exists());
        assert!(dst.component_tar("app").exists());
        assert!(dst.populated().any(|p| p == "components/app.tar"));
    }

    #[test]
    fn test_extract_selected_paths() {
        let temp = TempDir::new().unwrap();
        let archive = build_archive(&temp, "pkg.tar.zst");

        let mut dst = PackageLayout::create(&temp.path().join("dst")).unwrap();
        extract_paths(&archive, &mut dst, &["zarf.yaml", "checksums.txt", "nope.txt"])
            .unwrap();

        assert!(dst.definition_path().exists());
        assert!(dst.checksums_path().exists());
        assert!(!dst.component_tar("app").exists());
    }
}
