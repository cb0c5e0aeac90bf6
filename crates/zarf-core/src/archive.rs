//! Deterministic archive creation and extraction for packages
//!
//! Packages travel as a single tar, optionally zstd-compressed
//! (`.tar.zst`). Member ordering is fixed so that the same layout and
//! source-date-epoch always produce bit-identical archives.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, Header};

use crate::error::{CoreError, Result};
use crate::layout::{self, PackageLayout};

/// Fixed zstd level for reproducible compression
pub const COMPRESSION_LEVEL: i32 = 3;

/// Whether an archive path refers to a zstd-compressed tar
pub fn is_zstd_archive(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".tar.zst")
}

/// Archive a populated layout into a single tar or tar.zst.
///
/// Member order: definition, signature, checksums, component tars sorted
/// by name, `sboms.tar`, image metadata, then image blobs in digest order.
/// All mtimes are pinned to `epoch`.
pub fn archive_layout(pkg_layout: &PackageLayout, dest: &Path, epoch: i64) -> Result<PathBuf> {
    let ordered = ordered_members(pkg_layout)?;

    let file = File::create(dest)?;
    if is_zstd_archive(dest) {
        let encoder = zstd::stream::write::Encoder::new(file, COMPRESSION_LEVEL)
            .map_err(|e| CoreError::Archive {
                message: format!("failed to start zstd encoder: {}", e),
            })?;
        let mut builder = Builder::new(encoder);
        append_members(&mut builder, pkg_layout.base(), &ordered, epoch)?;
        let encoder = builder.into_inner()?;
        encoder.finish().map_err(|e| CoreError::Archive {
            message: format!("failed to finish zstd stream: {}", e),
        })?;
    } else {
        let mut builder = Builder::new(file);
        append_members(&mut builder, pkg_layout.base(), &ordered, epoch)?;
        builder.into_inner()?;
    }

    Ok(dest.to_path_buf())
}

/// Extract a package archive, returning the relative paths written.
pub fn extract_archive(src: &Path, dest: &Path) -> Result<Vec<String>> {
    let file = File::open(src)?;
    std::fs::create_dir_all(dest)?;

    if is_zstd_archive(src) {
        let decoder = zstd::stream::read::Decoder::new(file).map_err(|e| CoreError::Archive {
            message: format!("failed to start zstd decoder: {}", e),
        })?;
        unpack_entries(&mut Archive::new(decoder), dest)
    } else {
        unpack_entries(&mut Archive::new(file), dest)
    }
}

/// Create an uncompressed deterministic tar of a directory.
///
/// Every member is prefixed with `root_prefix/` so extraction recreates
/// the directory under its own name.
pub fn tar_dir(src_dir: &Path, dest_tar: &Path, root_prefix: &str, epoch: i64) -> Result<()> {
    let mut rels: Vec<String> = Vec::new();
    for entry in walkdir::WalkDir::new(src_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(src_dir)
                .map_err(|_| CoreError::Archive {
                    message: format!("path escapes archive root: {}", entry.path().display()),
                })?;
            rels.push(posix_path(rel));
        }
    }
    rels.sort();

    let file = File::create(dest_tar)?;
    let mut builder = Builder::new(file);
    for rel in &rels {
        let src = src_dir.join(rel);
        let member = format!("{}/{}", root_prefix, rel);
        append_file(&mut builder, &src, &member, epoch)?;
    }
    builder.into_inner()?;
    Ok(())
}

/// Extract an uncompressed tar into a directory, returning the paths written.
pub fn untar(src_tar: &Path, dest_dir: &Path) -> Result<Vec<String>> {
    let file = File::open(src_tar)?;
    std::fs::create_dir_all(dest_dir)?;
    unpack_entries(&mut Archive::new(file), dest_dir)
}

fn ordered_members(pkg_layout: &PackageLayout) -> Result<Vec<String>> {
    let files = pkg_layout.files()?;
    let mut ordered: Vec<String> = Vec::new();
    let mut push_if_present = |ordered: &mut Vec<String>, rel: &str| {
        if files.contains_key(rel) {
            ordered.push(rel.to_string());
        }
    };

    push_if_present(&mut ordered, layout::DEFINITION);
    push_if_present(&mut ordered, layout::SIGNATURE);
    push_if_present(&mut ordered, layout::CHECKSUMS);

    let mut components: Vec<&String> = files
        .keys()
        .filter(|p| p.starts_with("components/"))
        .collect();
    components.sort();
    ordered.extend(components.into_iter().cloned());

    push_if_present(&mut ordered, layout::SBOM_TAR);
    push_if_present(&mut ordered, layout::OCI_LAYOUT);
    push_if_present(&mut ordered, layout::IMAGE_INDEX);

    let mut blobs: Vec<&String> = files
        .keys()
        .filter(|p| p.starts_with("images/blobs/"))
        .collect();
    blobs.sort();
    ordered.extend(blobs.into_iter().cloned());

    // Anything else rides along at the end in sorted order.
    for rel in files.keys() {
        if !ordered.contains(rel) {
            ordered.push(rel.clone());
        }
    }

    Ok(ordered)
}

fn append_members<W: Write>(
    builder: &mut Builder<W>,
    base: &Path,
    members: &[String],
    epoch: i64,
) -> Result<()> {
    for rel in members {
        append_file(builder, &base.join(rel), rel, epoch)?;
    }
    Ok(())
}

fn append_file<W: Write>(
    builder: &mut Builder<W>,
    src: &Path,
    member: &str,
    epoch: i64,
) -> Result<()> {
    let content = std::fs::read(src)?;
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(file_mode(src));
    header.set_mtime(epoch.max(0) as u64);
    header.set_cksum();
    builder.append_data(&mut header, member, content.as_slice())?;
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) if meta.permissions().mode() & 0o111 != 0 => 0o755,
        _ => 0o644,
    }
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    0o644
}

fn unpack_entries<R: Read>(archive: &mut Archive<R>, dest: &Path) -> Result<Vec<String>> {
    let mut extracted = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let rel = posix_path(entry.path()?.as_ref());
        entry.unpack_in(dest)?;
        extracted.push(rel);
    }
    Ok(extracted)
}

/// Normalize a relative path to forward slashes
pub fn posix_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tar_dir_roundtrip() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("app");
        std::fs::create_dir_all(src.join("manifests")).unwrap();
        std::fs::write(src.join("manifests/hello.yaml"), "kind: ConfigMap\n").unwrap();

        let tar_path = temp.path().join("app.tar");
        tar_dir(&src, &tar_path, "app", 0).unwrap();

        let out = temp.path().join("out");
        let paths = untar(&tar_path, &out).unwrap();
        assert_eq!(paths, vec!["app/manifests/hello.yaml"]);
        assert_eq!(
            std::fs::read_to_string(out.join("app/manifests/hello.yaml")).unwrap(),
            "kind: ConfigMap\n"
        );
    }

    #[test]
    fn test_tar_dir_deterministic() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("c");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("b.txt"), "b").unwrap();
        std::fs::write(src.join("a.txt"), "a").unwrap();

        let first = temp.path().join("first.tar");
        let second = temp.path().join("second.tar");
        tar_dir(&src, &first, "c", 1700000000).unwrap();
        tar_dir(&src, &second, "c", 1700000000).unwrap();

        assert_eq!(
            std::fs::read(&first).unwrap(),
            std::fs::read(&second).unwrap()
        );
    }

    #[test]
    fn test_zstd_suffix_detection() {
        assert!(is_zstd_archive(Path::new("pkg.tar.zst")));
        assert!(!is_zstd_archive(Path::new("pkg.tar")));
        assert!(!is_zstd_archive(Path::new("pkg.zst")));
    }
}
