//! Split archives for size-limited transport
//!
//! `<archive>.part000` holds a small JSON header describing the data
//! parts; `.part001` onwards are raw byte slices of the original archive.
//! Joining concatenates the data parts in lexical order and checks the
//! SHA-256 recorded in the header.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::checksums::sha256_file;
use crate::error::{CoreError, Result};

/// Header written as `.part000` (serialized without a trailing newline)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitHeader {
    /// Number of data parts (the header itself is not counted)
    pub count: usize,
    /// SHA-256 of the original archive
    pub sha256: String,
    /// Size of the original archive in bytes
    pub size: u64,
}

/// Split an archive into `.partNNN` files of at most `max_size` bytes.
///
/// The source archive is removed on success. Returns the part paths in
/// order, header first.
pub fn split_archive(src: &Path, max_size: u64) -> Result<Vec<PathBuf>> {
    if max_size == 0 {
        return Err(CoreError::Split {
            message: "max part size must be greater than zero".to_string(),
        });
    }

    let sha256 = sha256_file(src)?;
    let size = std::fs::metadata(src)?.len();

    let mut reader = File::open(src)?;
    let mut parts = Vec::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    let mut index = 1usize;

    loop {
        let part_path = part_path(src, index);
        let mut written = 0u64;
        let mut out = File::create(&part_path)?;

        while written < max_size {
            let want = (max_size - written).min(buffer.len() as u64) as usize;
            let n = reader.read(&mut buffer[..want])?;
            if n == 0 {
                break;
            }
            out.write_all(&buffer[..n])?;
            written += n as u64;
        }

        if written == 0 {
            // Nothing left; drop the empty trailing part.
            drop(out);
            std::fs::remove_file(&part_path)?;
            break;
        }

        parts.push(part_path);
        index += 1;
    }

    let header = SplitHeader {
        count: parts.len(),
        sha256,
        size,
    };
    let header_path = part_path(src, 0);
    std::fs::write(&header_path, serde_json::to_string(&header)?)?;
    parts.insert(0, header_path);

    std::fs::remove_file(src)?;
    Ok(parts)
}

/// Reassemble a split archive from its `.part000` header file.
///
/// Parts are removed after a successful join. Returns the path of the
/// reassembled archive.
pub fn join_parts(part000: &Path) -> Result<PathBuf> {
    let name = part000.to_string_lossy();
    if !name.ends_with(".part000") {
        return Err(CoreError::Split {
            message: format!("{} is not a split package header", name),
        });
    }
    let dest = PathBuf::from(name.trim_end_matches(".part000"));

    let header: SplitHeader = serde_json::from_slice(&std::fs::read(part000)?)?;

    let mut part_files = sibling_parts(part000)?;
    part_files.sort();

    // part000 plus the data parts
    if part_files.len() != header.count + 1 {
        return Err(CoreError::Split {
            message: format!(
                "package is missing parts, expected {}, found {}",
                header.count,
                part_files.len().saturating_sub(1)
            ),
        });
    }

    let mut out = File::create(&dest)?;
    for part in part_files.iter().skip(1) {
        let mut f = File::open(part)?;
        std::io::copy(&mut f, &mut out)?;
    }
    out.sync_all()?;
    drop(out);

    let actual = sha256_file(&dest)?;
    if actual != header.sha256 {
        return Err(CoreError::ChecksumMismatch {
            path: dest.to_string_lossy().to_string(),
            expected: header.sha256,
            actual,
        });
    }

    for part in part_files {
        let _ = std::fs::remove_file(part);
    }

    Ok(dest)
}

fn part_path(src: &Path, index: usize) -> PathBuf {
    PathBuf::from(format!("{}.part{:03}", src.to_string_lossy(), index))
}

fn sibling_parts(part000: &Path) -> Result<Vec<PathBuf>> {
    let name = part000.to_string_lossy();
    let prefix = name.trim_end_matches("000").to_string();
    let dir = part000.parent().unwrap_or_else(|| Path::new("."));

    let mut parts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().to_string_lossy().starts_with(&prefix) {
            parts.push(entry.path());
        }
    }
    Ok(parts)
}
