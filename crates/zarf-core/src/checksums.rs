//! The `checksums.txt` integrity model
//!
//! One line per packaged file, `"<sha256>  <relative-path>"`, sorted by
//! path with LF endings. The file never lists itself or the signature.
//! The aggregate checksum is the SHA-256 of the rendered file and is
//! stamped into the definition's metadata after generation.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::layout::{self, PackageLayout};

/// Verification strictness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    /// Every listed file must be present and match; every present file
    /// must be listed.
    Full,
    /// Missing files are tolerated (partial pulls); present files must
    /// still match.
    Partial,
}

/// Parsed checksum entries, keyed by relative path
#[derive(Debug, Clone, Default)]
pub struct Checksums {
    entries: BTreeMap<String, String>,
}

impl Checksums {
    /// Hash every file in the layout except the checksum file itself and
    /// the signature.
    pub fn generate(pkg_layout: &PackageLayout) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (rel, abs) in pkg_layout.files()? {
            if rel == layout::CHECKSUMS || rel == layout::SIGNATURE {
                continue;
            }
            entries.insert(rel, sha256_file(&abs)?);
        }
        Ok(Self { entries })
    }

    /// Parse checksum file content. Duplicate paths are a hard error and
    /// CRLF endings are normalized.
    pub fn parse(content: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (sha, path) = line.split_once("  ").ok_or_else(|| CoreError::Archive {
                message: format!("malformed checksum line: {}", line),
            })?;
            if entries.insert(path.to_string(), sha.to_string()).is_some() {
                return Err(CoreError::DuplicateChecksumEntry {
                    path: path.to_string(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Load and parse `checksums.txt` from a layout
    pub fn load(pkg_layout: &PackageLayout) -> Result<Self> {
        let content = std::fs::read_to_string(pkg_layout.checksums_path())?;
        Self::parse(&content)
    }

    /// Render the canonical file content
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (path, sha) in &self.entries {
            out.push_str(sha);
            out.push_str("  ");
            out.push_str(path);
            out.push('\n');
        }
        out
    }

    /// Write `checksums.txt` into the layout
    pub fn write(&self, pkg_layout: &mut PackageLayout) -> Result<()> {
        std::fs::write(pkg_layout.checksums_path(), self.render())?;
        pkg_layout.set_from_paths(&[layout::CHECKSUMS.to_string()]);
        Ok(())
    }

    /// SHA-256 of the rendered file - the package's aggregate checksum
    pub fn aggregate(&self) -> String {
        sha256_hex(self.render().as_bytes())
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Verify a layout against its checksum file.
///
/// `expected_aggregate` comes from the loaded definition; when non-empty
/// it must equal the SHA-256 of `checksums.txt` as found on disk.
pub fn verify_layout(
    pkg_layout: &PackageLayout,
    expected_aggregate: &str,
    mode: VerifyMode,
) -> Result<()> {
    let raw = std::fs::read(pkg_layout.checksums_path())?;

    if !expected_aggregate.is_empty() {
        let actual = sha256_hex(&raw);
        if actual != expected_aggregate {
            return Err(CoreError::AggregateMismatch {
                expected: expected_aggregate.to_string(),
                actual,
            });
        }
    }

    let checksums = Checksums::parse(&String::from_utf8_lossy(&raw))?;
    let files = pkg_layout.files()?;

    for (rel, expected) in checksums.entries() {
        let Some(abs) = files.get(rel) else {
            if mode == VerifyMode::Partial {
                continue;
            }
            return Err(CoreError::MissingFile { path: rel.clone() });
        };

        // The definition is hashed with the aggregate cleared: that is the
        // byte content the creator hashed before stamping.
        let actual = if rel == layout::DEFINITION {
            let pkg = pkg_layout.read_definition()?;
            sha256_hex(pkg.to_yaml_unstamped()?.as_bytes())
        } else {
            sha256_file(abs)?
        };

        if &actual != expected {
            return Err(CoreError::ChecksumMismatch {
                path: rel.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }

    if mode == VerifyMode::Full {
        for rel in files.keys() {
            if rel == layout::CHECKSUMS || rel == layout::SIGNATURE {
                continue;
            }
            if !checksums.entries().contains_key(rel) {
                return Err(CoreError::UnlistedFile { path: rel.clone() });
            }
        }
    }

    Ok(())
}

/// Streaming SHA-256 of a file
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of a byte slice
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Package, PackageMetadata};
    use tempfile::TempDir;

    fn staged_layout(temp: &TempDir) -> (PackageLayout, Package) {
        let mut pkg_layout = PackageLayout::create(&temp.path().join("pkg")).unwrap();
        let pkg = Package {
            metadata: PackageMetadata {
                name: "p".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        pkg_layout.write_definition(&pkg).unwrap();
        std::fs::create_dir_all(pkg_layout.components_dir()).unwrap();
        std::fs::write(pkg_layout.component_tar("app"), b"tar bytes").unwrap();
        (pkg_layout, pkg)
    }

    #[test]
    fn test_generate_skips_checksums_and_signature() {
        let temp = TempDir::new().unwrap();
        let (mut pkg_layout, _) = staged_layout(&temp);
        std::fs::write(pkg_layout.checksums_path(), "stale").unwrap();
        std::fs::write(pkg_layout.signature_path(), "sig").unwrap();

        let checksums = Checksums::generate(&pkg_layout).unwrap();
        assert_eq!(checksums.len(), 2);
        assert!(checksums.entries().contains_key("zarf.yaml"));
        assert!(checksums.entries().contains_key("components/app.tar"));

        checksums.write(&mut pkg_layout).unwrap();
        assert!(pkg_layout.checksums_path().exists());
    }

    #[test]
    fn test_stamp_then_verify_full() {
        let temp = TempDir::new().unwrap();
        let (mut pkg_layout, mut pkg) = staged_layout(&temp);

        let checksums = Checksums::generate(&pkg_layout).unwrap();
        checksums.write(&mut pkg_layout).unwrap();

        pkg.metadata.aggregate_checksum = checksums.aggregate();
        pkg_layout.write_definition(&pkg).unwrap();

        verify_layout(&pkg_layout, &pkg.metadata.aggregate_checksum, VerifyMode::Full).unwrap();
    }

    #[test]
    fn test_tampered_file_detected() {
        let temp = TempDir::new().unwrap();
        let (mut pkg_layout, mut pkg) = staged_layout(&temp);

        let checksums = Checksums::generate(&pkg_layout).unwrap();
        checksums.write(&mut pkg_layout).unwrap();
        pkg.metadata.aggregate_checksum = checksums.aggregate();
        pkg_layout.write_definition(&pkg).unwrap();

        std::fs::write(pkg_layout.component_tar("app"), b"tampered").unwrap();
        let err =
            verify_layout(&pkg_layout, &pkg.metadata.aggregate_checksum, VerifyMode::Full)
                .unwrap_err();
        assert!(matches!(err, CoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_partial_tolerates_missing() {
        let temp = TempDir::new().unwrap();
        let (mut pkg_layout, mut pkg) = staged_layout(&temp);

        let checksums = Checksums::generate(&pkg_layout).unwrap();
        checksums.write(&mut pkg_layout).unwrap();
        pkg.metadata.aggregate_checksum = checksums.aggregate();
        pkg_layout.write_definition(&pkg).unwrap();

        std::fs::remove_file(pkg_layout.component_tar("app")).unwrap();
        verify_layout(&pkg_layout, &pkg.metadata.aggregate_checksum, VerifyMode::Partial)
            .unwrap();
        assert!(
            verify_layout(&pkg_layout, &pkg.metadata.aggregate_checksum, VerifyMode::Full)
                .is_err()
        );
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let content = "aaaa  components/app.tar\naaaa  components/app.tar\n";
        let err = Checksums::parse(content).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateChecksumEntry { .. }));
    }

    #[test]
    fn test_unlisted_file_detected() {
        let temp = TempDir::new().unwrap();
        let (mut pkg_layout, mut pkg) = staged_layout(&temp);

        let checksums = Checksums::generate(&pkg_layout).unwrap();
        checksums.write(&mut pkg_layout).unwrap();
        pkg.metadata.aggregate_checksum = checksums.aggregate();
        pkg_layout.write_definition(&pkg).unwrap();

        std::fs::write(pkg_layout.base().join("rogue.txt"), "x").unwrap();
        let err =
            verify_layout(&pkg_layout, &pkg.metadata.aggregate_checksum, VerifyMode::Full)
                .unwrap_err();
        assert!(matches!(err, CoreError::UnlistedFile { .. }));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
