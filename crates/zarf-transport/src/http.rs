//! HTTP(S) package downloads
//!
//! Remote archives are streamed to a temp file and then handled exactly
//! like a local tarball. An optional `@sha256:<hex>` suffix on the URL
//! pins the expected digest.

use futures::StreamExt;
use std::io::Write;
use std::path::Path;

use zarf_core::checksums::sha256_file;

use crate::error::{Result, TransportError};

/// Split an optional `@sha256:<hex>` pin off a source URL
pub fn parse_url_shasum(src: &str) -> (String, Option<String>) {
    match src.rsplit_once("@sha256:") {
        Some((url, sha)) if sha.len() == 64 && sha.chars().all(|c| c.is_ascii_hexdigit()) => {
            (url.to_string(), Some(sha.to_string()))
        }
        _ => (src.to_string(), None),
    }
}

/// Stream a URL to `dest`, verifying the digest when pinned.
pub async fn fetch_to(url: &str, dest: &Path, expected_sha: Option<&str>) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(600))
        .build()?;

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        tmp.write_all(&chunk?)?;
    }
    tmp.flush()?;

    if let Some(expected) = expected_sha {
        let actual = sha256_file(tmp.path())?;
        if actual != expected {
            return Err(TransportError::Core(
                zarf_core::CoreError::ChecksumMismatch {
                    path: url.to_string(),
                    expected: expected.to_string(),
                    actual,
                },
            ));
        }
    }

    tmp.persist(dest).map_err(|e| TransportError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_shasum() {
        let sha = "a".repeat(64);
        let (url, parsed) =
            parse_url_shasum(&format!("https://example.com/pkg.tar.zst@sha256:{}", sha));
        assert_eq!(url, "https://example.com/pkg.tar.zst");
        assert_eq!(parsed.as_deref(), Some(sha.as_str()));

        let (url, parsed) = parse_url_shasum("https://example.com/pkg.tar.zst");
        assert_eq!(url, "https://example.com/pkg.tar.zst");
        assert!(parsed.is_none());

        // malformed pins stay part of the URL
        let (url, parsed) = parse_url_shasum("https://example.com/pkg@sha256:short");
        assert_eq!(url, "https://example.com/pkg@sha256:short");
        assert!(parsed.is_none());
    }
}
