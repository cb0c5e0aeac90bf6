//! Bare git mirrors for packaged repositories
//!
//! Each repo reference is cloned as a bare mirror pinned to its `@ref`
//! suffix: a tag, branch, full commit hash, or explicit `refs/...`
//! refspec. Without a ref the whole repository is mirrored.

use git2::{AutotagOption, FetchOptions, Repository};
use std::path::{Path, PathBuf};

use zarf_core::checksums::sha256_hex;
use zarf_core::component::Component;

use crate::error::{BuildError, Result};

/// Mirror `url[@ref]` into `dest_dir/<name>-<key>.git`, returning the
/// mirror path.
pub fn mirror_repo(repo_ref: &str, dest_dir: &Path) -> Result<PathBuf> {
    let (url, git_ref) = Component::parse_repo_ref(repo_ref);
    let mirror = dest_dir.join(mirror_dir_name(&url));
    std::fs::create_dir_all(dest_dir)?;

    let repo = Repository::init_bare(&mirror).map_err(|e| BuildError::Git {
        url: url.clone(),
        message: e.to_string(),
    })?;

    let mut remote = repo
        .remote_anonymous(&url)
        .map_err(|e| BuildError::Git {
            url: url.clone(),
            message: e.to_string(),
        })?;

    // A short ref can name a tag or a branch; try each candidate refspec
    // and keep the first that the remote can serve.
    let refspecs = refspecs_for(git_ref.as_deref());
    let mut fetched = false;
    let mut last_error = None;
    for refspec in &refspecs {
        let mut options = FetchOptions::new();
        options.download_tags(AutotagOption::All);
        match remote.fetch(&[refspec.as_str()], Some(&mut options), None) {
            Ok(()) => {
                fetched = true;
                break;
            }
            Err(e) => last_error = Some(e),
        }
    }
    if !fetched {
        return Err(match git_ref.as_deref() {
            Some(reference) => BuildError::RefNotFound {
                url: url.clone(),
                reference: reference.to_string(),
            },
            None => BuildError::Git {
                url: url.clone(),
                message: last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "fetch failed".to_string()),
            },
        });
    }

    tracing::debug!(url = %url, mirror = %mirror.display(), "mirrored repository");
    Ok(mirror)
}

/// Stable directory name for a mirror: repo basename plus a short key of
/// the full url, so distinct forks never collide.
pub fn mirror_dir_name(url: &str) -> String {
    let name = url
        .rsplit('/')
        .next()
        .unwrap_or("repo")
        .trim_end_matches(".git");
    let key = &sha256_hex(url.as_bytes())[..10];
    format!("{}-{}.git", name, key)
}

/// Whether a ref looks like a full commit hash
pub fn is_hash(reference: &str) -> bool {
    reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit())
}

fn refspecs_for(git_ref: Option<&str>) -> Vec<String> {
    match git_ref {
        // Mirror everything when unpinned.
        None => vec!["+refs/*:refs/*".to_string()],
        Some(r) if r.starts_with("refs/") => vec![format!("{}:{}", r, r)],
        Some(r) if is_hash(r) => vec![format!("{}:refs/heads/zarf-pinned", r)],
        // A short ref may be a tag or a branch; fetch whichever exists.
        Some(r) => vec![
            format!("+refs/tags/{0}:refs/tags/{0}", r),
            format!("+refs/heads/{0}:refs/heads/{0}", r),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_dir_name_stable() {
        let a = mirror_dir_name("https://github.com/org/app.git");
        let b = mirror_dir_name("https://github.com/org/app.git");
        let c = mirror_dir_name("https://github.com/fork/app.git");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("app-"));
        assert!(a.ends_with(".git"));
    }

    #[test]
    fn test_is_hash() {
        assert!(is_hash("0123456789abcdef0123456789abcdef01234567"));
        assert!(!is_hash("v1.2.3"));
        assert!(!is_hash("0123456789abcdef"));
    }

    #[test]
    fn test_refspecs() {
        assert_eq!(refspecs_for(None), vec!["+refs/*:refs/*"]);
        assert_eq!(
            refspecs_for(Some("refs/heads/main")),
            vec!["refs/heads/main:refs/heads/main"]
        );
        assert_eq!(
            refspecs_for(Some("v1.0.0")),
            vec![
                "+refs/tags/v1.0.0:refs/tags/v1.0.0",
                "+refs/heads/v1.0.0:refs/heads/v1.0.0"
            ]
        );
        let hash = "0123456789abcdef0123456789abcdef01234567";
        assert_eq!(
            refspecs_for(Some(hash)),
            vec![format!("{}:refs/heads/zarf-pinned", hash)]
        );
    }

    #[test]
    fn test_local_repo_mirror_roundtrip() {
        let temp = tempfile::TempDir::new().unwrap();

        // Build a tiny source repository with one commit.
        let src = temp.path().join("src");
        let repo = Repository::init(&src).unwrap();
        std::fs::write(src.join("README.md"), "hello\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();

        let url = format!("file://{}", src.display());
        let mirror = mirror_repo(&url, &temp.path().join("mirrors")).unwrap();

        let mirrored = Repository::open_bare(&mirror).unwrap();
        assert!(mirrored.is_bare());
        assert!(mirrored.revparse_single("refs/heads/master").is_ok()
            || mirrored.revparse_single("refs/heads/main").is_ok());
    }
}
