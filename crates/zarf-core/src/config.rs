//! Runtime options shared across the engine
//!
//! Options come from the environment (`ZARF_*` variables) with a serde
//! form for config files. Library crates take these by reference; only
//! the CLI constructs them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default layer fan-out parallelism for OCI transfers
pub const DEFAULT_OCI_CONCURRENCY: usize = 3;

/// Default budget for a full package deploy
pub const DEPLOY_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Default budget for a single health check
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default budget for a webhook wait
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Default budget for a single action
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Options recognized across create, pull and deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeOptions {
    /// Cache for git clones and image blobs
    pub cache_dir: PathBuf,

    /// Scratch root for builds and deploys; system temp when unset
    pub tmp_dir: Option<PathBuf>,

    /// Layer fan-out parallelism
    pub oci_concurrency: usize,

    /// Accept unverified TLS and skipped signature validation
    pub insecure: bool,

    /// Skip interactive prompts
    pub confirm: bool,

    /// Log output filter
    pub log_level: String,

    /// Disable terminal color
    pub no_color: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            tmp_dir: None,
            oci_concurrency: DEFAULT_OCI_CONCURRENCY,
            insecure: false,
            confirm: false,
            log_level: "info".to_string(),
            no_color: false,
        }
    }
}

impl RuntimeOptions {
    /// Read options from `ZARF_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut opts = Self::default();

        if let Ok(dir) = std::env::var("ZARF_CACHE_DIR") {
            opts.cache_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("ZARF_TMP_DIR") {
            opts.tmp_dir = Some(PathBuf::from(dir));
        }
        if let Ok(n) = std::env::var("ZARF_OCI_CONCURRENCY") {
            if let Ok(n) = n.parse::<usize>() {
                opts.oci_concurrency = n.max(1);
            }
        }
        if let Ok(v) = std::env::var("ZARF_INSECURE") {
            opts.insecure = is_truthy(&v);
        }
        if let Ok(v) = std::env::var("ZARF_CONFIRM") {
            opts.confirm = is_truthy(&v);
        }
        if let Ok(v) = std::env::var("ZARF_LOG_LEVEL") {
            opts.log_level = v;
        }
        if let Ok(v) = std::env::var("ZARF_NO_COLOR") {
            opts.no_color = is_truthy(&v);
        }

        opts
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn default_cache_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".zarf-cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = RuntimeOptions::default();
        assert_eq!(opts.oci_concurrency, DEFAULT_OCI_CONCURRENCY);
        assert!(!opts.insecure);
        assert_eq!(opts.log_level, "info");
    }

    #[test]
    fn test_truthy() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("yes"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("nope"));
    }

    #[test]
    fn test_serde_form() {
        let yaml = "cacheDir: /var/cache/zarf\nociConcurrency: 6\ninsecure: true\n";
        let opts: RuntimeOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(opts.cache_dir, PathBuf::from("/var/cache/zarf"));
        assert_eq!(opts.oci_concurrency, 6);
        assert!(opts.insecure);
        // unset fields keep defaults
        assert!(!opts.confirm);
    }
}
