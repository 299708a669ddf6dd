//! # Cache configuration
//!
//! The four tunables a [`cache-engine::Cache`] is opened with, plus
//! environment-variable loading with sensible defaults, in the same style
//! as the reference CLI's `env_or` helper.

use std::path::PathBuf;

/// Configuration for opening a cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory the cache owns on disk.
    pub dir: PathBuf,
    /// Application-level schema version. A mismatch against the journal's
    /// stored version is fatal at open.
    pub app_version: i64,
    /// Cache-format version. Same fatality rule as `app_version`.
    pub cache_version: i64,
    /// Maximum aggregate byte size of readable entries. Must be positive.
    pub max_size: u64,
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>, app_version: i64, cache_version: i64, max_size: u64) -> Self {
        Self {
            dir: dir.into(),
            app_version,
            cache_version,
            max_size,
        }
    }

    /// Reads configuration from environment variables, falling back to
    /// `default` for any variable that isn't set or doesn't parse.
    ///
    /// ```text
    /// DISK_CACHE_DIR            cache directory   (default: "cache")
    /// DISK_CACHE_APP_VERSION    app version        (default: 1)
    /// DISK_CACHE_CACHE_VERSION  cache version      (default: 1)
    /// DISK_CACHE_MAX_SIZE_BYTES max aggregate size (default: 10485760 = 10 MiB)
    /// ```
    pub fn from_env() -> Self {
        Self {
            dir: PathBuf::from(env_or("DISK_CACHE_DIR", "cache")),
            app_version: env_or("DISK_CACHE_APP_VERSION", "1").parse().unwrap_or(1),
            cache_version: env_or("DISK_CACHE_CACHE_VERSION", "1").parse().unwrap_or(1),
            max_size: env_or("DISK_CACHE_MAX_SIZE_BYTES", "10485760")
                .parse()
                .unwrap_or(10 * 1024 * 1024),
        }
    }
}

/// Reads a configuration value from the environment, falling back to
/// `default` if unset.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_all_fields() {
        let cfg = CacheConfig::new("/tmp/cache", 1, 2, 1024);
        assert_eq!(cfg.dir, PathBuf::from("/tmp/cache"));
        assert_eq!(cfg.app_version, 1);
        assert_eq!(cfg.cache_version, 2);
        assert_eq!(cfg.max_size, 1024);
    }

    #[test]
    fn from_env_defaults_when_unset() {
        std::env::remove_var("DISK_CACHE_DIR");
        std::env::remove_var("DISK_CACHE_APP_VERSION");
        std::env::remove_var("DISK_CACHE_CACHE_VERSION");
        std::env::remove_var("DISK_CACHE_MAX_SIZE_BYTES");
        let cfg = CacheConfig::from_env();
        assert_eq!(cfg.dir, PathBuf::from("cache"));
        assert_eq!(cfg.app_version, 1);
        assert_eq!(cfg.cache_version, 1);
        assert_eq!(cfg.max_size, 10 * 1024 * 1024);
    }
}
