use std::time::Duration;

use serde::Deserialize;

/// Search result cache configuration.
///
/// # Example
///
/// ```toml
/// [cache]
/// enabled = true
/// ttl_seconds = 30
/// max_capacity = 5000
/// ```
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Whether search pages are cached. Writes through this process
    /// invalidate the cache; writes from other processes are only seen once
    /// entries expire.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    /// Maximum cached pages per entity.
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_seconds: default_cache_ttl(),
            max_capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    60
}

fn default_cache_capacity() -> u64 {
    1000
}
