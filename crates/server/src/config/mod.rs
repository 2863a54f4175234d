mod cache;
mod logging;
mod query;
mod server;
mod store;


pub use cache::*;
pub use logging::*;
pub use query::*;
pub use server::*;
pub use store::*;

use serde::Deserialize;

/// Top-level configuration for the logscope server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct LogscopeConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Log store backend configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Per-endpoint query defaults.
    #[serde(default)]
    pub query: QueryConfig,
    /// Search result cache.
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}
