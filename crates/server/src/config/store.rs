use serde::Deserialize;

/// Configuration for the log store backend.
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    /// Which backend to use: `"memory"` or `"postgres"`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// Connection URL (used by `postgres`).
    pub url: Option<String>,
    /// Table prefix for the backend.
    #[serde(default = "default_store_prefix")]
    pub prefix: String,
    /// Pool size for the `postgres` backend.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            url: None,
            prefix: default_store_prefix(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_store_backend() -> String {
    "memory".to_owned()
}

fn default_store_prefix() -> String {
    "logscope_".to_owned()
}

fn default_max_connections() -> u32 {
    10
}
