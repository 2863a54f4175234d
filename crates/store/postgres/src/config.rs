/// Configuration for the Postgres log store.
#[derive(Debug, Clone)]
pub struct PostgresLogConfig {
    /// Postgres connection URL.
    pub url: String,
    /// Table name prefix (e.g. "logscope_").
    pub prefix: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
}

impl PostgresLogConfig {
    /// Create a new configuration with the given URL and defaults.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prefix: "logscope_".to_owned(),
            max_connections: 10,
        }
    }

    /// Set the table prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the pool size.
    #[must_use]
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }
}
