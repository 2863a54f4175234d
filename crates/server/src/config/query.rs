use serde::Deserialize;

/// Page sizes applied when a search names neither `limit` nor `take`.
#[derive(Debug, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_audit_limit")]
    pub audit_default_limit: u32,
    #[serde(default = "default_query_log_limit")]
    pub query_log_default_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            audit_default_limit: default_audit_limit(),
            query_log_default_limit: default_query_log_limit(),
        }
    }
}

fn default_audit_limit() -> u32 {
    logscope_core::DEFAULT_LIMIT
}

fn default_query_log_limit() -> u32 {
    100
}
