use std::sync::Arc;

use logscope_store::{AuditEvent, LogStore, QueryLogEntry};
use logscope_store_memory::MemoryLogStore;
#[cfg(feature = "postgres")]
use logscope_store_postgres::{PostgresLogConfig, PostgresLogStore};

use crate::config::StoreConfig;
use crate::error::ServerError;

/// One store per log entity, sharing the configured backend.
pub struct LogStores {
    pub audit: Arc<dyn LogStore<AuditEvent>>,
    pub query: Arc<dyn LogStore<QueryLogEntry>>,
}

/// Create both log stores from the given configuration.
///
/// The `postgres` backend connects once, runs migrations and shares the
/// pool between the two stores.
#[allow(clippy::unused_async)]
pub async fn create_stores(config: &StoreConfig) -> Result<LogStores, ServerError> {
    let stores = match config.backend.as_str() {
        "memory" => LogStores {
            audit: Arc::new(MemoryLogStore::<AuditEvent>::new()),
            query: Arc::new(MemoryLogStore::<QueryLogEntry>::new()),
        },
        #[cfg(feature = "postgres")]
        "postgres" => {
            let url = config.url.as_deref().ok_or_else(|| {
                ServerError::Config("postgres backend requires [store] url".into())
            })?;

            let pg_config = PostgresLogConfig::new(url)
                .with_prefix(&config.prefix)
                .with_max_connections(config.max_connections);

            let pool = logscope_store_postgres::connect(&pg_config)
                .await
                .map_err(|e| ServerError::Config(format!("store postgres: {e}")))?;

            LogStores {
                audit: Arc::new(PostgresLogStore::<AuditEvent>::from_pool(
                    pool.clone(),
                    &config.prefix,
                )),
                query: Arc::new(PostgresLogStore::<QueryLogEntry>::from_pool(
                    pool,
                    &config.prefix,
                )),
            }
        }
        other => {
            return Err(ServerError::Config(format!(
                "unknown store backend: {other} (is the feature enabled?)"
            )));
        }
    };

    tracing::info!(backend = %config.backend, "log stores created");
    Ok(stores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_starts_empty() {
        let stores = create_stores(&StoreConfig::default()).await.unwrap();
        assert_eq!(stores.audit.count(&[]).await.unwrap(), 0);
        assert_eq!(stores.query.count(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_backend_is_a_config_error() {
        let config = StoreConfig {
            backend: "clickhouse".into(),
            ..StoreConfig::default()
        };
        let Err(err) = create_stores(&config).await else {
            panic!("expected an error");
        };
        assert!(matches!(err, ServerError::Config(msg) if msg.contains("clickhouse")));
    }
}
