pub mod audit_logs;
pub mod health;
pub mod params;
pub mod query_logs;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use logscope_store::{AuditEvent, LogService, PageCache, QueryLogEntry, StoreError};

use crate::config::{CacheConfig, LogscopeConfig};
use crate::error::ServerError;
use crate::store_factory::LogStores;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub audit: LogService<AuditEvent>,
    pub query: LogService<QueryLogEntry>,
    /// Page size for audit-log searches without `limit`/`take`.
    pub audit_default_limit: u32,
    /// Page size for query-log searches without `limit`/`take`.
    pub query_log_default_limit: u32,
    pub request_timeout: Duration,
}

impl AppState {
    /// State over `stores` with default limits, no cache and a 30 second
    /// request timeout.
    pub fn new(stores: LogStores) -> Self {
        Self::from_config(stores, &LogscopeConfig::default())
    }

    pub fn from_config(stores: LogStores, config: &LogscopeConfig) -> Self {
        let mut audit = LogService::new(stores.audit);
        let mut query = LogService::new(stores.query);
        if config.cache.enabled {
            audit = audit.with_cache(page_cache(&config.cache));
            query = query.with_cache(page_cache(&config.cache));
        }
        Self {
            audit,
            query,
            audit_default_limit: config.query.audit_default_limit,
            query_log_default_limit: config.query.query_log_default_limit,
            request_timeout: config.server.request_timeout(),
        }
    }

    /// Await a store call, failing with [`ServerError::Timeout`] once the
    /// request timeout elapses.
    pub async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ServerError> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| ServerError::Timeout(self.request_timeout))?
            .map_err(ServerError::from)
    }
}

fn page_cache<E: logscope_store::LogEntity>(config: &CacheConfig) -> Arc<PageCache<E>> {
    Arc::new(PageCache::new(config.max_capacity, config.ttl()))
}

/// Build the Axum router with all API routes and middleware.
pub fn router(state: AppState) -> Router {
    let audit_logs = Router::new()
        .route(
            "/v1/audit-logs",
            get(audit_logs::search).post(audit_logs::record),
        )
        .route("/v1/audit-logs/statistics", get(audit_logs::statistics))
        .route("/v1/audit-logs/bulk", post(audit_logs::bulk_insert))
        .route("/v1/audit-logs/archive", post(audit_logs::archive))
        .route("/v1/audit-logs/{id}", get(audit_logs::get_by_id));

    let query_logs = Router::new()
        .route(
            "/v1/query-logs",
            get(query_logs::search).post(query_logs::record),
        )
        .route("/v1/query-logs/statistics", get(query_logs::statistics))
        .route("/v1/query-logs/analysis", get(query_logs::analyze_patterns))
        .route("/v1/query-logs/bulk", post(query_logs::bulk_insert))
        .route("/v1/query-logs/archive", post(query_logs::archive))
        .route("/v1/query-logs/{id}", get(query_logs::get_by_id));

    Router::new()
        .route("/health", get(health::health))
        .merge(audit_logs)
        .merge(query_logs)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
