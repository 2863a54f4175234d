use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use logscope_core::{PatternAnalysis, QueryLogStatistics};
use logscope_store::{
    AnnotatedQueryLog, ArchiveSummary, BulkInsertSummary, LogEntity, LogPage, NewQueryLogEntry,
    QueryLogEntry,
};

use super::AppState;
use super::params::{ArchiveRequest, QueryLogSearchParams, WindowParams};
use crate::error::ServerError;

/// `GET /v1/query-logs` -- search; every item carries its SQL operation and
/// slow-query flag.
pub async fn search(
    State(state): State<AppState>,
    params: Result<Query<QueryLogSearchParams>, QueryRejection>,
) -> Result<Json<LogPage<AnnotatedQueryLog>>, ServerError> {
    let Query(params) = params?;
    let spec = params.into_spec(state.query_log_default_limit)?;
    let page = state.timed(state.query.search_annotated(&spec)).await?;
    Ok(Json(page))
}

/// `GET /v1/query-logs/{id}`
pub async fn get_by_id(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<AnnotatedQueryLog>, ServerError> {
    let Path(id) = id?;
    let entry = state.timed(state.query.get(id)).await?;
    Ok(Json(entry.into()))
}

/// `POST /v1/query-logs`
pub async fn record(
    State(state): State<AppState>,
    body: Result<Json<NewQueryLogEntry>, JsonRejection>,
) -> Result<(StatusCode, Json<QueryLogEntry>), ServerError> {
    let Json(new) = body?;
    let entry = state.timed(state.query.record(new)).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `POST /v1/query-logs/bulk`
pub async fn bulk_insert(
    State(state): State<AppState>,
    body: Result<Json<Vec<NewQueryLogEntry>>, JsonRejection>,
) -> Result<Json<BulkInsertSummary>, ServerError> {
    let Json(records) = body?;
    tracing::info!(
        entity = QueryLogEntry::NAME,
        records = records.len(),
        "bulk insert requested"
    );
    // Not time-boxed: a load dropped between batches would leave committed
    // rows unreported.
    Ok(Json(state.query.bulk_insert(records).await?))
}

/// `GET /v1/query-logs/statistics?fromDate=&toDate=`
pub async fn statistics(
    State(state): State<AppState>,
    params: Result<Query<WindowParams>, QueryRejection>,
) -> Result<Json<QueryLogStatistics>, ServerError> {
    let Query(params) = params?;
    let window = params.into_window()?;
    Ok(Json(state.timed(state.query.statistics(window)).await?))
}

/// `GET /v1/query-logs/analysis?fromDate=&toDate=` -- statistics plus
/// ranked optimization findings.
pub async fn analyze_patterns(
    State(state): State<AppState>,
    params: Result<Query<WindowParams>, QueryRejection>,
) -> Result<Json<PatternAnalysis>, ServerError> {
    let Query(params) = params?;
    let window = params.into_window()?;
    Ok(Json(state.timed(state.query.analyze_patterns(window)).await?))
}

/// `POST /v1/query-logs/archive`
pub async fn archive(
    State(state): State<AppState>,
    body: Result<Json<ArchiveRequest>, JsonRejection>,
) -> Result<Json<ArchiveSummary>, ServerError> {
    let Json(request) = body?;
    Ok(Json(
        state
            .timed(state.query.archive_old_logs(request.older_than_days))
            .await?,
    ))
}
