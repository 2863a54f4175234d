use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use logscope_core::AuditStatistics;
use logscope_store::{
    ArchiveSummary, AuditEvent, BulkInsertSummary, LogEntity, LogPage, NewAuditEvent,
};

use super::AppState;
use super::params::{ArchiveRequest, AuditSearchParams, WindowParams};
use crate::error::ServerError;

/// `GET /v1/audit-logs` -- filtered, sorted, paginated search.
pub async fn search(
    State(state): State<AppState>,
    params: Result<Query<AuditSearchParams>, QueryRejection>,
) -> Result<Json<LogPage<AuditEvent>>, ServerError> {
    let Query(params) = params?;
    let spec = params.into_spec(state.audit_default_limit)?;
    let page = state.timed(state.audit.search(&spec)).await?;
    Ok(Json(page))
}

/// `GET /v1/audit-logs/{id}`
pub async fn get_by_id(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<AuditEvent>, ServerError> {
    let Path(id) = id?;
    Ok(Json(state.timed(state.audit.get(id)).await?))
}

/// `POST /v1/audit-logs` -- record a single event.
pub async fn record(
    State(state): State<AppState>,
    body: Result<Json<NewAuditEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<AuditEvent>), ServerError> {
    let Json(new) = body?;
    let event = state.timed(state.audit.record(new)).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// `POST /v1/audit-logs/bulk` -- insert many events, skipping known ids.
pub async fn bulk_insert(
    State(state): State<AppState>,
    body: Result<Json<Vec<NewAuditEvent>>, JsonRejection>,
) -> Result<Json<BulkInsertSummary>, ServerError> {
    let Json(records) = body?;
    tracing::info!(
        entity = AuditEvent::NAME,
        records = records.len(),
        "bulk insert requested"
    );
    // Not time-boxed: a load dropped between batches would leave committed
    // rows unreported.
    Ok(Json(state.audit.bulk_insert(records).await?))
}

/// `GET /v1/audit-logs/statistics?fromDate=&toDate=`
pub async fn statistics(
    State(state): State<AppState>,
    params: Result<Query<WindowParams>, QueryRejection>,
) -> Result<Json<AuditStatistics>, ServerError> {
    let Query(params) = params?;
    let window = params.into_window()?;
    Ok(Json(state.timed(state.audit.statistics(window)).await?))
}

/// `POST /v1/audit-logs/archive`
pub async fn archive(
    State(state): State<AppState>,
    body: Result<Json<ArchiveRequest>, JsonRejection>,
) -> Result<Json<ArchiveSummary>, ServerError> {
    let Json(request) = body?;
    Ok(Json(
        state
            .timed(state.audit.archive_old_logs(request.older_than_days))
            .await?,
    ))
}
