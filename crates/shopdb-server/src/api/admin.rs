use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopdb_core::EntityKind;
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct StartIndexQuery {
    /// Restrict the run to one entity kind; all kinds when absent.
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct StartedIndexRun {
    index_run_id: Uuid,
    status: String,
    kinds: Vec<EntityKind>,
}

#[derive(Debug, Deserialize)]
pub(super) struct IndexRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct IndexRunItem {
    index_run_id: Uuid,
    trigger_source: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    records_processed: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

/// Queue a reindex and run it in the background.
pub(super) async fn start_index_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<StartIndexQuery>,
) -> Result<(StatusCode, Json<ApiResponse<StartedIndexRun>>), ApiError> {
    let kinds = match query.kind.as_deref() {
        Some(raw) => vec![raw
            .parse::<EntityKind>()
            .map_err(|msg| ApiError::new(req_id.0.clone(), "validation_error", msg))?],
        None => EntityKind::ALL.to_vec(),
    };

    let run = shopdb_db::create_index_run(&state.pool, "api")
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let pool = state.pool.clone();
    let indexer = Arc::clone(&state.indexer);
    let run_kinds = kinds.clone();
    tokio::spawn(async move {
        match shopdb_assistant::run_index(&pool, &indexer, run.id, &run_kinds).await {
            Ok(stats) => tracing::info!(
                run_id = run.id,
                indexed = stats.indexed,
                unchanged = stats.unchanged,
                deleted = stats.deleted,
                "api: index run complete"
            ),
            Err(e) => tracing::error!(run_id = run.id, error = %e, "api: index run failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: StartedIndexRun {
                index_run_id: run.public_id,
                status: run.status,
                kinds,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

pub(super) async fn list_index_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<IndexRunsQuery>,
) -> Result<Json<ApiResponse<Vec<IndexRunItem>>>, ApiError> {
    let rows = shopdb_db::list_index_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| IndexRunItem {
            index_run_id: row.public_id,
            trigger_source: row.trigger_source,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            records_processed: row.records_processed,
            error_message: row.error_message,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}
