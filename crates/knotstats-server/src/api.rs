use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use knotstats_common::{Selection, StatsSnapshot};
use serde_json::{Value, json};
use tracing::debug;

use crate::AppState;
use crate::errors::RelayError;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/stats/aggregate", get(get_aggregate_stats))
        .route("/stats/instances/{id}", get(get_instance_stats))
        .route("/instances", get(get_instances))
        .route("/heartbeat", get(heartbeat))
}

/// Relay the upstream body byte-for-byte.
pub async fn get_stats(State(state): State<AppState>) -> Result<Response, RelayError> {
    let fetched = state.upstream.fetch().await?;
    debug!(shape = ?fetched.snapshot.shape(), "Relaying stats");
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        fetched.body,
    )
        .into_response())
}

/// Cross-instance totals for grouped snapshots; flat snapshots as fetched.
pub async fn get_aggregate_stats(State(state): State<AppState>) -> Result<Response, RelayError> {
    let fetched = state.upstream.fetch().await?;
    let view = fetched.snapshot.view(&Selection::All);
    Ok(Json(Value::Object(view)).into_response())
}

pub async fn get_instance_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, RelayError> {
    let fetched = state.upstream.fetch().await?;
    match fetched.snapshot.instance(&id) {
        Some(stats) => Ok(Json(Value::Object(stats.clone())).into_response()),
        None => Err(RelayError::InstanceNotFound(id)),
    }
}

pub async fn get_instances(State(state): State<AppState>) -> Result<Response, RelayError> {
    let fetched = state.upstream.fetch().await?;
    Ok(Json(instances_body(&fetched.snapshot)).into_response())
}

fn instances_body(snapshot: &StatsSnapshot) -> Value {
    json!({
        "shape": snapshot.shape(),
        "instances": snapshot.instance_ids(),
    })
}

/// Liveness of the relay itself; does not touch the upstream.
pub async fn heartbeat(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "upstream": state.upstream.url().as_str(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests;
