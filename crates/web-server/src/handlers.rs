use crate::commands::{self, ensure_exists};
use crate::{AppState, error::AppError};
use agents::Credentials;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use database::{CompetitionSummary, DecisionFilter};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    #[serde(default)]
    pub agent_name: Option<String>,
}

/// # POST /api/command
/// The full command surface. The body is parsed here so that a malformed
/// request still gets the structured failure body.
pub async fn command(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<Value>, AppError> {
    let request = commands::parse_request(&body)?;
    let response = commands::execute(&state, request).await?;
    Ok(Json(response))
}

/// # GET /api/competitions
pub async fn list_competitions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CompetitionSummary>>, AppError> {
    let competitions = state.registry.services().store.list_competitions().await?;
    Ok(Json(competitions))
}

/// # GET /api/competitions/:competition_id
/// Served from the store so a read never connects agents.
pub async fn get_competition(
    Path(competition_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let store = &state.registry.services().store;
    let competition = store
        .load_competition(&competition_id)
        .await?
        .ok_or_else(|| engine::EngineError::NotFound(competition_id.clone()))?;
    let snapshots = store.latest_snapshots(&competition_id).await?;
    let leaderboard = engine::compute_leaderboard(&competition.config, &snapshots);
    Ok(Json(json!({
        "competition": competition,
        "latest_snapshots": snapshots,
        "leaderboard": leaderboard,
    })))
}

/// # GET /api/competitions/:competition_id/leaderboard
pub async fn get_leaderboard(
    Path(competition_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    let runtime = state
        .registry
        .get_or_restore(&competition_id, &Credentials::new())
        .await?;
    let runtime = runtime.lock().await;
    Ok(Json(json!({
        "competition_id": competition_id,
        "cycle_count": runtime.competition().cycle_count,
        "leaderboard": runtime.leaderboard(),
    })))
}

/// # GET /api/competitions/:competition_id/decisions
/// Optional `agent_name`, `cycle_number` and `limit` query parameters.
pub async fn get_decisions(
    Path(competition_id): Path<String>,
    Query(filter): Query<DecisionFilter>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    ensure_exists(&state, &competition_id).await?;
    let decisions = state
        .registry
        .services()
        .store
        .decisions(&competition_id, &filter)
        .await?;
    Ok(Json(json!({ "competition_id": competition_id, "decisions": decisions })))
}

/// # GET /api/competitions/:competition_id/snapshots
pub async fn get_snapshots(
    Path(competition_id): Path<String>,
    Query(query): Query<SnapshotQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, AppError> {
    ensure_exists(&state, &competition_id).await?;
    let snapshots = state
        .registry
        .services()
        .store
        .snapshots(&competition_id, query.agent_name.as_deref())
        .await?;
    Ok(Json(json!({ "competition_id": competition_id, "snapshots": snapshots })))
}

/// # GET /api/system
pub async fn system_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(commands::system_info(&state).await)
}
