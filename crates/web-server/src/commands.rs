//! The structured command surface shared by the stdio and HTTP transports.
//!
//! A request is `{action, params, credentials}`. A response is always a JSON
//! object with a `success` flag; failures carry `error` and `error_kind`.

use crate::AppState;
use crate::error::AppError;
use agents::Credentials;
use core_types::{CompetitionConfig, ProviderKind};
use database::DecisionFilter;
use engine::EngineError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

pub const ACTIONS: [&str; 11] = [
    "create_competition",
    "start_competition",
    "run_cycle",
    "stop_competition",
    "get_leaderboard",
    "get_decisions",
    "get_snapshots",
    "list_competitions",
    "get_competition",
    "delete_competition",
    "system_info",
];

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub action: String,
    #[serde(default)]
    pub params: Value,
    /// Keyed by agent name or provider name. Used for this request only.
    #[serde(default)]
    pub credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct CompetitionParams {
    competition_id: String,
}

#[derive(Debug, Deserialize)]
struct LeaderboardParams {
    competition_id: String,
    #[serde(default)]
    include_history: bool,
}

#[derive(Debug, Deserialize)]
struct DecisionParams {
    competition_id: String,
    #[serde(flatten)]
    filter: DecisionFilter,
}

#[derive(Debug, Deserialize)]
struct SnapshotParams {
    competition_id: String,
    #[serde(default)]
    agent_name: Option<String>,
}

pub fn parse_request(raw: &str) -> Result<CommandRequest, AppError> {
    serde_json::from_str(raw).map_err(|e| AppError::InvalidRequest(format!("malformed request: {}", e)))
}

/// Parses and executes one raw request. Never fails: errors become the
/// structured failure body.
pub async fn handle_raw(state: &AppState, raw: &str) -> Value {
    match parse_request(raw) {
        Ok(request) => dispatch(state, request).await,
        Err(e) => e.to_body(),
    }
}

pub async fn dispatch(state: &AppState, request: CommandRequest) -> Value {
    let action = request.action.clone();
    match execute(state, request).await {
        Ok(body) => body,
        Err(e) => {
            if e.status().is_server_error() {
                tracing::error!(action = %action, error = %e, kind = e.kind(), "Command failed");
            } else {
                tracing::debug!(action = %action, error = %e, kind = e.kind(), "Command rejected");
            }
            e.to_body()
        }
    }
}

/// Runs one command. Every action either fully succeeds or leaves no side effect.
pub async fn execute(state: &AppState, request: CommandRequest) -> Result<Value, AppError> {
    let CommandRequest { action, params, credentials } = request;
    tracing::debug!(action = %action, "Executing command");
    let registry = &state.registry;
    let store = &registry.services().store;

    let body = match action.as_str() {
        "create_competition" => {
            let config: CompetitionConfig = parse_params(params)?;
            let runtime = registry.create(config).await?;
            let runtime = runtime.lock().await;
            json!({
                "competition_id": runtime.id(),
                "status": runtime.status(),
                "competition": runtime.competition(),
            })
        }
        "start_competition" => {
            let CompetitionParams { competition_id } = parse_params(params)?;
            let runtime = registry.get_or_restore(&competition_id, &credentials).await?;
            let mut runtime = runtime.lock().await;
            runtime.start(&credentials).await?;
            json!({
                "competition_id": runtime.id(),
                "status": runtime.status(),
                "issues": runtime.issues(),
            })
        }
        "run_cycle" => {
            let CompetitionParams { competition_id } = parse_params(params)?;
            let runtime = registry.get_or_restore(&competition_id, &credentials).await?;
            let report = runtime.lock().await.run_cycle().await?;
            json!({ "cycle": report })
        }
        "stop_competition" => {
            let CompetitionParams { competition_id } = parse_params(params)?;
            let runtime = registry.get_or_restore(&competition_id, &credentials).await?;
            let mut runtime = runtime.lock().await;
            runtime.stop().await?;
            json!({
                "competition_id": runtime.id(),
                "status": runtime.status(),
                "cycle_count": runtime.competition().cycle_count,
            })
        }
        "get_leaderboard" => {
            let LeaderboardParams { competition_id, include_history } = parse_params(params)?;
            let runtime = registry.get_or_restore(&competition_id, &credentials).await?;
            let (cycle_count, leaderboard) = {
                let runtime = runtime.lock().await;
                (runtime.competition().cycle_count, runtime.leaderboard())
            };
            let mut body = json!({
                "competition_id": competition_id,
                "cycle_count": cycle_count,
                "leaderboard": leaderboard,
            });
            if include_history {
                body["history"] = json!(store.leaderboard_history(&competition_id).await?);
            }
            body
        }
        "get_decisions" => {
            let DecisionParams { competition_id, filter } = parse_params(params)?;
            ensure_exists(state, &competition_id).await?;
            let decisions = store.decisions(&competition_id, &filter).await?;
            json!({ "competition_id": competition_id, "decisions": decisions })
        }
        "get_snapshots" => {
            let SnapshotParams { competition_id, agent_name } = parse_params(params)?;
            ensure_exists(state, &competition_id).await?;
            let snapshots = store.snapshots(&competition_id, agent_name.as_deref()).await?;
            json!({ "competition_id": competition_id, "snapshots": snapshots })
        }
        "list_competitions" => {
            json!({ "competitions": store.list_competitions().await? })
        }
        "get_competition" => {
            let CompetitionParams { competition_id } = parse_params(params)?;
            let runtime = registry.get_or_restore(&competition_id, &credentials).await?;
            let runtime = runtime.lock().await;
            json!({
                "competition": runtime.competition(),
                "portfolios": runtime.portfolios(),
                "leaderboard": runtime.leaderboard(),
                "ready": runtime.is_ready(),
                "issues": runtime.issues(),
            })
        }
        "delete_competition" => {
            let CompetitionParams { competition_id } = parse_params(params)?;
            let deleted = registry.delete(&competition_id).await?;
            json!({ "competition_id": competition_id, "deleted": deleted })
        }
        "system_info" => system_info(state).await,
        other => return Err(AppError::UnknownAction(other.to_string())),
    };

    Ok(with_success(body))
}

pub async fn system_info(state: &AppState) -> Value {
    let providers: Vec<&str> = ProviderKind::ALL.iter().map(|p| p.as_str()).collect();
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "providers": providers,
        "actions": ACTIONS,
        "stores": {
            "primary": state.locations.primary,
            "mirror": state.locations.mirror,
            "mirror_enabled": state.registry.services().store.has_mirror(),
        },
        "registry_size": state.registry.len().await,
        "lease_holder": state.registry.holder(),
        "market_source": state.market_source,
    })
}

pub(crate) async fn ensure_exists(state: &AppState, competition_id: &str) -> Result<(), AppError> {
    let store = &state.registry.services().store;
    match store.load_competition(competition_id).await? {
        Some(_) => Ok(()),
        None => Err(EngineError::NotFound(competition_id.to_string()).into()),
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, AppError> {
    let params = match params {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| AppError::InvalidRequest(format!("invalid params: {}", e)))
}

fn with_success(body: Value) -> Value {
    let mut object = match body {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    object.insert("success".to_string(), Value::Bool(true));
    Value::Object(object)
}
