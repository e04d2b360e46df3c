use api_client::ApiError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use configuration::ConfigError;
use database::DbError;
use engine::EngineError;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Client setup error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown action '{0}'")]
    UnknownAction(String),
}

impl AppError {
    /// Same vocabulary as `EngineError::kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Engine(e) => e.kind(),
            AppError::Database(DbError::NotFound(_)) => "not_found",
            AppError::Database(DbError::LeaseHeld { .. }) => "lease_held",
            AppError::Database(_) => "persistence_error",
            AppError::Config(_) | AppError::Api(_) => "config_error",
            AppError::InvalidRequest(_) | AppError::UnknownAction(_) => "validation_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" | "config_error" => StatusCode::BAD_REQUEST,
            "invalid_transition" | "lease_held" => StatusCode::CONFLICT,
            "market_data_error" | "provider_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The structured failure body shared by every transport.
    pub fn to_body(&self) -> Value {
        json!({
            "success": false,
            "error": self.to_string(),
            "error_kind": self.kind(),
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Command failed");
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "Command rejected");
        }
        (status, Json(self.to_body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_kind() {
        let not_found = AppError::Engine(EngineError::NotFound("c-1".into()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_body()["error_kind"], "not_found");
        assert_eq!(not_found.to_body()["success"], false);

        assert_eq!(AppError::UnknownAction("fly".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Database(DbError::Conflict("stale".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
