use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use roomly_db::StoreError;
use serde_json::json;
use tracing::{error, warn};

/// Maps the store-error taxonomy onto HTTP statuses. Conflict races never
/// reach this type: roomly-db resolves them into idempotent successes.
#[derive(Debug)]
pub struct ApiError(StoreError);

impl ApiError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self(StoreError::Internal(msg.into()))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StoreError::SelfAction | StoreError::SelfConversation | StoreError::EmptyContent => {
                StatusCode::BAD_REQUEST
            }
            StoreError::TargetNotFound(_) | StoreError::ConversationNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            StoreError::NotParticipant { .. } => {
                // Participant checks only fail for requests probing foreign
                // conversations; keep a trace of it.
                warn!("Forbidden request, possible tampering: {}", self.0);
                StatusCode::FORBIDDEN
            }
            StoreError::Db(_) | StoreError::Internal(_) => {
                error!("Storage failure: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.0.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
