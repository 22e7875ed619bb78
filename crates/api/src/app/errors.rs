use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use thiserror::Error;

use courier_broker::BrokerError;
use courier_core::MessageError;

/// Why a produce request failed.
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("publish failed: {0}")]
    Publish(#[from] BrokerError),

    #[error("publish task failed: {0}")]
    Task(String),
}

pub fn produce_error_to_response(err: ProduceError) -> axum::response::Response {
    match err {
        ProduceError::Message(MessageError::Encoding(msg)) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "encoding_error", msg)
        }
        ProduceError::Message(e) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
        ProduceError::Publish(e) => json_error(StatusCode::BAD_GATEWAY, "publish_error", e.to_string()),
        ProduceError::Task(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
