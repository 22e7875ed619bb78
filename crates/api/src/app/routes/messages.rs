use std::sync::Arc;

use axum::{
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{info, warn};
use uuid::Uuid;

use courier_core::{Delivery, OutboundRecord};

use crate::app::errors::{self, ProduceError};
use crate::app::{AppState, dto};

pub const SENT: &str = "Message sent successfully";

/// `POST /kafka/message`: publish one message to the source topic.
pub async fn publish_message(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<dto::PublishMessageRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "validation_error",
                rejection.body_text(),
            );
        }
    };

    match produce(&state, body).await {
        Ok(delivery) => {
            info!(
                topic = delivery.topic.as_str(),
                partition = delivery.partition,
                offset = delivery.offset,
                "message published"
            );
            (StatusCode::OK, SENT).into_response()
        }
        Err(err) => {
            warn!(error = %err, "message publish failed");
            errors::produce_error_to_response(err)
        }
    }
}

async fn produce(
    state: &AppState,
    body: dto::PublishMessageRequest,
) -> Result<Delivery, ProduceError> {
    let message = body.into_message()?;
    let record =
        OutboundRecord::for_message(state.topic(), &message)?.with_key(Uuid::now_v7().to_string());

    // Broker clients block until the delivery report arrives.
    let publisher = state.publisher();
    let delivery = tokio::task::spawn_blocking(move || publisher.publish(record))
        .await
        .map_err(|e| ProduceError::Task(e.to_string()))??;

    Ok(delivery)
}
