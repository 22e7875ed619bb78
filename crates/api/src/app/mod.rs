//! HTTP API application wiring (Axum router + shared state).
//!
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and mapping to [`courier_core::Message`]
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    Extension, Router,
    routing::{get, post},
};
use tower::ServiceBuilder;

use courier_broker::Publisher;
use courier_pipeline::StatsHandle;

pub mod dto;
pub mod errors;
pub mod routes;

/// State shared by every request.
#[derive(Clone)]
pub struct AppState {
    publisher: Arc<dyn Publisher>,
    topic: String,
    stats: StatsHandle,
}

impl core::fmt::Debug for AppState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppState")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// `topic` is where the producer endpoint publishes; `stats` are the
    /// counters of the pipeline consuming it.
    pub fn new(publisher: Arc<dyn Publisher>, topic: impl Into<String>, stats: StatsHandle) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            stats,
        }
    }

    pub fn publisher(&self) -> Arc<dyn Publisher> {
        self.publisher.clone()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn stats(&self) -> &StatsHandle {
        &self.stats
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .route("/stats", get(routes::system::stats))
        .route("/kafka/message", post(routes::messages::publish_message))
        .layer(ServiceBuilder::new().layer(Extension(Arc::new(state))))
}
