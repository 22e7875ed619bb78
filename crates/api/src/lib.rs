//! HTTP API: producer endpoint, operator endpoints, and request/response
//! mapping.

pub mod app;

pub use app::{AppState, build_app};
