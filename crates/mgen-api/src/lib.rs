//! Axum HTTP API server.
//!
//! This crate provides:
//! - Job submission, status and cancellation endpoints
//! - A WebSocket progress stream per job
//! - Health, readiness and Prometheus metrics endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
