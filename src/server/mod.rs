//! HTTP front end of the binary.
//!
//! # Endpoints
//!
//! - `POST /events` - Takes one normalized event record (JSON), runs it
//!   through the [`EventProcessor`] and answers with the task results
//! - `GET /metrics` - The counter snapshot as JSON
//! - `GET /health` - Returns 200 if the server is running
//!
//! Payload-specific parsing (forge webhooks, message-bus topics) happens in
//! front of this service; it only ever sees [`EventRecord`]s.
//!
//! [`EventRecord`]: crate::events::EventRecord

use std::sync::Arc;

use crate::dispatch::ExecutionBackend;
use crate::events::ConfigResolver;
use crate::forge::Forge;
use crate::metrics::Metrics;
use crate::process::EventProcessor;

mod events;
mod health;

pub use events::events_handler;
pub use health::{health_handler, metrics_handler};

/// Shared application state, handed to every handler through axum's
/// `State` extractor.
pub struct AppState<R, F, B> {
    processor: Arc<EventProcessor<R, F, B>>,
    metrics: &'static Metrics,
}

impl<R, F, B> Clone for AppState<R, F, B> {
    fn clone(&self) -> Self {
        AppState {
            processor: Arc::clone(&self.processor),
            metrics: self.metrics,
        }
    }
}

impl<R, F, B> AppState<R, F, B> {
    pub fn new(processor: EventProcessor<R, F, B>, metrics: &'static Metrics) -> Self {
        AppState {
            processor: Arc::new(processor),
            metrics,
        }
    }

    pub fn processor(&self) -> &EventProcessor<R, F, B> {
        &self.processor
    }

    pub fn metrics(&self) -> &'static Metrics {
        self.metrics
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<R, F, B>(app_state: AppState<R, F, B>) -> axum::Router
where
    R: ConfigResolver + 'static,
    F: Forge + 'static,
    B: ExecutionBackend + 'static,
{
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/events", post(events_handler::<R, F, B>))
        .route("/metrics", get(metrics_handler::<R, F, B>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
