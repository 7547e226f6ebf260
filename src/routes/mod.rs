//! Route gateway for the HTTP exposition endpoint.
//!
//! Each sibling module exports a subrouter; this module merges them and binds
//! the shared state, so `main.rs` never needs to know about individual
//! endpoints.

use std::sync::Arc;

use axum::Router;
use tracing::Span;

use crate::{Store, Validator};

mod health;
mod metrics;

// ---

/// State shared by all routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub validator: Arc<Validator>,
    /// Request logs are emitted inside this span.
    pub span: Span,
}

pub fn router(store: Arc<Store>, validator: Arc<Validator>, span: Span) -> Router {
    // ---
    Router::new()
        .merge(metrics::router())
        .merge(health::router())
        .with_state(AppState {
            store,
            validator,
            span,
        })
}
