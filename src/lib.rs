//! Reverse proxy that enforces document ownership in front of an
//! Elasticsearch-style document store.
//!
//! Reads are checked against the owner field of the returned document,
//! writes go through a read-before-write guard, and searches are rewritten
//! so that the store only matches documents owned by the caller.

pub mod authz;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod identity;
pub mod observability;
pub mod rewrite;
pub mod routes;
pub mod state;
pub mod upstream;

#[cfg(test)]
pub mod testing;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::trace::TraceLayer;

pub use config::AppConfig;
pub use error::ProxyError;
pub use state::ProxyState;

/// Build the proxy application for the given state.
pub fn app(state: ProxyState) -> Router {
    let api = &state.config.api;

    let mut router = routes::routes().layer(DefaultBodyLimit::max(api.max_request_size_bytes));
    if api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http().make_span_with(observability::make_http_span));
    }

    router.with_state(state)
}
