// observability.rs - Logging setup and request spans
use axum::extract::Request;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// environment's default level.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config));

    // A second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn default_filter(config: &AppConfig) -> EnvFilter {
    let level = config.environment.default_log_level();
    EnvFilter::new(format!("docguard={level},tower_http={level}"))
}

/// Span for one inbound request, tagged with a fresh request id.
pub fn make_http_span(request: &Request) -> tracing::Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %uuid::Uuid::new_v4(),
    )
}
