// Proxy error types and their HTTP rendering
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

use crate::context::RequestContext;

/// Fixed body returned for every denial, whichever check produced it
pub const FORBIDDEN_BODY: &str = "Access forbidden";

/// Check that turned a request away. Only used for logging; the caller always
/// sees the same 403.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyStage {
    /// The caller's own payload names someone else (or nobody)
    PreCheckOwnBody,
    /// The stored document does not belong to the caller
    PostCheckExisting,
    /// A document read returned something the caller does not own
    ResponseCheck,
    /// The search body could not be rewritten
    QueryRewrite,
    /// Bulk passthrough is switched off
    BulkDisabled,
}

impl fmt::Display for DenyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DenyStage::PreCheckOwnBody => "pre-check of request body",
            DenyStage::PostCheckExisting => "post-check of existing document",
            DenyStage::ResponseCheck => "response check",
            DenyStage::QueryRewrite => "query rewrite",
            DenyStage::BulkDisabled => "bulk disabled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("access denied at {0}")]
    Denied(DenyStage),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream returned {status} during {during}")]
    UpstreamError { status: StatusCode, during: &'static str },

    #[error("invalid query string: {0}")]
    InvalidQuery(String),

    #[error("no route for {0}")]
    UnknownRoute(String),
}

impl ProxyError {
    pub fn denied(stage: DenyStage) -> Self {
        ProxyError::Denied(stage)
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        ProxyError::UpstreamUnavailable(message.into())
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        ProxyError::InvalidQuery(message.into())
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Denied(_) => StatusCode::FORBIDDEN,
            ProxyError::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UpstreamError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ProxyError::UnknownRoute(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Diagnostic body for operators. Carries the normalized request, so it
    /// must only be used for internal errors.
    pub fn diagnostic_json(&self, ctx: &RequestContext) -> Value {
        json!({
            "error": self.to_string(),
            "headers": ctx.headers(),
            "body": String::from_utf8_lossy(ctx.body()),
            "params": ctx.query_params(),
            "path": ctx.path(),
        })
    }

    /// Render the error for a request whose context is known.
    pub fn into_response_for(self, ctx: &RequestContext) -> Response {
        match self {
            ProxyError::Denied(stage) => {
                tracing::info!(
                    "Denied {} {} for {:?} at {}",
                    ctx.method(),
                    ctx.path(),
                    ctx.identity().map(|i| i.as_str()),
                    stage
                );
                forbidden()
            }
            err @ (ProxyError::UpstreamUnavailable(_) | ProxyError::UpstreamError { .. }) => {
                tracing::error!("{} {} failed: {}", ctx.method(), ctx.path(), err);
                (err.status_code(), Json(err.diagnostic_json(ctx))).into_response()
            }
            other => {
                tracing::debug!("{} {}: {}", ctx.method(), ctx.path(), other);
                other.into_response()
            }
        }
    }
}

/// Uniform 403 response
pub fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        FORBIDDEN_BODY,
    )
        .into_response()
}

// Rendering without a request context (extraction failures)
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::Denied(_) => forbidden(),
            ProxyError::UnknownRoute(_) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            other => (
                other.status_code(),
                Json(json!({ "error": other.to_string() })),
            )
                .into_response(),
        }
    }
}
