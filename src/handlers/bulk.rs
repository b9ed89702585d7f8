use axum::{extract::State, response::Response};

use crate::context::RequestContext;
use crate::error::{DenyStage, ProxyError};
use crate::state::ProxyState;
use crate::upstream::UpstreamRequest;

/// POST|PUT /_bulk, /:index/_bulk - Forwarded without per-item checks
///
/// Bulk bodies are newline-delimited action/source pairs and are not
/// inspected, so bulk writes bypass the ownership checks. Deployments that
/// cannot accept that switch bulk off with `API_BULK_PASSTHROUGH=false`.
/// Searches are not affected: query-string overrides, vector/retriever
/// clauses and `global` aggregations are refused by the search handler.
pub async fn bulk(State(state): State<ProxyState>, ctx: RequestContext) -> Response {
    let result = if state.config.api.bulk_passthrough {
        tracing::warn!(
            "Forwarding unchecked bulk request {} for {:?}",
            ctx.path(),
            ctx.identity().map(|i| i.as_str())
        );
        state
            .upstream
            .forward(UpstreamRequest::from_context(&ctx), "bulk")
            .await
    } else {
        Err(ProxyError::denied(DenyStage::BulkDisabled))
    };
    ctx.respond(result)
}
