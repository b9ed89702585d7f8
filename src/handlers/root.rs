use axum::{extract::State, response::Response};

use crate::context::RequestContext;
use crate::state::ProxyState;
use crate::upstream::UpstreamRequest;

/// GET / - Cluster banner, relayed unchanged
pub async fn passthrough(State(state): State<ProxyState>, ctx: RequestContext) -> Response {
    tracing::debug!("Passthrough {} {}", ctx.method(), ctx.path());
    let result = state
        .upstream
        .forward(UpstreamRequest::from_context(&ctx), "root passthrough")
        .await;
    ctx.respond(result)
}
