use axum::{extract::State, response::Response};

use crate::authz::{should_deny, DocumentShape};
use crate::context::RequestContext;
use crate::error::{DenyStage, ProxyError};
use crate::guard::{MutationGuard, MutationKind};
use crate::routes::DocumentTarget;
use crate::state::ProxyState;
use crate::upstream::{UpstreamRequest, UpstreamResponse};

/// GET /:index/_doc/:id, /:index/_source/:id - Read one document
///
/// The upstream answer is relayed only when the caller owns the document it
/// contains. Anything else, including a 404 body, becomes a 403.
pub async fn read(State(state): State<ProxyState>, ctx: RequestContext) -> Response {
    let result = read_document(&state, &ctx).await;
    ctx.respond(result)
}

async fn read_document(state: &ProxyState, ctx: &RequestContext) -> Result<UpstreamResponse, ProxyError> {
    let target = DocumentTarget::require(ctx.path())?;
    tracing::debug!("Read {}/{} via {}", target.index, target.id.as_deref().unwrap_or("-"), target.endpoint);

    let response = state
        .upstream
        .forward(UpstreamRequest::from_context(ctx), "document read")
        .await?;

    let shape = DocumentShape::for_endpoint(&target.endpoint);
    if should_deny(&response.body, shape, ctx.identity(), state.owner_field()) {
        return Err(ProxyError::denied(DenyStage::ResponseCheck));
    }
    Ok(response)
}

/// PUT|POST /:index/_doc/:id - Index (replace) a document
pub async fn replace(State(state): State<ProxyState>, ctx: RequestContext) -> Response {
    let result = guarded(&state, &ctx, MutationKind::Replace).await;
    ctx.respond(result)
}

/// DELETE /:index/_doc/:id - Delete a document
pub async fn delete(State(state): State<ProxyState>, ctx: RequestContext) -> Response {
    let result = guarded(&state, &ctx, MutationKind::Delete).await;
    ctx.respond(result)
}

/// POST /:index/_update/:id - Partial update
pub async fn update(State(state): State<ProxyState>, ctx: RequestContext) -> Response {
    let result = guarded(&state, &ctx, MutationKind::Update).await;
    ctx.respond(result)
}

/// POST /:index/_doc, PUT|POST /:index/_create/:id - Create a new document
pub async fn create(State(state): State<ProxyState>, ctx: RequestContext) -> Response {
    let result = guarded(&state, &ctx, MutationKind::Create).await;
    ctx.respond(result)
}

async fn guarded(
    state: &ProxyState,
    ctx: &RequestContext,
    kind: MutationKind,
) -> Result<UpstreamResponse, ProxyError> {
    let target = DocumentTarget::require(ctx.path())?;
    MutationGuard::new(state, ctx, kind).run(&target).await
}
