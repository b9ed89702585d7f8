// Two-phase mutation guard.
//
// Start -> PreCheckOwnBody -> FetchExisting -> PostCheckExisting -> Forward -> Done
//
// Either check can end the run in Denied. Nothing is written upstream before
// both checks have passed, and the fetch always precedes the write.

use axum::http::Method;
use serde_json::{Map, Value};

use crate::authz::{is_authorized, should_deny, DocumentShape, OwnerValue};
use crate::context::RequestContext;
use crate::error::{DenyStage, ProxyError};
use crate::identity::Identity;
use crate::routes::DocumentTarget;
use crate::state::ProxyState;
use crate::upstream::{UpstreamRequest, UpstreamResponse};

/// Mutating document operations that pass through the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// `PUT|POST /{index}/_doc/{id}`: full replace of a possibly existing document
    Replace,
    /// `POST /{index}/_update/{id}`: partial update
    Update,
    /// `DELETE /{index}/_doc/{id}`
    Delete,
    /// `POST /{index}/_doc` and `PUT|POST /{index}/_create/{id}`: never overwrites
    Create,
}

impl MutationKind {
    fn checks_own_body(self) -> bool {
        !matches!(self, MutationKind::Delete)
    }

    fn fetches_existing(self) -> bool {
        !matches!(self, MutationKind::Create)
    }
}

/// Stages of one guarded mutation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    Start,
    PreCheckOwnBody,
    FetchExisting,
    PostCheckExisting,
    Forward,
    Done,
}

pub struct MutationGuard<'a> {
    state: &'a ProxyState,
    ctx: &'a RequestContext,
    kind: MutationKind,
}

impl<'a> MutationGuard<'a> {
    pub fn new(state: &'a ProxyState, ctx: &'a RequestContext, kind: MutationKind) -> Self {
        Self { state, ctx, kind }
    }

    /// Run the guard and, if both checks pass, forward the caller's request.
    pub async fn run(self, target: &DocumentTarget) -> Result<UpstreamResponse, ProxyError> {
        let mut stage = GuardStage::Start;

        if self.kind.checks_own_body() {
            stage = self.advance(stage, GuardStage::PreCheckOwnBody, target);
            if self.denies_own_body() {
                return Err(ProxyError::denied(DenyStage::PreCheckOwnBody));
            }
        }

        if self.kind.fetches_existing() {
            // A guarded kind without an id cannot be checked against anything
            let Some(fetch_path) = target.fetch_path() else {
                return Err(ProxyError::denied(DenyStage::PostCheckExisting));
            };

            stage = self.advance(stage, GuardStage::FetchExisting, target);
            let existing = self.fetch_existing(fetch_path).await?;

            stage = self.advance(stage, GuardStage::PostCheckExisting, target);
            if should_deny(
                &existing.body,
                DocumentShape::Wrapped,
                self.ctx.identity(),
                self.state.owner_field(),
            ) {
                return Err(ProxyError::denied(DenyStage::PostCheckExisting));
            }
        }

        stage = self.advance(stage, GuardStage::Forward, target);
        let response = self
            .state
            .upstream
            .forward(UpstreamRequest::from_context(self.ctx), "guarded write")
            .await?;

        self.advance(stage, GuardStage::Done, target);
        Ok(response)
    }

    fn advance(&self, from: GuardStage, to: GuardStage, target: &DocumentTarget) -> GuardStage {
        tracing::debug!(
            "{:?} {}/{}: {:?} -> {:?}",
            self.kind,
            target.index,
            target.id.as_deref().unwrap_or("-"),
            from,
            to
        );
        to
    }

    /// PreCheckOwnBody: the caller may not submit a write naming another owner.
    fn denies_own_body(&self) -> bool {
        let body = self.ctx.body();
        let identity = self.ctx.identity();
        let owner_field = self.state.owner_field();

        match self.kind {
            MutationKind::Update => update_denied(body, identity, owner_field),
            _ => should_deny(body, DocumentShape::Raw, identity, owner_field),
        }
    }

    /// FetchExisting: read the document as it is stored right now.
    async fn fetch_existing(&self, path: String) -> Result<UpstreamResponse, ProxyError> {
        let request = UpstreamRequest {
            method: Method::GET,
            path,
            query: self.ctx.query_params().clone(),
            headers: self.ctx.fetch_headers(),
            body: self.ctx.body().clone(),
        };

        self.state
            .upstream
            .forward(request, "fetch of existing document")
            .await
    }
}

/// Partial updates carry their payload under `doc` (and `upsert`). A `doc`
/// that leaves the owner field alone is fine; one that sets it must name the
/// caller. Scripts can rewrite the owner in ways that cannot be checked here.
fn update_denied(body: &[u8], identity: Option<&Identity>, owner_field: &str) -> bool {
    let Ok(Value::Object(update)) = serde_json::from_slice::<Value>(body) else {
        return true;
    };

    if update.contains_key("script") {
        return true;
    }

    payload_denied(&update, "doc", identity, owner_field, true)
        || payload_denied(&update, "upsert", identity, owner_field, false)
}

fn payload_denied(
    update: &Map<String, Value>,
    key: &str,
    identity: Option<&Identity>,
    owner_field: &str,
    owner_optional: bool,
) -> bool {
    let Some(payload) = update.get(key) else {
        return false;
    };
    if !payload.is_object() {
        return true;
    }
    if owner_optional && payload.get(owner_field).is_none() {
        return false;
    }

    let owner = OwnerValue::from_document(payload, owner_field);
    !is_authorized(owner.as_ref(), identity)
}
