use axum::{extract::State, response::Response};

use crate::context::RequestContext;
use crate::error::{DenyStage, ProxyError};
use crate::rewrite::{check_search_params, rewrite};
use crate::state::ProxyState;
use crate::upstream::{UpstreamRequest, UpstreamResponse};

/// GET|POST /_search, /:index/_search - Search restricted to owned documents
pub async fn search(State(state): State<ProxyState>, ctx: RequestContext) -> Response {
    let result = filtered_search(&state, &ctx).await;
    ctx.respond(result)
}

async fn filtered_search(state: &ProxyState, ctx: &RequestContext) -> Result<UpstreamResponse, ProxyError> {
    let filter = state.ownership_filter(ctx.identity());

    let filtered = check_search_params(ctx.query_params())
        .and_then(|_| rewrite(ctx.body(), &filter))
        .map_err(|e| {
            tracing::debug!("Cannot rewrite search for {}: {}", ctx.path(), e);
            ProxyError::denied(DenyStage::QueryRewrite)
        })?;

    // Logged and forwarded from the same value
    let body = serde_json::to_vec(&filtered).map_err(|_| ProxyError::denied(DenyStage::QueryRewrite))?;
    tracing::debug!(
        "Search {} original={} filtered={}",
        ctx.path(),
        String::from_utf8_lossy(ctx.body()),
        String::from_utf8_lossy(&body)
    );

    let request = UpstreamRequest::from_context(ctx)
        .with_headers(ctx.headers().with("Content-Type", "application/json"))
        .with_body(body);

    state.upstream.forward(request, "search").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{json_response, request_context, test_state, RecordingUpstream};
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    fn hits() -> std::sync::Arc<RecordingUpstream> {
        RecordingUpstream::new(|_| Ok(json_response(StatusCode::OK, &json!({"hits": {"hits": []}}))))
    }

    #[tokio::test]
    async fn match_all_search_is_wrapped_in_ownership_filter() {
        let upstream = hits();
        let state = test_state(upstream.clone());
        let ctx = request_context(Method::POST, "/idx/_search", Some("alice"), r#"{"query":{"match_all":{}}}"#);

        let response = search(State(state), ctx).await;
        assert_eq!(response.status(), StatusCode::OK);

        let calls = upstream.calls();
        assert_eq!(calls.len(), 1);
        let sent: Value = serde_json::from_slice(&calls[0].body).unwrap();
        assert_eq!(
            sent,
            json!({"query":{"bool":{"must":{"match_all":{}},"filter":{"terms":{"owner":["alice"]}}}}})
        );
        assert_eq!(calls[0].headers.get("Content-Type"), Some("application/json"));
        assert_eq!(calls[0].method, Method::POST);
    }

    #[tokio::test]
    async fn bodiless_get_search_is_still_filtered() {
        let upstream = hits();
        let state = test_state(upstream.clone());
        let ctx = request_context(Method::GET, "/_search?size=3", Some("alice"), "");

        let response = search(State(state), ctx).await;
        assert_eq!(response.status(), StatusCode::OK);

        let calls = upstream.calls();
        assert_eq!(calls[0].path, "/_search");
        assert_eq!(calls[0].query.get("size").map(String::as_str), Some("3"));
        let sent: Value = serde_json::from_slice(&calls[0].body).unwrap();
        assert_eq!(sent["query"]["bool"]["filter"], json!({"terms": {"owner": ["alice"]}}));
    }

    #[tokio::test]
    async fn query_string_search_is_denied_without_upstream_call() {
        let upstream = hits();
        let state = test_state(upstream.clone());

        for uri in ["/idx/_search?q=*:*", "/_search?q=title:x&df=owner", "/idx/_search?source=%7B%7D"] {
            let ctx = request_context(Method::GET, uri, Some("alice"), "");
            let response = search(State(state.clone()), ctx).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
        }
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn global_aggregation_is_denied() {
        let upstream = hits();
        let state = test_state(upstream.clone());
        let ctx = request_context(
            Method::POST,
            "/idx/_search",
            Some("alice"),
            r#"{"size":0,"aggs":{"all":{"global":{},"aggs":{"owners":{"terms":{"field":"owner"}}}}}}"#,
        );

        let response = search(State(state), ctx).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn upstream_server_error_is_not_relayed_as_hits() {
        let upstream = RecordingUpstream::new(|_| {
            Ok(json_response(StatusCode::SERVICE_UNAVAILABLE, &json!({"error": "cluster_block_exception"})))
        });
        let state = test_state(upstream.clone());
        let ctx = request_context(Method::POST, "/idx/_search", Some("alice"), "");

        let response = search(State(state), ctx).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "upstream returned 503 Service Unavailable during search");
        assert_eq!(json["path"], "/idx/_search");
    }

    #[tokio::test]
    async fn unparseable_search_is_denied_without_upstream_call() {
        let upstream = hits();
        let state = test_state(upstream.clone());
        let ctx = request_context(Method::POST, "/idx/_search", Some("alice"), "not json");

        let response = search(State(state), ctx).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(upstream.calls().is_empty());
    }
}
