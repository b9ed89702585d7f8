// Test doubles shared by the unit tests
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde_json::Value;

use crate::config::AppConfig;
use crate::context::RequestContext;
use crate::error::ProxyError;
use crate::state::ProxyState;
use crate::upstream::{Upstream, UpstreamRequest, UpstreamResponse};

pub const IDENTITY_HEADER: &str = "x-remote-user";

type Responder = dyn Fn(&UpstreamRequest) -> Result<UpstreamResponse, ProxyError> + Send + Sync;

/// Upstream that records every request and answers from a closure.
pub struct RecordingUpstream {
    calls: Mutex<Vec<UpstreamRequest>>,
    responder: Box<Responder>,
}

impl RecordingUpstream {
    pub fn new(
        responder: impl Fn(&UpstreamRequest) -> Result<UpstreamResponse, ProxyError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        })
    }

    /// Answers GETs with `document` and everything else with 200 `{"result":"ok"}`.
    pub fn serving(document: Value) -> Arc<Self> {
        Self::new(move |request| {
            if request.method == Method::GET {
                Ok(json_response(StatusCode::OK, &document))
            } else {
                Ok(json_response(StatusCode::OK, &serde_json::json!({"result": "ok"})))
            }
        })
    }

    pub fn calls(&self) -> Vec<UpstreamRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    /// Calls that would change state upstream
    pub fn writes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method != Method::GET)
            .count()
    }
}

#[async_trait]
impl Upstream for RecordingUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        let result = (self.responder)(&request);
        self.calls.lock().unwrap().push(request);
        result
    }
}

pub fn json_response(status: StatusCode, body: &Value) -> UpstreamResponse {
    let mut response = UpstreamResponse::new(status, serde_json::to_vec(body).unwrap());
    response
        .headers
        .insert("content-type", HeaderValue::from_static("application/json"));
    response
}

/// `_doc` envelope around a stored document
pub fn stored(id: &str, source: Value) -> Value {
    serde_json::json!({
        "_index": "idx",
        "_id": id,
        "_version": 1,
        "found": true,
        "_source": source
    })
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::for_environment(crate::config::Environment::Development);
    config.identity.header = IDENTITY_HEADER.to_string();
    config
}

pub fn test_state(upstream: Arc<dyn Upstream>) -> ProxyState {
    ProxyState::with_upstream(test_config(), upstream)
}

pub fn request_context(method: Method, uri: &str, identity: Option<&str>, body: &str) -> RequestContext {
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("accept-encoding", HeaderValue::from_static("gzip"));
    if let Some(identity) = identity {
        headers.insert(IDENTITY_HEADER, HeaderValue::from_str(identity).unwrap());
    }
    let uri: Uri = uri.parse().unwrap();
    RequestContext::new(method, &uri, &headers, Bytes::from(body.to_string()), IDENTITY_HEADER).unwrap()
}
