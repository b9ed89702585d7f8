#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};

use docguard::config::{AppConfig, Environment};
use docguard::{app, ProxyState};

pub const IDENTITY_HEADER: &str = "x-remote-user";

/// One request as seen by the mock store
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct StoreInner {
    documents: HashMap<(String, String), Value>,
    requests: Vec<Recorded>,
    read_delay: Option<Duration>,
    unavailable: bool,
}

/// Minimal in-process document store speaking the `_doc` / `_source` /
/// `_search` subset the proxy uses.
#[derive(Clone, Default)]
pub struct MockStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, index: &str, id: &str, source: Value) -> Self {
        self.inner
            .lock()
            .unwrap()
            .documents
            .insert((index.to_string(), id.to_string()), source);
        self
    }

    /// Delay every GET by `delay` (slow store / timeout tests)
    pub fn with_read_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().read_delay = Some(delay);
        self
    }

    /// Answer every request with 503, as a cluster without a master does
    pub fn unavailable(self) -> Self {
        self.inner.lock().unwrap().unavailable = true;
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.requests().into_iter().map(|r| r.method).collect()
    }

    pub fn writes(&self) -> usize {
        self.requests().iter().filter(|r| r.method != Method::GET).count()
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.inner
            .lock()
            .unwrap()
            .documents
            .get(&(index.to_string(), id.to_string()))
            .cloned()
    }

    pub async fn start(self) -> Result<String> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        let router = Router::new().fallback(handle_store).with_state(self);
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        Ok(format!("http://127.0.0.1:{}", port))
    }
}

async fn handle_store(
    State(store): State<MockStore>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (delay, unavailable) = {
        let mut inner = store.inner.lock().unwrap();
        inner.requests.push(Recorded {
            method: method.clone(),
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            headers,
            body: body.clone(),
        });
        (inner.read_delay, inner.unavailable)
    };
    if unavailable {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"type": "master_not_discovered_exception"}, "status": 503})),
        )
            .into_response();
    }
    if method == Method::GET {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    let segments: Vec<&str> = uri.path().trim_start_matches('/').split('/').collect();
    let mut inner = store.inner.lock().unwrap();

    match (method.as_str(), segments.as_slice()) {
        ("GET", [""]) => Json(json!({"tagline": "You Know, for Search"})).into_response(),
        ("GET", [index, "_doc", id]) => {
            let key = (index.to_string(), id.to_string());
            match inner.documents.get(&key) {
                Some(source) => Json(json!({
                    "_index": index, "_id": id, "_version": 1, "found": true, "_source": source
                }))
                .into_response(),
                None => (
                    StatusCode::NOT_FOUND,
                    Json(json!({"_index": index, "_id": id, "found": false})),
                )
                    .into_response(),
            }
        }
        ("GET", [index, "_source", id]) => {
            match inner.documents.get(&(index.to_string(), id.to_string())) {
                Some(source) => Json(source.clone()).into_response(),
                None => (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response(),
            }
        }
        ("PUT" | "POST", [index, "_doc" | "_create", id]) => {
            let source: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            inner.documents.insert((index.to_string(), id.to_string()), source);
            Json(json!({"_index": index, "_id": id, "result": "created"})).into_response()
        }
        ("DELETE", [index, "_doc", id]) => {
            inner.documents.remove(&(index.to_string(), id.to_string()));
            Json(json!({"_index": index, "_id": id, "result": "deleted"})).into_response()
        }
        (_, [.., "_search"]) => Json(json!({"hits": {"total": {"value": 0}, "hits": []}})).into_response(),
        _ => Json(json!({"acknowledged": true})).into_response(),
    }
}

/// Proxy under test, listening on a free port
pub struct TestProxy {
    pub base_url: String,
    client: reqwest::Client,
}

impl TestProxy {
    pub async fn start(upstream_url: &str) -> Result<Self> {
        Self::start_with(upstream_url, |_| {}).await
    }

    pub async fn start_with(upstream_url: &str, configure: impl FnOnce(&mut AppConfig)) -> Result<Self> {
        let mut config = AppConfig::for_environment(Environment::Development);
        config.upstream.uri = docguard::config::parse_upstream_uri(upstream_url)?;
        config.identity.header = IDENTITY_HEADER.to_string();
        config.api.enable_request_logging = false;
        configure(&mut config);

        let state = ProxyState::new(config)?;
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app(state)).await;
        });

        Ok(Self {
            base_url: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
        })
    }

    pub fn request(&self, method: Method, path: &str, identity: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(identity) = identity {
            builder = builder.header(IDENTITY_HEADER, identity);
        }
        builder
    }
}

/// Mock store plus proxy in front of it
pub async fn start(store: MockStore) -> Result<(MockStore, TestProxy)> {
    let upstream_url = store.clone().start().await?;
    let proxy = TestProxy::start(&upstream_url).await?;
    Ok((store, proxy))
}

pub fn query_pairs(recorded: &Recorded) -> BTreeMap<String, String> {
    recorded
        .query
        .as_deref()
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
