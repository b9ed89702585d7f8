// Upstream forwarder: one HTTP call per invocation, no retries.
use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use url::Url;

use crate::config::UpstreamConfig;
use crate::context::{ForwardHeaders, RequestContext};
use crate::error::ProxyError;

/// Response headers that describe the upstream connection, not the payload.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-connection",
];

/// Request sent to the document store.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Percent-encoded path, starting with `/`
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: ForwardHeaders,
    pub body: Bytes,
}

impl UpstreamRequest {
    /// The caller's request as received.
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            method: ctx.method().clone(),
            path: ctx.path().to_string(),
            query: ctx.query_params().clone(),
            headers: ctx.headers().clone(),
            body: ctx.body().clone(),
        }
    }

    /// Same request with a different body (rewritten searches).
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_headers(mut self, headers: ForwardHeaders) -> Self {
        self.headers = headers;
        self
    }
}

/// Response relayed back to the caller.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let mut headers = self.headers;
        for name in HOP_BY_HOP {
            headers.remove(*name);
        }
        // Recomputed by the server from the relayed body
        headers.remove(header::CONTENT_LENGTH);
        response.headers_mut().extend(headers);
        response
    }
}

/// The document store behind the proxy.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// One HTTP exchange. Any status the store answers with is `Ok`.
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError>;

    /// `send`, with a 5xx answer turned into `UpstreamError`. Every proxied
    /// call goes through here so an outage never reaches the ownership checks
    /// or the caller as a document.
    async fn forward(
        &self,
        request: UpstreamRequest,
        during: &'static str,
    ) -> Result<UpstreamResponse, ProxyError> {
        let response = self.send(request).await?;
        if response.status.is_server_error() {
            tracing::debug!("Upstream answered {} during {}", response.status, during);
            return Err(ProxyError::UpstreamError {
                status: response.status,
                during,
            });
        }
        Ok(response)
    }
}

/// `Upstream` over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base: Url,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        Ok(Self {
            client: builder.build()?,
            base: config.uri.clone(),
        })
    }

    /// Base URI joined with an already-encoded request path. A path prefix on
    /// the base URI is kept.
    pub fn url_for(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        let prefix = self.base.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", prefix, path));
        url.set_query(None);
        url
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        let url = self.url_for(&request.path);
        tracing::debug!("Upstream {} {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method, url)
            .headers(request.headers.to_header_map());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(describe_transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(describe_transport_error)?;

        Ok(UpstreamResponse { status, headers, body })
    }
}

fn describe_transport_error(err: reqwest::Error) -> ProxyError {
    if err.is_timeout() {
        ProxyError::upstream_unavailable(format!("request timed out: {}", err))
    } else if err.is_connect() {
        ProxyError::upstream_unavailable(format!("connection failed: {}", err))
    } else {
        ProxyError::upstream_unavailable(err.to_string())
    }
}
