use std::collections::BTreeMap;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Query, Request},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::ProxyError;
use crate::identity::{extract_identity, Identity};
use crate::state::ProxyState;
use crate::upstream::UpstreamResponse;

/// Headers never forwarded upstream: connection management and the
/// forwarding chain of whatever sits in front of the proxy.
const EXCLUDED_HEADERS: &[&str] = &[
    "Host",
    "Connection",
    "Content-Length",
    "Keep-Alive",
    "Transfer-Encoding",
    "Te",
    "Trailer",
    "Upgrade",
    "Proxy-Connection",
    "Forwarded",
    "X-Forwarded-For",
    "X-Forwarded-Host",
    "X-Forwarded-Port",
    "X-Forwarded-Proto",
];

/// Normalized request headers keyed by canonical `Capitalized-Hyphenated` name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForwardHeaders(BTreeMap<String, String>);

impl ForwardHeaders {
    /// Build the forwarded header set from an inbound request.
    ///
    /// `consumed` names headers the proxy itself interprets (the identity
    /// header) and which must not travel further.
    pub fn from_inbound(headers: &HeaderMap, consumed: &[&str]) -> Self {
        let consumed: Vec<String> = consumed.iter().map(|c| canonical_header_name(c)).collect();
        let mut normalized: BTreeMap<String, String> = BTreeMap::new();

        for (name, value) in headers {
            let key = canonical_header_name(name.as_str());
            if is_excluded(&key) || consumed.contains(&key) {
                continue;
            }
            let Ok(value) = value.to_str() else {
                tracing::debug!("Dropping non-UTF-8 header {}", key);
                continue;
            };
            normalized
                .entry(key)
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        Self(normalized)
    }

    /// Copy of this header set without one header.
    pub fn without(&self, name: &str) -> Self {
        let key = canonical_header_name(name);
        let mut headers = self.0.clone();
        headers.remove(&key);
        Self(headers)
    }

    /// Copy of this header set with one header set or replaced.
    pub fn with(&self, name: &str, value: &str) -> Self {
        let mut headers = self.0.clone();
        headers.insert(canonical_header_name(name), value.to_string());
        Self(headers)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&canonical_header_name(name)).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert back into a `HeaderMap` for the HTTP client. Entries that are
    /// not valid header names or values are skipped.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.0.len());
        for (name, value) in &self.0 {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => tracing::debug!("Skipping unforwardable header {}", name),
            }
        }
        map
    }
}

/// `x-forwarded-for` / `X_FORWARDED_FOR` -> `X-Forwarded-For`
pub fn canonical_header_name(name: &str) -> String {
    name.split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let lower = part.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn is_excluded(canonical: &str) -> bool {
    EXCLUDED_HEADERS.contains(&canonical)
}

/// Everything a handler needs to know about one inbound request.
///
/// The body is read once when the context is extracted and cached here for
/// the rest of the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    query: BTreeMap<String, String>,
    headers: ForwardHeaders,
    body: Bytes,
    identity: Option<Identity>,
}

impl RequestContext {
    pub fn new(
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
        identity_header: &str,
    ) -> Result<Self, ProxyError> {
        let Query(query) = Query::<BTreeMap<String, String>>::try_from_uri(uri)
            .map_err(|e| ProxyError::invalid_query(e.body_text()))?;

        Ok(Self {
            method,
            path: uri.path().to_string(),
            query,
            headers: ForwardHeaders::from_inbound(headers, &[identity_header]),
            body,
            identity: extract_identity(headers, identity_header),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw (still percent-encoded) request path
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_params(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    pub fn headers(&self) -> &ForwardHeaders {
        &self.headers
    }

    /// Headers for the read-before-write fetch: no content negotiation, so the
    /// fetched document can be parsed as-is.
    pub fn fetch_headers(&self) -> ForwardHeaders {
        self.headers.without("Accept-Encoding")
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Convert a handler result into the HTTP response. This is the single
    /// place where errors turn into status codes.
    pub fn respond(&self, result: Result<UpstreamResponse, ProxyError>) -> Response {
        match result {
            Ok(response) => response.into_response(),
            Err(err) => err.into_response_for(self),
        }
    }
}

#[async_trait]
impl FromRequest<ProxyState> for RequestContext {
    type Rejection = Response;

    async fn from_request(req: Request, state: &ProxyState) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let headers = req.headers().clone();

        let body = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;

        RequestContext::new(method, &uri, &headers, body, &state.config.identity.header)
            .map_err(|e| e.into_response())
    }
}
