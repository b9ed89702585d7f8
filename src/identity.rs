use axum::http::HeaderMap;
use serde::Serialize;
use std::fmt;

/// Caller identity as asserted by the authentication layer in front of the proxy.
///
/// The value is trusted as-is. An empty value is never constructed, so a
/// present `Identity` always has something to compare against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the caller identity from the configured trusted header.
///
/// Absent, non-UTF-8 and empty values all yield `None`.
pub fn extract_identity(headers: &HeaderMap, header_name: &str) -> Option<Identity> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .and_then(Identity::new)
}
