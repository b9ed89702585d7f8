// Ownership decisions over JSON document bodies.
//
// Every protected path funnels through `should_deny`: caller payloads,
// `_source` responses, `_doc` envelopes and the pre-fetch of the two-phase
// guard. Anything that cannot be read as an owned document is denied.

use serde::Deserialize;
use serde_json::Value;

use crate::identity::Identity;

/// Value of a document's owner field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OwnerValue {
    Single(String),
    Multiple(Vec<String>),
}

impl OwnerValue {
    /// Read the owner value out of a JSON document. Any type other than a
    /// string or an array of strings yields `None`.
    pub fn from_document(document: &Value, owner_field: &str) -> Option<Self> {
        let raw = document.get(owner_field)?;
        OwnerValue::deserialize(raw).ok()
    }
}

/// Where the owner field lives in a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentShape {
    /// Owner at the root: caller payloads and `_source` responses
    Raw,
    /// Owner under `_source`: `_doc` responses with the metadata envelope
    Wrapped,
}

impl DocumentShape {
    /// Shape of the response returned by a document read endpoint.
    pub fn for_endpoint(endpoint: &str) -> Self {
        if endpoint == "_source" {
            DocumentShape::Raw
        } else {
            DocumentShape::Wrapped
        }
    }
}

/// True iff the identity equals the owner or is one of the owners.
pub fn is_authorized(owner: Option<&OwnerValue>, identity: Option<&Identity>) -> bool {
    let (Some(owner), Some(identity)) = (owner, identity) else {
        return false;
    };

    match owner {
        OwnerValue::Single(name) => name == identity.as_str(),
        OwnerValue::Multiple(names) => names.iter().any(|name| name == identity.as_str()),
    }
}

/// Decide whether a body must be withheld from (or rejected for) the caller.
pub fn should_deny(
    body: &[u8],
    shape: DocumentShape,
    identity: Option<&Identity>,
    owner_field: &str,
) -> bool {
    if body.is_empty() {
        return true;
    }

    let Ok(json) = serde_json::from_slice::<Value>(body) else {
        return true;
    };

    let document = match shape {
        DocumentShape::Raw => Some(&json),
        DocumentShape::Wrapped => json.get("_source"),
    };

    let owner = document.and_then(|doc| OwnerValue::from_document(doc, owner_field));
    !is_authorized(owner.as_ref(), identity)
}
