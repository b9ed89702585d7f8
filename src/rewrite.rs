// Search query rewriting.
//
// The ownership filter is conjoined to whatever the caller sent, so the store
// itself never returns a document the caller does not own.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::identity::Identity;

/// URI parameters that replace or reinterpret the body's `query`.
const QUERY_OVERRIDE_PARAMS: &[&str] = &[
    "q",
    "df",
    "default_operator",
    "analyzer",
    "analyze_wildcard",
    "lenient",
    "source",
    "source_content_type",
];

/// Top-level search keys that select documents outside `query`.
const UNFILTERED_SEARCH_KEYS: &[&str] = &["knn", "retriever", "sub_searches", "suggest"];

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("search body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("search body must be a JSON object")]
    NotAnObject,

    #[error("query.bool must be a JSON object")]
    InvalidBool,

    #[error("query parameter '{0}' would replace the search body")]
    OverridingParam(String),

    #[error("'{0}' is evaluated outside the query filter")]
    UnfilteredClause(String),
}

/// Reject searches whose query string would take the place of the rewritten body.
pub fn check_search_params(params: &BTreeMap<String, String>) -> Result<(), RewriteError> {
    match QUERY_OVERRIDE_PARAMS.iter().find(|name| params.contains_key(**name)) {
        Some(name) => Err(RewriteError::OverridingParam(name.to_string())),
        None => Ok(()),
    }
}

/// `terms` clause restricting hits to documents owned by one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnershipFilter {
    owner_field: String,
    identity: Option<Identity>,
}

impl OwnershipFilter {
    pub fn new(owner_field: impl Into<String>, identity: Option<Identity>) -> Self {
        Self {
            owner_field: owner_field.into(),
            identity,
        }
    }

    /// Query-language fragment. Without an identity the term list is empty and
    /// matches nothing.
    pub fn to_clause(&self) -> Value {
        let owners: Vec<&str> = self.identity.iter().map(Identity::as_str).collect();
        let mut terms = Map::new();
        terms.insert(self.owner_field.clone(), json!(owners));
        json!({ "terms": terms })
    }
}

/// Rewrite a search body so that it only matches documents owned by the caller.
///
/// An empty body is treated as `match_all` and filtered like any other query.
pub fn rewrite(body: &[u8], filter: &OwnershipFilter) -> Result<Value, RewriteError> {
    let clause = filter.to_clause();

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(wrap(json!({ "match_all": {} }), clause));
    }

    let Value::Object(mut search) = serde_json::from_slice::<Value>(body)? else {
        return Err(RewriteError::NotAnObject);
    };
    reject_unfiltered(&search)?;

    match search.get_mut("query").and_then(|query| query.get_mut("bool")) {
        Some(Value::Object(bool_query)) => {
            append_filter(bool_query, clause);
            return Ok(Value::Object(search));
        }
        Some(_) => return Err(RewriteError::InvalidBool),
        None => {}
    }

    let original = search
        .remove("query")
        .unwrap_or_else(|| json!({ "match_all": {} }));
    if let Value::Object(wrapped) = wrap(original, clause) {
        search.extend(wrapped);
    }

    Ok(Value::Object(search))
}

// Vector search, retrievers and suggesters pick documents on their own, and a
// `global` aggregation ignores the query entirely.
fn reject_unfiltered(search: &Map<String, Value>) -> Result<(), RewriteError> {
    if let Some(key) = UNFILTERED_SEARCH_KEYS.iter().find(|key| search.contains_key(**key)) {
        return Err(RewriteError::UnfilteredClause(key.to_string()));
    }

    for aggs_key in ["aggs", "aggregations"] {
        let Some(aggs) = search.get(aggs_key).and_then(Value::as_object) else {
            continue;
        };
        if aggs.values().any(|agg| agg.get("global").is_some()) {
            return Err(RewriteError::UnfilteredClause("global aggregation".to_string()));
        }
    }
    Ok(())
}

/// `{"query": {"bool": {"must": <query>, "filter": <clause>}}}`
fn wrap(query: Value, clause: Value) -> Value {
    json!({
        "query": {
            "bool": {
                "must": query,
                "filter": clause
            }
        }
    })
}

fn append_filter(bool_query: &mut Map<String, Value>, clause: Value) {
    match bool_query.remove("filter") {
        Some(Value::Array(mut clauses)) => {
            clauses.push(clause);
            bool_query.insert("filter".into(), Value::Array(clauses));
        }
        Some(Value::Null) | None => {
            bool_query.insert("filter".into(), json!([clause]));
        }
        // A single clause is promoted to a list
        Some(single) => {
            bool_query.insert("filter".into(), json!([single, clause]));
        }
    }
}
