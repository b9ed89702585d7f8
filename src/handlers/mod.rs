// handlers/mod.rs - Request handlers, one module per route family
//
// Every handler extracts a `RequestContext`, computes a
// `Result<UpstreamResponse, ProxyError>` and hands it back to the context,
// which is the only place errors become HTTP responses.

pub mod bulk;
pub mod documents;
pub mod root;
pub mod search;
