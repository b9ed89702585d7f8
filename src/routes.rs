// routes.rs - Route table and typed document targets
use axum::{
    routing::{get, post, MethodRouter},
    Router,
};

use crate::error::ProxyError;
use crate::handlers::{bulk, documents, root, search};
use crate::state::ProxyState;

/// `/{index}/{endpoint}[/{id}]` taken from the raw request path.
///
/// Segments keep their percent-encoding so that the pre-fetch of the
/// two-phase guard addresses exactly the document the caller named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTarget {
    pub index: String,
    pub endpoint: String,
    pub id: Option<String>,
}

impl DocumentTarget {
    pub fn from_path(path: &str) -> Option<Self> {
        let mut segments = path.strip_prefix('/')?.split('/');

        let index = segments.next().filter(|s| !s.is_empty())?;
        let endpoint = segments.next().filter(|s| s.starts_with('_'))?;
        let id = match segments.next() {
            Some("") | None => None,
            Some(id) => Some(id.to_string()),
        };
        if segments.next().is_some() {
            return None;
        }

        Some(Self {
            index: index.to_string(),
            endpoint: endpoint.to_string(),
            id,
        })
    }

    /// Like `from_path`, for handlers whose route already guarantees the shape.
    pub fn require(path: &str) -> Result<Self, ProxyError> {
        Self::from_path(path).ok_or_else(|| ProxyError::UnknownRoute(path.to_string()))
    }

    /// `_doc` read of the same document, whatever endpoint was called.
    pub fn fetch_path(&self) -> Option<String> {
        self.id
            .as_ref()
            .map(|id| format!("/{}/_doc/{}", self.index, id))
    }
}

/// Complete route table. Unlisted paths and methods answer 404 without
/// touching the upstream.
pub fn routes() -> Router<ProxyState> {
    Router::new()
        .route("/", strict(get(root::passthrough)))
        // Single documents
        .route(
            "/:index/_doc/:id",
            strict(
                get(documents::read)
                    .put(documents::replace)
                    .post(documents::replace)
                    .delete(documents::delete),
            ),
        )
        .route("/:index/_source/:id", strict(get(documents::read)))
        .route("/:index/_doc", strict(post(documents::create)))
        .route(
            "/:index/_create/:id",
            strict(post(documents::create).put(documents::create)),
        )
        .route("/:index/_update/:id", strict(post(documents::update)))
        // Search
        .route("/_search", strict(get(search::search).post(search::search)))
        .route("/:index/_search", strict(get(search::search).post(search::search)))
        // Bulk
        .route("/_bulk", strict(post(bulk::bulk).put(bulk::bulk)))
        .route("/:index/_bulk", strict(post(bulk::bulk).put(bulk::bulk)))
        .fallback(unknown_route)
}

// A known path with an unlisted method is still "not found", not 405.
fn strict(router: MethodRouter<ProxyState>) -> MethodRouter<ProxyState> {
    router.fallback(unknown_route)
}

async fn unknown_route(method: axum::http::Method, uri: axum::http::Uri) -> ProxyError {
    tracing::debug!("No route for {} {}", method, uri.path());
    ProxyError::UnknownRoute(format!("{} {}", method, uri.path()))
}
