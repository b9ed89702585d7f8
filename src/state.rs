use std::sync::Arc;

use crate::config::AppConfig;
use crate::identity::Identity;
use crate::rewrite::OwnershipFilter;
use crate::upstream::{HttpUpstream, Upstream};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<AppConfig>,
    pub upstream: Arc<dyn Upstream>,
}

impl ProxyState {
    /// State backed by the HTTP upstream named in the configuration.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let upstream = HttpUpstream::new(&config.upstream)?;
        Ok(Self::with_upstream(config, Arc::new(upstream)))
    }

    pub fn with_upstream(config: AppConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            config: Arc::new(config),
            upstream,
        }
    }

    pub fn owner_field(&self) -> &str {
        &self.config.identity.owner_field
    }

    pub fn ownership_filter(&self, identity: Option<&Identity>) -> OwnershipFilter {
        OwnershipFilter::new(self.owner_field(), identity.cloned())
    }
}
