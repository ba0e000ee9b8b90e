//! Resource-type mapping via API discovery
//!
//! Dynamic objects carry only a GVK; turning that into an API endpoint
//! needs the cluster's discovery data (plural name, scope). The mapping
//! is cached per applier and invalidated after CRD installs, since a
//! stale cache cannot resolve freshly defined kinds.

use async_trait::async_trait;
use kube::api::GroupVersionKind;
use kube::discovery::{ApiResource, Discovery, Scope};
#[cfg(test)]
use mockall::automock;
use tokio::sync::Mutex;
use tracing::debug;

use meshwork_common::{Error, Result};

/// A resolved resource type: enough to construct a dynamic Api.
#[derive(Debug, Clone)]
pub struct ResourceMapping {
    /// Discovery-resolved resource (plural, API version, kind)
    pub api_resource: ApiResource,
    /// Whether objects of this type live in a namespace
    pub namespaced: bool,
}

/// Resolves kinds to API resource mappings.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceMapper: Send + Sync {
    /// Resolve a GVK to its resource mapping.
    ///
    /// Unknown kinds are a fatal [`Error::RestMapping`]; retrying without
    /// a [`reset`](ResourceMapper::reset) cannot succeed.
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceMapping>;

    /// Invalidate any cached mapping data.
    async fn reset(&self);
}

/// Production mapper over kube API discovery, with a lazily built cache.
pub struct DiscoveryMapper {
    client: kube::Client,
    cache: Mutex<Option<Discovery>>,
}

impl DiscoveryMapper {
    /// Create a mapper; discovery runs on first resolve.
    pub fn new(client: kube::Client) -> Self {
        Self {
            client,
            cache: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ResourceMapper for DiscoveryMapper {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceMapping> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            debug!("running API discovery");
            let discovery = Discovery::new(self.client.clone()).run().await?;
            *cache = Some(discovery);
        }
        let discovery = cache
            .as_ref()
            .ok_or_else(|| Error::internal("discovery", "cache empty after build"))?;

        let (api_resource, capabilities) = discovery
            .resolve_gvk(gvk)
            .ok_or_else(|| Error::rest_mapping(gvk.group.clone(), gvk.kind.clone()))?;

        Ok(ResourceMapping {
            api_resource,
            namespaced: capabilities.scope == Scope::Namespaced,
        })
    }

    async fn reset(&self) {
        let mut cache = self.cache.lock().await;
        *cache = None;
        debug!("discovery cache invalidated");
    }
}
