//! Server-side apply of dynamic objects
//!
//! All writes go through server-side apply under a declared field manager,
//! so this controller owns exactly the fields it sets and repeated applies
//! converge without diffing.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use meshwork_common::Result;

use crate::mapper::ResourceMapping;

/// Parameters for a single apply patch
#[derive(Debug, Clone)]
pub struct ApplyParams {
    /// Field-manager identity declared on the patch
    pub field_manager: String,
    /// Take ownership of conflicting fields
    pub force: bool,
    /// Ask the server to validate without persisting
    pub dry_run: bool,
}

/// Issues server-side-apply patches for dynamic objects.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectPatcher: Send + Sync {
    /// Apply `object` as `name` within `namespace` (None for
    /// cluster-scoped types).
    async fn apply(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<String>,
        name: &str,
        object: &Value,
        params: &ApplyParams,
    ) -> Result<()>;
}

/// Production patcher over `Api<DynamicObject>`.
pub struct KubePatcher {
    client: kube::Client,
}

impl KubePatcher {
    /// Create a patcher over the given client.
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectPatcher for KubePatcher {
    async fn apply(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<String>,
        name: &str,
        object: &Value,
        params: &ApplyParams,
    ) -> Result<()> {
        let api: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), &ns, &mapping.api_resource),
            None => Api::all_with(self.client.clone(), &mapping.api_resource),
        };

        let mut patch_params = PatchParams::apply(&params.field_manager);
        if params.force {
            patch_params = patch_params.force();
        }
        if params.dry_run {
            patch_params.dry_run = true;
        }

        api.patch(name, &patch_params, &Patch::Apply(object)).await?;
        Ok(())
    }
}
