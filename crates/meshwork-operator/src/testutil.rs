//! Shared stubs for subroutine and orchestrator tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kube::api::GroupVersionKind;
use serde_json::Value;

use meshwork_apply::wait::ObjectGetter;
use meshwork_apply::{
    ApplyClients, ApplyParams, ObjectPatcher, ResourceMapper, ResourceMapping,
};
use meshwork_common::backoff::BackoffPolicy;
use meshwork_common::crd::{Tenant, TenantSpec};
use meshwork_common::versions::VersionStore;
use meshwork_common::Result;

use crate::config::Settings;
use crate::context::{TenantClient, TenantContext, WorkspaceLog};

/// Mapper that resolves every kind; cluster scope for the usual suspects.
pub struct StubMapper;

#[async_trait]
impl ResourceMapper for StubMapper {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<ResourceMapping> {
        let cluster_scoped = matches!(
            gvk.kind.as_str(),
            "Namespace" | "CustomResourceDefinition" | "Workspace"
        );
        Ok(ResourceMapping {
            api_resource: kube::discovery::ApiResource::from_gvk(gvk),
            namespaced: !cluster_scoped,
        })
    }

    async fn reset(&self) {}
}

/// Patcher recording every apply it sees.
#[derive(Default)]
pub struct RecordingPatcher {
    #[allow(clippy::type_complexity)]
    applied: Mutex<Vec<(String, String, Option<String>, Value)>>,
}

impl RecordingPatcher {
    pub fn applied(&self) -> Vec<(String, String, Option<String>, Value)> {
        self.applied.lock().unwrap().clone()
    }

    pub fn applied_kinds(&self) -> Vec<String> {
        self.applied().into_iter().map(|(k, _, _, _)| k).collect()
    }
}

#[async_trait]
impl ObjectPatcher for RecordingPatcher {
    async fn apply(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<String>,
        name: &str,
        object: &Value,
        _params: &ApplyParams,
    ) -> Result<()> {
        self.applied.lock().unwrap().push((
            mapping.api_resource.kind.clone(),
            name.to_string(),
            namespace,
            object.clone(),
        ));
        Ok(())
    }
}

/// Getter serving canned objects keyed by (kind, name).
#[derive(Default)]
pub struct StubGetter {
    objects: Mutex<HashMap<(String, String), Value>>,
}

impl StubGetter {
    pub fn insert(&self, kind: &str, name: &str, value: Value) {
        self.objects
            .lock()
            .unwrap()
            .insert((kind.to_string(), name.to_string()), value);
    }
}

#[async_trait]
impl ObjectGetter for StubGetter {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        _namespace: Option<String>,
        name: &str,
    ) -> Result<Option<Value>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&(gvk.kind.clone(), name.to_string()))
            .cloned())
    }
}

/// Context over stubs, returning the patcher and getter for assertions.
pub fn test_context(
    client: Arc<dyn TenantClient>,
    manifest_root: PathBuf,
) -> (TenantContext, Arc<RecordingPatcher>, Arc<StubGetter>) {
    let patcher = Arc::new(RecordingPatcher::default());
    let getter = Arc::new(StubGetter::default());
    let settings = Settings {
        manifest_root,
        workspace_timeout_secs: 1,
        workspace_poll_secs: 1,
        ..Settings::default()
    };
    let ctx = TenantContext {
        client,
        apply: ApplyClients {
            mapper: Arc::new(StubMapper),
            patcher: patcher.clone(),
        },
        getter: getter.clone(),
        versions: Arc::new(VersionStore::new()),
        workspaces: Arc::new(WorkspaceLog::default()),
        settings,
        backoff: BackoffPolicy::default(),
    };
    (ctx, patcher, getter)
}

/// A minimal Tenant fixture.
pub fn tenant(name: &str, spec: TenantSpec) -> Tenant {
    let mut tenant = Tenant::new(name, spec);
    tenant.metadata.generation = Some(1);
    tenant
}

/// A workspace object value reporting the given phase.
pub fn workspace_value(phase: &str) -> Value {
    serde_json::json!({ "status": { "phase": phase } })
}
