//! Reconcile context and cluster access
//!
//! Subroutines reach the cluster only through the [`TenantClient`] trait
//! (typed objects, status, finalizers), the applier clients (manifest
//! directories), and the dynamic getter (readiness observation). All
//! three are trait objects so subroutine logic tests against mocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{
    Api, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams,
};
#[cfg(test)]
use mockall::automock;
use serde_json::{json, Value};

use meshwork_apply::wait::{KubeGetter, ObjectGetter};
use meshwork_apply::{ApplyClients, ApplyParams, DiscoveryMapper, KubePatcher, ObjectPatcher, ResourceMapper};
use meshwork_common::backoff::BackoffPolicy;
use meshwork_common::crd::{Tenant, TenantStatus, WorkspaceSummary};
use meshwork_common::versions::VersionStore;
use meshwork_common::{Result, FIELD_MANAGER, TENANT_LABEL};

use crate::config::Settings;

/// GVK of the hierarchical workspace objects the operator drives
pub fn workspace_gvk() -> GroupVersionKind {
    GroupVersionKind {
        group: "tenancy.meshwork.dev".to_string(),
        version: "v1alpha1".to_string(),
        kind: "Workspace".to_string(),
    }
}

/// GVK of the GitOps delivery resource the pipeline subroutine converges
pub fn pipeline_gvk() -> GroupVersionKind {
    GroupVersionKind {
        group: "delivery.meshwork.dev".to_string(),
        version: "v1alpha1".to_string(),
        kind: "PipelineSync".to_string(),
    }
}

/// Typed cluster operations the subroutines and orchestrator need.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TenantClient: Send + Sync {
    /// Patch the tenant's status subresource.
    async fn patch_status(&self, name: &str, status: &TenantStatus) -> Result<()>;

    /// Replace the tenant's finalizer list.
    async fn set_finalizers(&self, name: &str, finalizers: &[String]) -> Result<()>;

    /// Read a secret's data, decoded to a string-valued object.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Value>>;

    /// Server-side apply a secret's data (written as stringData).
    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        tenant: &str,
        data: &Value,
    ) -> Result<()>;

    /// Delete a secret; absence is not an error.
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;

    /// Read a ConfigMap's data.
    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>>;

    /// Server-side apply a ConfigMap's data.
    async fn apply_config_map(
        &self,
        namespace: &str,
        name: &str,
        tenant: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Delete a ConfigMap; absence is not an error.
    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()>;

    /// Server-side apply a dynamic object.
    async fn apply_dynamic(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<String>,
        name: &str,
        object: &Value,
    ) -> Result<()>;

    /// Delete a dynamic object; absence is not an error.
    async fn delete_dynamic(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<String>,
        name: &str,
    ) -> Result<()>;
}

/// Workspace observations recorded by the workspace subroutine during a
/// pass and drained into status by the orchestrator. Keyed by tenant;
/// same locking discipline as the version store.
#[derive(Default)]
pub struct WorkspaceLog {
    inner: std::sync::RwLock<std::collections::HashMap<String, Vec<WorkspaceSummary>>>,
}

impl WorkspaceLog {
    /// Replace the recorded summaries for a tenant.
    pub fn record(&self, tenant: &str, summaries: Vec<WorkspaceSummary>) {
        let mut inner = self.inner.write().expect("workspace log lock poisoned");
        inner.insert(tenant.to_string(), summaries);
    }

    /// Remove and return the recorded summaries for a tenant.
    pub fn take(&self, tenant: &str) -> Option<Vec<WorkspaceSummary>> {
        let mut inner = self.inner.write().expect("workspace log lock poisoned");
        inner.remove(tenant)
    }
}

/// Everything one reconcile pass needs.
pub struct TenantContext {
    /// Typed cluster operations
    pub client: Arc<dyn TenantClient>,
    /// Manifest-directory applier clients
    pub apply: ApplyClients,
    /// Dynamic-object reader for readiness observation
    pub getter: Arc<dyn ObjectGetter>,
    /// Shared version-fact store
    pub versions: Arc<VersionStore>,
    /// Workspace observations from the current pass
    pub workspaces: Arc<WorkspaceLog>,
    /// Runtime settings
    pub settings: Settings,
    /// Requeue backoff policy
    pub backoff: BackoffPolicy,
}

impl TenantContext {
    /// Production context over a kube client.
    pub fn new(client: kube::Client, settings: Settings) -> Self {
        let mapper: Arc<dyn ResourceMapper> = Arc::new(DiscoveryMapper::new(client.clone()));
        let patcher: Arc<dyn ObjectPatcher> = Arc::new(KubePatcher::new(client.clone()));
        let apply = ApplyClients {
            mapper: mapper.clone(),
            patcher: patcher.clone(),
        };
        let getter: Arc<dyn ObjectGetter> =
            Arc::new(KubeGetter::new(client.clone(), mapper.clone()));
        let tenant_client = KubeTenantClient {
            client,
            mapper,
            patcher,
            dry_run: settings.dry_run,
        };
        Self {
            client: Arc::new(tenant_client),
            apply,
            getter,
            versions: Arc::new(VersionStore::new()),
            workspaces: Arc::new(WorkspaceLog::default()),
            settings,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Production [`TenantClient`] over typed and dynamic kube Apis.
pub struct KubeTenantClient {
    client: kube::Client,
    mapper: Arc<dyn ResourceMapper>,
    patcher: Arc<dyn ObjectPatcher>,
    dry_run: bool,
}

impl KubeTenantClient {
    fn apply_params(&self) -> PatchParams {
        let mut params = PatchParams::apply(FIELD_MANAGER).force();
        if self.dry_run {
            params.dry_run = true;
        }
        params
    }

    fn tenants(&self) -> Api<Tenant> {
        Api::all(self.client.clone())
    }
}

fn ignore_absent(result: std::result::Result<(), kube::Error>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl TenantClient for KubeTenantClient {
    async fn patch_status(&self, name: &str, status: &TenantStatus) -> Result<()> {
        self.tenants()
            .patch_status(
                name,
                &PatchParams::default(),
                &Patch::Merge(json!({ "status": status })),
            )
            .await?;
        Ok(())
    }

    async fn set_finalizers(&self, name: &str, finalizers: &[String]) -> Result<()> {
        self.tenants()
            .patch(
                name,
                &PatchParams::default(),
                &Patch::Merge(json!({ "metadata": { "finalizers": finalizers } })),
            )
            .await?;
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Value>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get_opt(name).await?;
        Ok(secret.map(|s| {
            let data: serde_json::Map<String, Value> = s
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, Value::String(String::from_utf8_lossy(&v.0).into_owned())))
                .collect();
            Value::Object(data)
        }))
    }

    async fn apply_secret(
        &self,
        namespace: &str,
        name: &str,
        tenant: &str,
        data: &Value,
    ) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "labels": { TENANT_LABEL: tenant },
            },
            "type": "Opaque",
            "stringData": data,
        });
        api.patch(name, &self.apply_params(), &Patch::Apply(&secret))
            .await?;
        Ok(())
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        ignore_absent(api.delete(name, &DeleteParams::default()).await.map(|_| ()))
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let cm = api.get_opt(name).await?;
        Ok(cm.map(|c| c.data.unwrap_or_default()))
    }

    async fn apply_config_map(
        &self,
        namespace: &str,
        name: &str,
        tenant: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let cm = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "labels": { TENANT_LABEL: tenant },
            },
            "data": data,
        });
        api.patch(name, &self.apply_params(), &Patch::Apply(&cm))
            .await?;
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        ignore_absent(api.delete(name, &DeleteParams::default()).await.map(|_| ()))
    }

    async fn apply_dynamic(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<String>,
        name: &str,
        object: &Value,
    ) -> Result<()> {
        let mapping = self.mapper.resolve(gvk).await?;
        let params = ApplyParams {
            field_manager: FIELD_MANAGER.to_string(),
            force: true,
            dry_run: self.dry_run,
        };
        self.patcher
            .apply(&mapping, namespace, name, object, &params)
            .await
    }

    async fn delete_dynamic(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<String>,
        name: &str,
    ) -> Result<()> {
        let mapping = self.mapper.resolve(gvk).await?;
        let api: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), &ns, &mapping.api_resource),
            None => Api::all_with(self.client.clone(), &mapping.api_resource),
        };
        ignore_absent(api.delete(name, &DeleteParams::default()).await.map(|_| ()))
    }
}
