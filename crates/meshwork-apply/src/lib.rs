//! Ordered server-side apply of rendered manifest directories
//!
//! The applier converts a directory of templated YAML manifests into a
//! converged cluster state:
//!
//! 1. the directory is rendered into a flat, ordered object list;
//! 2. dependency-class kinds (Namespace, CustomResourceDefinition) are
//!    applied first; after CRDs, the resource-type mapping cache is
//!    invalidated so newly defined schemas become resolvable;
//! 3. the full set is applied in build order with server-side apply under
//!    a stable field manager, so re-application is idempotent and
//!    unrelated controllers' fields are never clobbered.
//!
//! Any single-object failure aborts the directory apply; callers retry
//! the whole reconcile.

mod mapper;
mod patcher;
pub mod render;
pub mod wait;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kube::api::GroupVersionKind;
use serde_json::Value;
use tracing::{debug, info};

use meshwork_common::{Error, Result, FIELD_MANAGER};

pub use mapper::{DiscoveryMapper, ResourceMapper, ResourceMapping};
pub use patcher::{ApplyParams, KubePatcher, ObjectPatcher};
pub use render::{child_directories, render_directory, render_directory_with, render_files};

/// The kind that defines new resource schemas; applying one invalidates
/// the mapping cache.
pub const CRD_KIND: &str = "CustomResourceDefinition";

/// A single rendered manifest, identified by GVK, scope, and name.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestObject {
    /// Group/version/kind of the object
    pub gvk: GroupVersionKind,
    /// Object name
    pub name: String,
    /// Explicit namespace, when the manifest carries one
    pub namespace: Option<String>,
    /// The full rendered field tree
    pub value: Value,
}

impl ManifestObject {
    /// Build a manifest object from a rendered value tree.
    ///
    /// Fails when apiVersion, kind, or metadata.name are missing.
    pub fn from_value(value: Value) -> Result<Self> {
        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization("manifest missing apiVersion"))?;
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization("manifest missing kind"))?;
        let name = value
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::serialization_for_kind(kind, "manifest missing metadata.name"))?
            .to_string();
        let namespace = value
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(str::to_string);

        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };

        Ok(Self {
            gvk: GroupVersionKind {
                group: group.to_string(),
                version: version.to_string(),
                kind: kind.to_string(),
            },
            name,
            namespace,
            value,
        })
    }
}

/// Options controlling a directory apply
#[derive(Clone, Debug)]
pub struct ApplyOptions {
    /// Field-manager identity declared on every patch
    pub field_manager: String,
    /// Take ownership of conflicting fields instead of failing
    pub force_conflicts: bool,
    /// Namespace filled in for namespace-scoped objects lacking one
    pub default_namespace: Option<String>,
    /// Kinds applied in the first pass before everything else
    pub pre_apply_kinds: Vec<String>,
    /// Mark every write as non-persisting
    pub dry_run: bool,
    /// Settle delay after CRD application, before the mapping cache reset
    pub crd_settle: Duration,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            field_manager: FIELD_MANAGER.to_string(),
            force_conflicts: true,
            default_namespace: None,
            pre_apply_kinds: vec!["Namespace".to_string(), CRD_KIND.to_string()],
            dry_run: false,
            crd_settle: Duration::from_secs(2),
        }
    }
}

impl ApplyOptions {
    /// Set the default namespace for namespace-scoped objects lacking one
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = Some(namespace.into());
        self
    }

    /// Set the field manager identity
    pub fn with_field_manager(mut self, manager: impl Into<String>) -> Self {
        self.field_manager = manager.into();
        self
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// The client capabilities a directory apply needs: a resource-type
/// mapping resolver and a dynamic patcher.
#[derive(Clone)]
pub struct ApplyClients {
    /// Resolves kinds to scope/resource mappings; reset after CRD installs
    pub mapper: Arc<dyn ResourceMapper>,
    /// Issues the server-side-apply patches
    pub patcher: Arc<dyn ObjectPatcher>,
}

impl ApplyClients {
    /// Production clients backed by a kube Client
    pub fn new(client: kube::Client) -> Self {
        Self {
            mapper: Arc::new(DiscoveryMapper::new(client.clone())),
            patcher: Arc::new(KubePatcher::new(client)),
        }
    }
}

/// Render a manifest directory and apply it in dependency order.
///
/// See the module docs for the ordering contract. The directory's files
/// are rendered in sorted order; subdirectories are not descended into
/// (hierarchical scopes are the caller's concern, see
/// [`child_directories`]).
pub async fn apply_directory(
    dir: &Path,
    clients: &ApplyClients,
    options: &ApplyOptions,
) -> Result<()> {
    let objects = render_directory(dir)?;
    info!(dir = %dir.display(), objects = objects.len(), "applying manifest directory");
    apply_objects(&objects, clients, options).await
}

/// Apply an already-rendered object set in dependency order.
pub async fn apply_objects(
    objects: &[ManifestObject],
    clients: &ApplyClients,
    options: &ApplyOptions,
) -> Result<()> {
    // First pass: dependency-class kinds others structurally need
    let pre_apply: Vec<&ManifestObject> = objects
        .iter()
        .filter(|o| options.pre_apply_kinds.iter().any(|k| k == &o.gvk.kind))
        .collect();

    for object in &pre_apply {
        apply_object(object, clients, options).await?;
    }

    // Newly installed schemas are invisible to a stale discovery cache
    if pre_apply.iter().any(|o| o.gvk.kind == CRD_KIND) {
        debug!(settle = ?options.crd_settle, "CRDs applied, refreshing type mappings");
        tokio::time::sleep(options.crd_settle).await;
        clients.mapper.reset().await;
    }

    // Full set, in build order; re-applying the pre-apply set is idempotent
    for object in objects {
        apply_object(object, clients, options).await?;
    }

    Ok(())
}

/// Apply one object: resolve its scope, default the namespace, patch.
async fn apply_object(
    object: &ManifestObject,
    clients: &ApplyClients,
    options: &ApplyOptions,
) -> Result<()> {
    let mapping = clients.mapper.resolve(&object.gvk).await?;

    let namespace = if mapping.namespaced {
        object
            .namespace
            .clone()
            .or_else(|| options.default_namespace.clone())
    } else {
        None
    };

    let params = ApplyParams {
        field_manager: options.field_manager.clone(),
        force: options.force_conflicts,
        dry_run: options.dry_run,
    };

    clients
        .patcher
        .apply(
            &mapping,
            namespace.clone(),
            &object.name,
            &object.value,
            &params,
        )
        .await
        .map_err(|e| match e {
            // Wrap with the offending identity, preserving retryability
            err @ Error::Apply { .. } => err,
            other => {
                let retryable = other.is_retryable();
                Error::Apply {
                    kind: object.gvk.kind.clone(),
                    name: object.name.clone(),
                    message: other.to_string(),
                    retryable,
                }
            }
        })?;

    debug!(
        kind = %object.gvk.kind,
        name = %object.name,
        namespace = ?namespace,
        dry_run = options.dry_run,
        "applied manifest"
    );
    Ok(())
}
