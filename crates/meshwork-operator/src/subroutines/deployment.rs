//! Deployment subroutine: resolve component versions into facts
//!
//! Component metadata arrives as ConfigMaps maintained by an external
//! resolver. Each component's artifact reference is parsed and its
//! pinned version recorded in the shared version store, where the
//! pipeline subroutine stamps it into delivery values. The store keeps
//! this subroutine from clobbering versions it does not own.

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::debug;

use meshwork_common::crd::{ComponentRef, Tenant};
use meshwork_common::reference::parse_reference;
use meshwork_common::MESHWORK_SYSTEM_NAMESPACE;

use crate::context::TenantContext;
use crate::subroutine::{Outcome, Subroutine, SubroutineError, SubroutineResult};

/// See module docs.
pub struct DeploymentSubroutine;

/// Metadata ConfigMap name for a component
fn metadata_name(component: &str) -> String {
    format!("component-{component}")
}

/// Value path the component's version is written to
fn version_path(component: &ComponentRef) -> String {
    component
        .values_path
        .clone()
        .unwrap_or_else(|| "image.tag".to_string())
}

/// Sibling of a dot path: `image.tag` -> `image.repository`
fn sibling_path(path: &str, leaf: &str) -> String {
    match path.rsplit_once('.') {
        Some((prefix, _)) => format!("{prefix}.{leaf}"),
        None => leaf.to_string(),
    }
}

#[async_trait]
impl Subroutine for DeploymentSubroutine {
    fn name(&self) -> &'static str {
        "Deployment"
    }

    async fn process(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult {
        let name = tenant.name_any();

        for component in &tenant.spec.components {
            // Externally resolved metadata wins over the spec's reference
            let metadata = ctx
                .client
                .get_config_map(MESHWORK_SYSTEM_NAMESPACE, &metadata_name(&component.name))
                .await
                .map_err(SubroutineError::classify)?;
            let reference = metadata
                .as_ref()
                .and_then(|m| m.get("reference"))
                .cloned()
                .unwrap_or_else(|| component.reference.clone());

            let parsed = parse_reference(&reference).map_err(SubroutineError::fatal)?;
            let path = version_path(component);

            match parsed.tag.as_deref().or(parsed.digest.as_deref()) {
                Some(version) => {
                    ctx.versions.set(&name, &component.name, &path, version);
                    debug!(
                        tenant = %name,
                        component = %component.name,
                        path = %path,
                        version,
                        "recorded version fact"
                    );
                }
                // Floating reference, nothing to pin
                None => debug!(
                    tenant = %name,
                    component = %component.name,
                    reference = %reference,
                    "reference carries no version"
                ),
            }

            if let Some(host) = &parsed.host {
                ctx.versions.set(
                    &name,
                    &component.name,
                    &sibling_path(&path, "repository"),
                    &format!("{host}/{}", parsed.repository),
                );
            }
        }

        Ok(Outcome::Done)
    }
}
