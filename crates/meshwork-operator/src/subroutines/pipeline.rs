//! Pipeline subroutine: converge GitOps delivery resources
//!
//! Each component gets one PipelineSync in the tenant's namespace. The
//! values document is assembled in three layers: the tenant's declared
//! overrides as the baseline, live values merged on top (operators and
//! platform teams hand-edit these, they must survive), and finally the
//! resolved version facts stamped in, since versions are the one thing
//! this controller owns outright.

use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{json, Value};
use tracing::debug;

use meshwork_common::crd::Tenant;
use meshwork_common::merge::merge;
use meshwork_common::reference::{parse_reference, ArtifactReference};
use meshwork_common::versions::apply_facts_to_values;
use meshwork_common::yaml::parse_yaml;
use meshwork_common::{Error, TENANT_LABEL};

use crate::context::{pipeline_gvk, TenantContext};
use crate::subroutine::{Outcome, Subroutine, SubroutineError, SubroutineResult};

const FINALIZER: &str = "meshwork.dev/pipeline";

/// See module docs.
pub struct PipelineSubroutine;

fn sync_name(tenant: &str, component: &str) -> String {
    format!("{tenant}-{component}")
}

/// Source location the delivery resource pulls from
fn source(reference: &ArtifactReference) -> String {
    match (&reference.host, &reference.info) {
        (Some(host), _) => format!("{host}/{}", reference.repository),
        (None, Some(info)) => info.clone(),
        (None, None) => reference.repository.clone(),
    }
}

#[async_trait]
impl Subroutine for PipelineSubroutine {
    fn name(&self) -> &'static str {
        "Pipeline"
    }

    fn finalizers(&self) -> Vec<String> {
        vec![FINALIZER.to_string()]
    }

    async fn process(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult {
        let name = tenant.name_any();

        for component in &tenant.spec.components {
            let parsed = parse_reference(&component.reference).map_err(SubroutineError::fatal)?;
            let sync = sync_name(&name, &component.name);

            let existing = ctx
                .getter
                .get(&pipeline_gvk(), Some(name.clone()), &sync)
                .await
                .map_err(SubroutineError::classify)?;

            if existing.is_none() && !parsed.create_if_missing {
                // Provisioned out-of-band; wait for it to show up
                return Err(SubroutineError::retryable_after(
                    Error::not_ready(&sync, "delivery resource not yet provisioned"),
                    Duration::from_secs(30),
                ));
            }

            let existing_values = existing
                .as_ref()
                .and_then(|o| o.pointer("/spec/values"))
                .cloned()
                .unwrap_or(Value::Null);
            let desired_values = tenant
                .spec
                .overrides
                .as_ref()
                .and_then(|o| o.get(&component.name))
                .cloned()
                .unwrap_or_else(|| json!({}));

            // Live edits win over our defaults; version facts win last
            let merged =
                merge(&desired_values, &existing_values).map_err(SubroutineError::classify)?;
            let yaml = serde_yaml::to_string(&merged)
                .map_err(|e| SubroutineError::fatal(Error::serialization(e.to_string())))?;
            let facts = ctx.versions.get(&name, &component.name).unwrap_or_default();
            let stamped =
                apply_facts_to_values(&yaml, &facts).map_err(SubroutineError::classify)?;
            let values = parse_yaml(&stamped).map_err(SubroutineError::classify)?;

            let object = json!({
                "apiVersion": "delivery.meshwork.dev/v1alpha1",
                "kind": "PipelineSync",
                "metadata": {
                    "name": sync,
                    "namespace": name,
                    "labels": { TENANT_LABEL: name },
                },
                "spec": {
                    "source": source(&parsed),
                    "values": values,
                },
            });

            ctx.client
                .apply_dynamic(&pipeline_gvk(), Some(name.clone()), &sync, &object)
                .await
                .map_err(SubroutineError::classify)?;
            debug!(tenant = %name, sync = %sync, "delivery resource converged");
        }

        Ok(Outcome::Done)
    }

    async fn finalize(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult {
        let name = tenant.name_any();
        for component in &tenant.spec.components {
            ctx.client
                .delete_dynamic(
                    &pipeline_gvk(),
                    Some(name.clone()),
                    &sync_name(&name, &component.name),
                )
                .await
                .map_err(SubroutineError::classify)?;
        }
        Ok(Outcome::Done)
    }
}
