//! Feature-toggles subroutine: project toggles into the tenant ConfigMap
//!
//! Unlike the credentials secret, the feature ConfigMap is authoritative:
//! a toggle removed from the spec must disappear from the ConfigMap, so
//! the deletion-aware merge is used here.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::Value;
use tracing::debug;

use meshwork_common::crd::Tenant;
use meshwork_common::merge::merge_with_deletion;
use meshwork_common::Error;

use crate::context::TenantContext;
use crate::subroutine::{Outcome, Subroutine, SubroutineError, SubroutineResult};

const FINALIZER: &str = "meshwork.dev/feature-toggles";

/// See module docs.
pub struct FeatureTogglesSubroutine;

fn config_map_name(tenant: &str) -> String {
    format!("{tenant}-features")
}

#[async_trait]
impl Subroutine for FeatureTogglesSubroutine {
    fn name(&self) -> &'static str {
        "FeatureToggles"
    }

    fn finalizers(&self) -> Vec<String> {
        vec![FINALIZER.to_string()]
    }

    async fn process(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult {
        let name = tenant.name_any();
        let cm = config_map_name(&name);

        let desired = Value::Object(
            tenant
                .spec
                .features
                .iter()
                .map(|f| (f.name.clone(), Value::String(f.enabled.to_string())))
                .collect(),
        );
        let existing = ctx
            .client
            .get_config_map(&name, &cm)
            .await
            .map_err(SubroutineError::classify)?
            .map(|data| {
                Value::Object(
                    data.into_iter()
                        .map(|(k, v)| (k, Value::String(v)))
                        .collect(),
                )
            })
            .unwrap_or(Value::Null);

        let merged =
            merge_with_deletion(&desired, &existing).map_err(SubroutineError::classify)?;
        let data: BTreeMap<String, String> = merged
            .as_object()
            .ok_or_else(|| {
                SubroutineError::fatal(Error::merge("feature toggle merge produced a non-mapping"))
            })?
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()),
                )
            })
            .collect();

        ctx.client
            .apply_config_map(&name, &cm, &name, &data)
            .await
            .map_err(SubroutineError::classify)?;

        debug!(tenant = %name, toggles = data.len(), "feature toggles converged");
        Ok(Outcome::Done)
    }

    async fn finalize(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult {
        let name = tenant.name_any();
        ctx.client
            .delete_config_map(&name, &config_map_name(&name))
            .await
            .map_err(SubroutineError::classify)?;
        Ok(Outcome::Done)
    }
}
