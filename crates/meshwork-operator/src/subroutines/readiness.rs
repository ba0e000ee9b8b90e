//! Readiness subroutine: gate the aggregate on downstream state
//!
//! Earlier subroutines prove they issued their writes; this one proves
//! the written objects actually converged. It never mutates anything.

use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;

use meshwork_apply::wait::is_ready;
use meshwork_common::crd::Tenant;
use meshwork_common::Error;

use crate::context::{pipeline_gvk, workspace_gvk, TenantContext};
use crate::subroutine::{Outcome, Subroutine, SubroutineError, SubroutineResult};

const RECHECK: Duration = Duration::from_secs(15);

/// See module docs.
pub struct ReadinessSubroutine;

fn not_ready(resource: String) -> SubroutineError {
    SubroutineError::retryable_after(
        Error::not_ready(resource, "not yet converged"),
        RECHECK,
    )
}

#[async_trait]
impl Subroutine for ReadinessSubroutine {
    fn name(&self) -> &'static str {
        "Readiness"
    }

    async fn process(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult {
        let name = tenant.name_any();

        let workspace = ctx
            .getter
            .get(&workspace_gvk(), None, &name)
            .await
            .map_err(SubroutineError::classify)?;
        if !workspace.as_ref().is_some_and(is_ready) {
            return Err(not_ready(format!("workspace/{name}")));
        }

        for component in &tenant.spec.components {
            let sync = format!("{name}-{}", component.name);
            let pipeline = ctx
                .getter
                .get(&pipeline_gvk(), Some(name.clone()), &sync)
                .await
                .map_err(SubroutineError::classify)?;
            if !pipeline.as_ref().is_some_and(is_ready) {
                return Err(not_ready(format!("pipelinesync/{sync}")));
            }
        }

        Ok(Outcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use meshwork_common::crd::{ComponentRef, TenantSpec};

    use crate::context::MockTenantClient;
    use crate::testutil::{tenant, test_context, workspace_value};

    fn spec() -> TenantSpec {
        TenantSpec {
            components: vec![ComponentRef {
                name: "billing".to_string(),
                reference: "ghcr.io/acme/billing:2.0.0".to_string(),
                values_path: None,
            }],
            ..TenantSpec::default()
        }
    }

    #[tokio::test]
    async fn ready_when_workspace_and_pipelines_converged() {
        let (ctx, _, getter) = test_context(
            Arc::new(MockTenantClient::new()),
            std::env::temp_dir(),
        );
        getter.insert("Workspace", "acme", workspace_value("Ready"));
        getter.insert(
            "PipelineSync",
            "acme-billing",
            json!({ "status": { "conditions": [{ "type": "Ready", "status": "True" }] } }),
        );

        let outcome = ReadinessSubroutine
            .process(&tenant("acme", spec()), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Done);
    }

    #[tokio::test]
    async fn unconverged_workspace_requests_a_recheck() {
        let (ctx, _, getter) = test_context(
            Arc::new(MockTenantClient::new()),
            std::env::temp_dir(),
        );
        getter.insert("Workspace", "acme", workspace_value("Initializing"));

        let err = ReadinessSubroutine
            .process(&tenant("acme", spec()), &ctx)
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.requeue_after, Some(RECHECK));
    }

    #[tokio::test]
    async fn missing_pipeline_requests_a_recheck() {
        let (ctx, _, getter) = test_context(
            Arc::new(MockTenantClient::new()),
            std::env::temp_dir(),
        );
        getter.insert("Workspace", "acme", workspace_value("Ready"));

        let err = ReadinessSubroutine
            .process(&tenant("acme", spec()), &ctx)
            .await
            .unwrap_err();
        assert!(err.retryable);
    }
}
