//! Workspace subroutine: provision the tenant's workspace hierarchy
//!
//! Applies the manifest set for the tenant's type, waits for the root
//! workspace to converge, then descends into child-scope subdirectories.
//! Children are only applied after the parent is observed ready, because
//! the control plane rejects nested scopes whose parent has not
//! initialized.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

use meshwork_apply::wait::{observed_phase, wait_ready};
use meshwork_apply::{apply_objects, child_directories, render_files, ApplyOptions};
use meshwork_common::crd::{Tenant, WorkspaceSummary};
use meshwork_common::Error;

use crate::context::{workspace_gvk, TenantContext};
use crate::subroutine::{Outcome, Subroutine, SubroutineError, SubroutineResult};

const FINALIZER: &str = "meshwork.dev/workspace";

/// See module docs.
pub struct WorkspaceSubroutine;

#[async_trait]
impl Subroutine for WorkspaceSubroutine {
    fn name(&self) -> &'static str {
        "Workspace"
    }

    fn finalizers(&self) -> Vec<String> {
        vec![FINALIZER.to_string()]
    }

    async fn process(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult {
        let name = tenant.name_any();
        let dir = ctx
            .settings
            .manifest_root
            .join(tenant.spec.tenant_type.manifest_dir());

        let mut data = BTreeMap::from([
            ("tenant".to_string(), name.clone()),
            ("workspace".to_string(), name.clone()),
            (
                "parent".to_string(),
                tenant.spec.parent_workspace.clone().unwrap_or_default(),
            ),
        ]);

        let options = ApplyOptions::default()
            .with_default_namespace(&name)
            .with_dry_run(ctx.settings.dry_run);

        let objects = render_files(&dir, &data).map_err(SubroutineError::classify)?;
        apply_objects(&objects, &ctx.apply, &options)
            .await
            .map_err(SubroutineError::classify)?;

        let root = self.wait_for_workspace(ctx, &name).await?;
        let mut summaries = vec![WorkspaceSummary {
            name: name.clone(),
            phase: observed_phase(&root),
        }];

        // Child scopes, each gated on its own convergence
        for child_dir in child_directories(&dir).map_err(SubroutineError::classify)? {
            let suffix = child_dir
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    SubroutineError::fatal(Error::internal(
                        "workspace",
                        format!("unreadable child directory under {}", dir.display()),
                    ))
                })?;
            let child_name = format!("{name}-{suffix}");
            debug!(tenant = %name, child = %child_name, "applying child scope");

            data.insert("workspace".to_string(), child_name.clone());
            data.insert("parent".to_string(), name.clone());
            let objects = render_files(&child_dir, &data).map_err(SubroutineError::classify)?;
            apply_objects(&objects, &ctx.apply, &options)
                .await
                .map_err(SubroutineError::classify)?;

            let child = self.wait_for_workspace(ctx, &child_name).await?;
            summaries.push(WorkspaceSummary {
                name: child_name,
                phase: observed_phase(&child),
            });
        }

        info!(tenant = %name, workspaces = summaries.len(), "workspace hierarchy converged");
        ctx.workspaces.record(&name, summaries);
        Ok(Outcome::Done)
    }

    async fn finalize(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult {
        let name = tenant.name_any();
        ctx.client
            .delete_dynamic(&workspace_gvk(), None, &name)
            .await
            .map_err(SubroutineError::classify)?;
        Ok(Outcome::Done)
    }
}

impl WorkspaceSubroutine {
    async fn wait_for_workspace(
        &self,
        ctx: &TenantContext,
        name: &str,
    ) -> Result<serde_json::Value, SubroutineError> {
        wait_ready(
            ctx.getter.as_ref(),
            &workspace_gvk(),
            None,
            name,
            ctx.settings.workspace_timeout(),
            ctx.settings.workspace_poll(),
        )
        .await
        .map_err(|e| match e {
            // Not converged yet is the normal case early on
            Error::Timeout { .. } => {
                SubroutineError::retryable_after(e, Duration::from_secs(15))
            }
            other => SubroutineError::classify(other),
        })
    }
}
