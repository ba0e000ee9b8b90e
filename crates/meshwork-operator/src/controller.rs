//! Tenant reconciliation orchestrator
//!
//! One reconcile pass runs the subroutine set in its fixed order, folds
//! each result into a `<Name>_Ready` condition plus the aggregate
//! `Ready`, and persists status exactly once per pass. The pass stops at
//! the first failure because later subroutines depend on state written
//! by earlier ones, but the conditions gathered so far are still
//! persisted.
//!
//! Deletion runs the subroutines' finalize hooks in reverse order,
//! clearing each one's finalizer strings as it succeeds.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use meshwork_common::crd::{
    aggregate_ready, find_condition, set_condition, Condition, ConditionStatus, Tenant,
};
use meshwork_common::{Error, MESHWORK_SYSTEM_NAMESPACE, REFRESH_LABEL, TENANT_LABEL};

use crate::config::Settings;
use crate::context::TenantContext;
use crate::subroutine::{
    condition_type, enabled_subroutines, subroutines, Outcome, Subroutine, SubroutineError,
};

/// Watches re-establish before the API server's five-minute cutoff
const WATCHER_TIMEOUT_SECS: u32 = 290;

fn watcher_config() -> watcher::Config {
    watcher::Config::default().timeout(WATCHER_TIMEOUT_SECS)
}

/// Reconcile one Tenant.
#[instrument(skip_all, fields(tenant = %tenant.name_any()))]
pub async fn reconcile(tenant: Arc<Tenant>, ctx: Arc<TenantContext>) -> Result<Action, Error> {
    if tenant.metadata.deletion_timestamp.is_some() {
        // Teardown runs the full set: a subroutine disabled since its
        // last pass still owns finalizers that must come off
        return finalize_tenant(&tenant, &ctx, &subroutines()).await;
    }
    // A refresh label toggle lands here like any other metadata change;
    // every pass recomputes from scratch, so it needs no special path.
    if tenant.labels().contains_key(REFRESH_LABEL) {
        debug!("refresh label present");
    }
    process_tenant(&tenant, &ctx, &enabled_subroutines(&ctx.settings)).await
}

async fn process_tenant(
    tenant: &Tenant,
    ctx: &TenantContext,
    subs: &[Box<dyn Subroutine>],
) -> Result<Action, Error> {
    let name = tenant.name_any();
    ensure_finalizers(tenant, ctx, subs).await?;

    let mut status = tenant.status.clone().unwrap_or_default();
    let mut condition_types = Vec::with_capacity(subs.len());
    let mut early_requeue: Option<Duration> = None;
    let mut failure: Option<SubroutineError> = None;

    for sub in subs {
        let ctype = condition_type(sub.name());
        condition_types.push(ctype.clone());
        if failure.is_some() {
            // Later subroutines depend on earlier state; leave their
            // conditions at the previous pass's value
            continue;
        }

        debug!(subroutine = sub.name(), "processing");
        match sub.process(tenant, ctx).await {
            Ok(outcome) => {
                set_condition(
                    &mut status.conditions,
                    Condition::new(ctype, ConditionStatus::True, "Reconciled", ""),
                );
                if let Outcome::RequeueAfter(delay) = outcome {
                    early_requeue = Some(early_requeue.map_or(delay, |d| d.min(delay)));
                }
            }
            Err(e) => {
                let (cond_status, reason) = if e.retryable {
                    (ConditionStatus::Unknown, "Retrying")
                } else {
                    (ConditionStatus::False, "Failed")
                };
                warn!(
                    subroutine = sub.name(),
                    error = %e.source,
                    retryable = e.retryable,
                    "subroutine failed"
                );
                set_condition(
                    &mut status.conditions,
                    Condition::new(ctype, cond_status, reason, e.source.to_string()),
                );
                failure = Some(e);
            }
        }
    }

    let aggregate = aggregate_ready(&status.conditions, &condition_types);
    let (reason, message) = match aggregate {
        ConditionStatus::True => ("Reconciled", String::new()),
        _ => (
            "SubroutinesPending",
            "one or more subroutines have not converged".to_string(),
        ),
    };
    set_condition(
        &mut status.conditions,
        Condition::new("Ready", aggregate.clone(), reason, message),
    );
    status.observed_generation = tenant.metadata.generation;
    if let Some(workspaces) = ctx.workspaces.take(&name) {
        status.workspaces = workspaces;
    }
    ctx.client.patch_status(&name, &status).await?;

    match failure {
        None => {
            info!(ready = %aggregate, "reconcile complete");
            Ok(Action::requeue(
                early_requeue.unwrap_or_else(|| ctx.settings.resync_interval()),
            ))
        }
        Some(e) if !e.retryable => {
            warn!("fatal failure, waiting for a spec change");
            Ok(Action::await_change())
        }
        Some(e) => {
            let delay = e.requeue_after.unwrap_or_else(|| {
                ctx.backoff
                    .next_requeue(time_since_first_failure(&status.conditions))
            });
            Ok(Action::requeue(delay))
        }
    }
}

async fn ensure_finalizers(
    tenant: &Tenant,
    ctx: &TenantContext,
    subs: &[Box<dyn Subroutine>],
) -> Result<(), Error> {
    let current = tenant.metadata.finalizers.clone().unwrap_or_default();
    let mut desired = current.clone();
    for finalizer in subs.iter().flat_map(|s| s.finalizers()) {
        if !desired.contains(&finalizer) {
            desired.push(finalizer);
        }
    }
    if desired != current {
        ctx.client
            .set_finalizers(&tenant.name_any(), &desired)
            .await?;
    }
    Ok(())
}

async fn finalize_tenant(
    tenant: &Tenant,
    ctx: &TenantContext,
    subs: &[Box<dyn Subroutine>],
) -> Result<Action, Error> {
    let name = tenant.name_any();
    let mut remaining = tenant.metadata.finalizers.clone().unwrap_or_default();

    // Reverse of processing order: tear down dependents first
    for sub in subs.iter().rev() {
        let owned = sub.finalizers();
        if !owned.iter().any(|f| remaining.contains(f)) {
            continue;
        }
        info!(subroutine = sub.name(), "finalizing");
        match sub.finalize(tenant, ctx).await {
            Ok(_) => {
                remaining.retain(|f| !owned.contains(f));
                ctx.client.set_finalizers(&name, &remaining).await?;
            }
            Err(e) if e.retryable => {
                warn!(subroutine = sub.name(), error = %e.source, "finalize not done yet");
                return Ok(Action::requeue(
                    e.requeue_after.unwrap_or(ctx.backoff.initial_delay),
                ));
            }
            Err(e) => return Err(e.source),
        }
    }

    Ok(Action::await_change())
}

/// Time since the tenant first stopped being Ready, per its condition
/// transition timestamp. Drives the two-phase backoff.
fn time_since_first_failure(conditions: &[Condition]) -> Duration {
    find_condition(conditions, "Ready")
        .filter(|c| c.status != ConditionStatus::True)
        .and_then(|c| (Utc::now() - c.last_transition_time).to_std().ok())
        .unwrap_or_default()
}

/// Requeue decision for reconcile errors that escaped classification.
pub fn error_policy(tenant: Arc<Tenant>, error: &Error, ctx: Arc<TenantContext>) -> Action {
    warn!(tenant = %tenant.name_any(), %error, "reconcile failed");
    let since = tenant
        .status
        .as_ref()
        .map(|s| time_since_first_failure(&s.conditions))
        .unwrap_or_default();
    Action::requeue(ctx.backoff.next_requeue(since))
}

/// Run the controller until shutdown.
///
/// Watches Tenants plus the component-metadata ConfigMaps in the system
/// namespace; a ConfigMap change maps back to its owning Tenant via the
/// tenant label, forcing reprocessing without a spec change.
pub async fn run(client: kube::Client, settings: Settings) -> anyhow::Result<()> {
    let context = Arc::new(TenantContext::new(client.clone(), settings));
    let tenants: Api<Tenant> = Api::all(client.clone());
    let config_maps: Api<ConfigMap> = Api::namespaced(client, MESHWORK_SYSTEM_NAMESPACE);

    info!("starting tenant controller");
    Controller::new(tenants, watcher_config())
        .watches(config_maps, watcher_config(), |cm: ConfigMap| {
            cm.metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(TENANT_LABEL))
                .map(|tenant| ObjectRef::<Tenant>::new(tenant))
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(tenant = %object.name, "reconciled"),
                Err(e) => warn!(error = %e, "reconcile dispatch failed"),
            }
        })
        .await;
    info!("controller stopped");
    Ok(())
}
