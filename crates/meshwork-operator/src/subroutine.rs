//! Subroutine contract and registry
//!
//! A subroutine is one independently enable/disable-able unit of
//! reconciliation work. The orchestrator runs the full set in a fixed
//! order every pass; each subroutine classifies its own failures and the
//! orchestrator only aggregates.

use std::time::Duration;

use async_trait::async_trait;

use meshwork_common::crd::Tenant;
use meshwork_common::Error;

use crate::context::TenantContext;

/// Successful subroutine completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Converged; nothing more to do this pass
    Done,
    /// Converged as far as possible; ask for an early recheck
    RequeueAfter(Duration),
}

/// A classified subroutine failure.
///
/// Classification is owned by the subroutine that produced the error;
/// the orchestrator never reinterprets it.
#[derive(Debug)]
pub struct SubroutineError {
    /// The underlying error
    pub source: Error,
    /// Whether requeueing can plausibly fix this
    pub retryable: bool,
    /// Explicit requeue delay; None defers to the backoff policy
    pub requeue_after: Option<Duration>,
}

impl SubroutineError {
    /// A retryable failure, requeued per the orchestrator's backoff.
    pub fn retryable(source: Error) -> Self {
        Self {
            source,
            retryable: true,
            requeue_after: None,
        }
    }

    /// A retryable failure with an explicit requeue delay.
    pub fn retryable_after(source: Error, delay: Duration) -> Self {
        Self {
            source,
            retryable: true,
            requeue_after: Some(delay),
        }
    }

    /// A fatal failure; retries stop until the spec changes.
    pub fn fatal(source: Error) -> Self {
        Self {
            source,
            retryable: false,
            requeue_after: None,
        }
    }

    /// Classify by the error's own retryability.
    pub fn classify(source: Error) -> Self {
        if source.is_retryable() {
            Self::retryable(source)
        } else {
            Self::fatal(source)
        }
    }
}

/// Result of one subroutine invocation
pub type SubroutineResult = Result<Outcome, SubroutineError>;

/// One unit of reconciliation work.
#[async_trait]
pub trait Subroutine: Send + Sync {
    /// Stable name, used for the `<Name>_Ready` condition
    fn name(&self) -> &'static str;

    /// Finalizer strings this subroutine installs on the Tenant
    fn finalizers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Converge toward the tenant's desired state.
    async fn process(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult;

    /// Clean up on tenant deletion. Default: nothing to do.
    async fn finalize(&self, _tenant: &Tenant, _ctx: &TenantContext) -> SubroutineResult {
        Ok(Outcome::Done)
    }
}

/// Build the subroutine set in its execution order.
///
/// The order is a contract, not an accident of registration: workspaces
/// must exist before credentials bind into them, credentials before the
/// pipeline resources that reference them, resolved versions before the
/// pipeline values they are stamped into, and readiness gates last.
pub fn subroutines() -> Vec<Box<dyn Subroutine>> {
    vec![
        Box::new(crate::subroutines::workspace::WorkspaceSubroutine),
        Box::new(crate::subroutines::credentials::CredentialsSubroutine),
        Box::new(crate::subroutines::deployment::DeploymentSubroutine),
        Box::new(crate::subroutines::pipeline::PipelineSubroutine),
        Box::new(crate::subroutines::features::FeatureTogglesSubroutine),
        Box::new(crate::subroutines::readiness::ReadinessSubroutine),
    ]
}

/// Build only the subroutines the settings leave enabled, in the same
/// order. Processing passes and the aggregate `Ready` condition cover
/// exactly this set.
pub fn enabled_subroutines(settings: &crate::config::Settings) -> Vec<Box<dyn Subroutine>> {
    subroutines()
        .into_iter()
        .filter(|s| settings.subroutine_enabled(s.name()))
        .collect()
}

/// Condition type for a subroutine, `<Name>_Ready`.
pub fn condition_type(name: &str) -> String {
    format!("{name}_Ready")
}
