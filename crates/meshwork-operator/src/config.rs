//! Operator configuration
//!
//! All knobs are flags with environment fallbacks so the same binary runs
//! in-cluster (env-configured) and on a workstation (flag-configured).

use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the operator
#[derive(Debug, Clone, clap::Args)]
pub struct Settings {
    /// Root directory holding per-tenant-type manifest sets
    #[arg(
        long,
        env = "MESHWORK_MANIFEST_ROOT",
        default_value = "/etc/meshwork/manifests"
    )]
    pub manifest_root: PathBuf,

    /// Upper bound on waiting for a workspace to report ready, seconds
    #[arg(long, env = "MESHWORK_WORKSPACE_TIMEOUT", default_value_t = 120)]
    pub workspace_timeout_secs: u64,

    /// Poll interval while waiting on workspace readiness, seconds
    #[arg(long, env = "MESHWORK_WORKSPACE_POLL", default_value_t = 5)]
    pub workspace_poll_secs: u64,

    /// Periodic resync interval for converged tenants, seconds
    #[arg(long, env = "MESHWORK_RESYNC", default_value_t = 3600)]
    pub resync_secs: u64,

    /// Validate all writes server-side without persisting them
    #[arg(long, env = "MESHWORK_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,

    /// Subroutines to skip during processing, by name (comma-separated).
    /// Finalize still runs the full set so a disabled subroutine can
    /// clean up finalizers it installed earlier.
    #[arg(
        long = "disable-subroutine",
        env = "MESHWORK_DISABLED_SUBROUTINES",
        value_delimiter = ','
    )]
    pub disabled_subroutines: Vec<String>,
}

impl Settings {
    /// Workspace readiness wait deadline
    pub fn workspace_timeout(&self) -> Duration {
        Duration::from_secs(self.workspace_timeout_secs)
    }

    /// Workspace readiness poll interval
    pub fn workspace_poll(&self) -> Duration {
        Duration::from_secs(self.workspace_poll_secs)
    }

    /// Resync interval for tenants with nothing to do
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_secs)
    }

    /// Whether the named subroutine runs during processing passes
    pub fn subroutine_enabled(&self, name: &str) -> bool {
        !self.disabled_subroutines.iter().any(|d| d == name)
    }
}

#[cfg(test)]
impl Default for Settings {
    fn default() -> Self {
        Self {
            manifest_root: PathBuf::from("/etc/meshwork/manifests"),
            workspace_timeout_secs: 120,
            workspace_poll_secs: 5,
            resync_secs: 3600,
            dry_run: false,
            disabled_subroutines: Vec::new(),
        }
    }
}
