//! Custom Resource Definitions for Meshwork

mod tenant;
mod types;

pub use tenant::{
    ComponentRef, FeatureToggle, Tenant, TenantSpec, TenantStatus, TenantType, WorkspaceSummary,
};
pub use types::{aggregate_ready, find_condition, set_condition, Condition, ConditionStatus};
