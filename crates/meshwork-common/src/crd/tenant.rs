//! Tenant CRD
//!
//! A Tenant is the top-level resource driving per-tenant platform
//! provisioning: a workspace subtree in the logically-partitioned
//! control plane, admin credentials, and GitOps delivery resources kept
//! in sync with resolved component versions.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// Tenant declares one tenant of the platform mesh.
///
/// Example:
/// ```yaml
/// apiVersion: meshwork.dev/v1alpha1
/// kind: Tenant
/// metadata:
///   name: acme
/// spec:
///   displayName: Acme Corp
///   tenantType: organization
///   components:
///     - name: billing
///       reference: ghcr.io/acme/billing:1.4.2
///   features:
///     - name: experimental-dashboard
///       enabled: true
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "meshwork.dev",
    version = "v1alpha1",
    kind = "Tenant",
    status = "TenantStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.tenantType"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    /// Human-readable name shown in platform UIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Kind of tenant, controls which manifest set is provisioned
    #[serde(default)]
    pub tenant_type: TenantType,

    /// Workspace path of the parent scope this tenant nests under.
    /// Root-level tenants omit this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_workspace: Option<String>,

    /// Components delivered into this tenant's pipelines, with their
    /// artifact references (image, chart, or typed registry reference)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentRef>,

    /// Free-form per-application value overrides. These are merged over
    /// operator defaults and always survive reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<serde_json::Value>,

    /// Feature toggles projected into the tenant's feature ConfigMap.
    /// Toggles removed from this list are removed from the ConfigMap.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FeatureToggle>,
}

/// Kind of tenant being provisioned
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TenantType {
    /// Top-level organization with child workspaces
    Organization,
    /// Project scope nested under an organization
    #[default]
    Project,
}

impl TenantType {
    /// Manifest directory name for this tenant type
    pub fn manifest_dir(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Project => "project",
        }
    }
}

/// A component delivered to this tenant
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRef {
    /// Application name, used as the delivery-resource name
    pub name: String,

    /// Artifact reference string (see reference grammar); a leading `+`
    /// requests creation of missing delivery resources
    pub reference: String,

    /// Dot-separated value path the resolved version is written to.
    /// Defaults to "image.tag".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values_path: Option<String>,
}

/// A single feature toggle
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureToggle {
    /// Toggle name
    pub name: String,
    /// Whether the feature is enabled
    pub enabled: bool,
}

/// Status of a Tenant resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    /// Per-subroutine and aggregate readiness conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Generation of the spec this status reflects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Child workspaces observed for this tenant, name and phase
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workspaces: Vec<WorkspaceSummary>,
}

/// Name/phase summary of one workspace in the tenant's hierarchy
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    /// Workspace name
    pub name: String,
    /// Observed phase (e.g. "Ready", "Initializing")
    pub phase: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn tenant_crd_generates_with_expected_identity() {
        let crd = Tenant::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("tenants.meshwork.dev"));
        assert_eq!(crd.spec.group, "meshwork.dev");
        assert_eq!(crd.spec.names.kind, "Tenant");
    }

    #[test]
    fn tenant_spec_round_trips_through_yaml() {
        let yaml = r#"
displayName: Acme Corp
tenantType: organization
components:
  - name: billing
    reference: "ghcr.io/acme/billing:1.4.2"
features:
  - name: experimental-dashboard
    enabled: true
"#;
        let spec: TenantSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.tenant_type, TenantType::Organization);
        assert_eq!(spec.components.len(), 1);
        assert_eq!(spec.components[0].name, "billing");
        assert!(spec.features[0].enabled);
    }

    #[test]
    fn tenant_type_defaults_to_project() {
        let spec: TenantSpec = serde_yaml::from_str("displayName: X").unwrap();
        assert_eq!(spec.tenant_type, TenantType::Project);
        assert_eq!(spec.tenant_type.manifest_dir(), "project");
    }
}
