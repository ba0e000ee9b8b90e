//! Common types for Meshwork: CRDs, errors, and the core engines
//! (deep merge, reference parsing, version propagation).

#![deny(missing_docs)]

pub mod backoff;
pub mod crd;
pub mod error;
pub mod merge;
pub mod reference;
pub mod template;
pub mod telemetry;
pub mod versions;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace for Meshwork system resources (operator, tenant metadata)
pub const MESHWORK_SYSTEM_NAMESPACE: &str = "meshwork-system";

/// Field manager identity used for server-side apply patches
pub const FIELD_MANAGER: &str = "meshwork-controller";

/// Label toggled on a Tenant to force reprocessing without a spec change
pub const REFRESH_LABEL: &str = "meshwork.dev/refresh";

/// Label on dependent objects (ConfigMaps) naming their owning Tenant
pub const TENANT_LABEL: &str = "meshwork.dev/tenant";
