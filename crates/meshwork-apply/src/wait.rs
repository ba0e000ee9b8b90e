//! Bounded readiness polling for dynamic objects
//!
//! Hierarchical scopes need the parent object converged before children
//! are applied. The wait is a simple poll with a hard deadline; exceeding
//! it yields a typed timeout error so callers can requeue instead of
//! treating it as a refusal.

use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, GroupVersionKind};
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use meshwork_common::{Error, Result};

use crate::mapper::ResourceMapper;

/// Fetches the current state of a dynamic object, `None` when absent.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectGetter: Send + Sync {
    /// Get the object's current field tree.
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<String>,
        name: &str,
    ) -> Result<Option<Value>>;
}

/// Production getter: resolves the type via the mapper, reads via a
/// dynamic Api.
pub struct KubeGetter {
    client: kube::Client,
    mapper: std::sync::Arc<dyn ResourceMapper>,
}

impl KubeGetter {
    /// Create a getter over the given client and mapper.
    pub fn new(client: kube::Client, mapper: std::sync::Arc<dyn ResourceMapper>) -> Self {
        Self { client, mapper }
    }
}

#[async_trait]
impl ObjectGetter for KubeGetter {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<String>,
        name: &str,
    ) -> Result<Option<Value>> {
        let mapping = self.mapper.resolve(gvk).await?;
        let api: Api<DynamicObject> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), &ns, &mapping.api_resource),
            None => Api::all_with(self.client.clone(), &mapping.api_resource),
        };
        let object = api.get_opt(name).await?;
        match object {
            Some(obj) => {
                let value = serde_json::to_value(&obj)
                    .map_err(|e| Error::serialization_for_kind(&gvk.kind, e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

/// Whether an object's status reports it ready: `status.phase == "Ready"`
/// or a `Ready=True` condition.
pub fn is_ready(value: &Value) -> bool {
    if value.pointer("/status/phase").and_then(Value::as_str) == Some("Ready") {
        return true;
    }
    value
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some("Ready")
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
}

/// The phase an object currently reports, for status summaries.
pub fn observed_phase(value: &Value) -> String {
    value
        .pointer("/status/phase")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

/// Poll `name` until it reports ready, up to `timeout`.
///
/// Returns the ready object's field tree. Absence counts as not ready.
/// Exceeding the deadline is an [`Error::Timeout`].
pub async fn wait_ready(
    getter: &dyn ObjectGetter,
    gvk: &GroupVersionKind,
    namespace: Option<&str>,
    name: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<Value> {
    let deadline = Instant::now() + timeout;
    loop {
        match getter.get(gvk, namespace.map(String::from), name).await? {
            Some(value) if is_ready(&value) => {
                debug!(kind = %gvk.kind, name, "object ready");
                return Ok(value);
            }
            Some(_) => debug!(kind = %gvk.kind, name, "object present, not ready"),
            None => debug!(kind = %gvk.kind, name, "object absent"),
        }
        if Instant::now() + poll > deadline {
            return Err(Error::timeout(
                format!("waiting for {} {name}", gvk.kind),
                timeout.as_secs(),
            ));
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gvk() -> GroupVersionKind {
        GroupVersionKind {
            group: "example.dev".to_string(),
            version: "v1".to_string(),
            kind: "Workspace".to_string(),
        }
    }

    #[test]
    fn phase_ready_counts() {
        assert!(is_ready(&json!({"status": {"phase": "Ready"}})));
        assert!(!is_ready(&json!({"status": {"phase": "Pending"}})));
        assert!(!is_ready(&json!({})));
    }

    #[test]
    fn ready_condition_counts() {
        assert!(is_ready(&json!({
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        })));
        assert!(!is_ready(&json!({
            "status": {"conditions": [{"type": "Ready", "status": "False"}]}
        })));
    }

    #[test]
    fn observed_phase_defaults_to_unknown() {
        assert_eq!(observed_phase(&json!({})), "Unknown");
        assert_eq!(
            observed_phase(&json!({"status": {"phase": "Initializing"}})),
            "Initializing"
        );
    }

    #[tokio::test]
    async fn returns_once_ready() {
        let mut getter = MockObjectGetter::new();
        let mut calls = 0;
        getter.expect_get().returning(move |_, _, _| {
            calls += 1;
            if calls < 3 {
                Ok(Some(json!({"status": {"phase": "Pending"}})))
            } else {
                Ok(Some(json!({"status": {"phase": "Ready"}})))
            }
        });

        let value = wait_ready(
            &getter,
            &gvk(),
            None,
            "ws",
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert!(is_ready(&value));
    }

    #[tokio::test]
    async fn absent_object_times_out() {
        let mut getter = MockObjectGetter::new();
        getter.expect_get().returning(|_, _, _| Ok(None));

        let err = wait_ready(
            &getter,
            &gvk(),
            None,
            "ws",
            Duration::from_millis(5),
            Duration::from_millis(2),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn getter_errors_propagate() {
        let mut getter = MockObjectGetter::new();
        getter
            .expect_get()
            .returning(|_, _, _| Err(Error::internal("test", "boom")));

        let err = wait_ready(
            &getter,
            &gvk(),
            None,
            "ws",
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }
}
