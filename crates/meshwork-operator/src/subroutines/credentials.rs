//! Credentials subroutine: the tenant admin secret
//!
//! The secret is co-owned: an external identity controller injects
//! tokens/certificates into it. Desired keys are merged over the live
//! data so those externally-owned keys are never clobbered.

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::json;
use tracing::debug;

use meshwork_common::crd::Tenant;
use meshwork_common::merge::merge;
use meshwork_common::MESHWORK_SYSTEM_NAMESPACE;

use crate::context::TenantContext;
use crate::subroutine::{Outcome, Subroutine, SubroutineError, SubroutineResult};

const FINALIZER: &str = "meshwork.dev/credentials";

/// See module docs.
pub struct CredentialsSubroutine;

fn secret_name(tenant: &str) -> String {
    format!("{tenant}-admin")
}

#[async_trait]
impl Subroutine for CredentialsSubroutine {
    fn name(&self) -> &'static str {
        "Credentials"
    }

    fn finalizers(&self) -> Vec<String> {
        vec![FINALIZER.to_string()]
    }

    async fn process(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult {
        let name = tenant.name_any();
        let secret = secret_name(&name);

        let workspace_path = match &tenant.spec.parent_workspace {
            Some(parent) => format!("{parent}/{name}"),
            None => name.clone(),
        };
        let desired = json!({
            "username": format!("{name}-admin"),
            "workspace": workspace_path,
        });

        let existing = ctx
            .client
            .get_secret(MESHWORK_SYSTEM_NAMESPACE, &secret)
            .await
            .map_err(SubroutineError::classify)?
            .unwrap_or_else(|| json!({}));

        // Desired keys win; keys owned by other controllers survive
        let merged = merge(&existing, &desired).map_err(SubroutineError::classify)?;

        ctx.client
            .apply_secret(MESHWORK_SYSTEM_NAMESPACE, &secret, &name, &merged)
            .await
            .map_err(SubroutineError::classify)?;

        debug!(tenant = %name, secret = %secret, "admin secret converged");
        Ok(Outcome::Done)
    }

    async fn finalize(&self, tenant: &Tenant, ctx: &TenantContext) -> SubroutineResult {
        let name = tenant.name_any();
        ctx.client
            .delete_secret(MESHWORK_SYSTEM_NAMESPACE, &secret_name(&name))
            .await
            .map_err(SubroutineError::classify)?;
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mockall::predicate::eq;

    use meshwork_common::crd::TenantSpec;

    use crate::context::MockTenantClient;
    use crate::testutil::{tenant, test_context};

    #[tokio::test]
    async fn external_keys_survive_and_desired_keys_win() {
        let mut client = MockTenantClient::new();
        client
            .expect_get_secret()
            .with(eq(MESHWORK_SYSTEM_NAMESPACE), eq("acme-admin"))
            .returning(|_, _| {
                Ok(Some(json!({
                    "username": "stale-user",
                    "injected-token": "external",
                })))
            });
        client
            .expect_apply_secret()
            .withf(|ns, name, tenant, data| {
                ns == MESHWORK_SYSTEM_NAMESPACE
                    && name == "acme-admin"
                    && tenant == "acme"
                    && data["username"] == "acme-admin"
                    && data["injected-token"] == "external"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let (ctx, _, _) = test_context(Arc::new(client), std::env::temp_dir());
        let outcome = CredentialsSubroutine
            .process(&tenant("acme", TenantSpec::default()), &ctx)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Done);
    }

    #[tokio::test]
    async fn missing_secret_is_created_from_desired() {
        let mut client = MockTenantClient::new();
        client.expect_get_secret().returning(|_, _| Ok(None));
        client
            .expect_apply_secret()
            .withf(|_, _, _, data| data["username"] == "acme-admin" && data["workspace"] == "org/acme")
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let spec = TenantSpec {
            parent_workspace: Some("org".to_string()),
            ..TenantSpec::default()
        };
        let (ctx, _, _) = test_context(Arc::new(client), std::env::temp_dir());
        CredentialsSubroutine
            .process(&tenant("acme", spec), &ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn finalize_deletes_the_secret() {
        let mut client = MockTenantClient::new();
        client
            .expect_delete_secret()
            .with(eq(MESHWORK_SYSTEM_NAMESPACE), eq("acme-admin"))
            .times(1)
            .returning(|_, _| Ok(()));

        let (ctx, _, _) = test_context(Arc::new(client), std::env::temp_dir());
        CredentialsSubroutine
            .finalize(&tenant("acme", TenantSpec::default()), &ctx)
            .await
            .unwrap();
    }
}
