//! Meshwork operator entrypoint
//!
//! Runs the Tenant controller by default; `meshwork-operator crd` prints
//! the Tenant CRD YAML for out-of-band installation.

mod config;
mod context;
mod controller;
mod subroutine;
mod subroutines;
#[cfg(test)]
mod testutil;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::CustomResourceExt;
use tracing::info;

use meshwork_common::backoff::{retry_with_backoff, RetryConfig};
use meshwork_common::crd::Tenant;
use meshwork_common::telemetry::init_telemetry;
use meshwork_common::FIELD_MANAGER;

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "meshwork-operator", version, about = "Multi-tenant platform mesh operator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Subcommand)]
enum Command {
    /// Print the Tenant CRD as YAML and exit
    Crd,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Crd) = cli.command {
        print!("{}", serde_yaml::to_string(&Tenant::crd())?);
        return Ok(());
    }

    init_telemetry("meshwork-operator").context("telemetry init failed")?;

    let client = kube::Client::try_default()
        .await
        .context("failed to build kube client")?;
    install_crd(&client).await.context("CRD install failed")?;

    controller::run(client, cli.settings).await
}

/// Self-install the Tenant CRD so a fresh cluster needs no manual step.
async fn install_crd(client: &kube::Client) -> anyhow::Result<()> {
    let api: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = Tenant::crd();
    let name = crd
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| "tenants.meshwork.dev".to_string());
    // The API server may not be reachable yet when the pod starts
    retry_with_backoff(&RetryConfig::with_max_attempts(5), "apply tenant CRD", || {
        let api = api.clone();
        let crd = crd.clone();
        let name = name.clone();
        async move {
            api.patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&crd),
            )
            .await
            .map_err(meshwork_common::Error::from)
        }
    })
    .await?;
    info!(crd = %name, "Tenant CRD applied");
    Ok(())
}
