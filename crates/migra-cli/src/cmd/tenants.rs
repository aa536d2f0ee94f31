use super::{block_on, Context};
use crate::output::{print_json, print_table, print_tenant_report};
use anyhow::anyhow;
use clap::{Args, Subcommand};
use migra_core::adapter::AdapterRegistry;
use migra_core::config::{Config, TenancyConfig};
use migra_core::engine::ExecutionSummary;
use migra_core::tenant::{source_from_config, TenantExecutor, TenantExecutorOptions};
use migra_core::types::Operation;
use std::sync::Arc;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum TenantsSubcommand {
    /// Deploy every service for every tenant
    Deploy {
        #[command(flatten)]
        fanout: FanoutArgs,
    },

    /// Roll back every service for every tenant
    Rollback {
        /// Number of migrations to undo per service
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        steps: u32,

        #[command(flatten)]
        fanout: FanoutArgs,
    },

    /// Query applied/pending migrations for every tenant
    Status {
        #[command(flatten)]
        fanout: FanoutArgs,
    },

    /// List tenants from the configured source
    List,
}

#[derive(Args)]
pub struct FanoutArgs {
    /// Tenants processed at once (default: tenancy.max_parallel)
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Skip queued tenants after the first tenant failure
    #[arg(long)]
    stop_on_failure: bool,

    /// Only this tenant
    #[arg(long)]
    tenant: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ctx: &Context, subcmd: TenantsSubcommand) -> anyhow::Result<()> {
    match subcmd {
        TenantsSubcommand::Deploy { fanout } => fan_out(ctx, Operation::Deploy, 1, fanout),
        TenantsSubcommand::Rollback { steps, fanout } => {
            fan_out(ctx, Operation::Rollback, steps, fanout)
        }
        TenantsSubcommand::Status { fanout } => fan_out(ctx, Operation::Status, 1, fanout),
        TenantsSubcommand::List => list(ctx),
    }
}

fn tenancy(config: &Config) -> anyhow::Result<&TenancyConfig> {
    config
        .tenancy()
        .ok_or_else(|| anyhow!("tenancy is not enabled in the configuration"))
}

// ---------------------------------------------------------------------------
// deploy / rollback / status
// ---------------------------------------------------------------------------

fn fan_out(
    ctx: &Context,
    operation: Operation,
    steps: u32,
    args: FanoutArgs,
) -> anyhow::Result<()> {
    let registry = Arc::new(AdapterRegistry::with_defaults());
    let config = ctx.checked_config(&registry)?;
    let tenancy = tenancy(config)?;
    let source = source_from_config(tenancy, &config.base_dir)?;

    let options = TenantExecutorOptions {
        max_parallel: args
            .max_parallel
            .unwrap_or_else(|| usize::try_from(tenancy.max_parallel).unwrap_or(0)),
        stop_on_failure: args.stop_on_failure || tenancy.stop_on_failure,
        rollback_steps: steps,
        only: args.tenant,
    };
    let executor = TenantExecutor::new(source, registry, ctx.open_store(), options);
    let services = config.services.clone();

    let start = Instant::now();
    let (requested, results) = block_on(ctx.timeout, |cancel| async move {
        let tenants = executor.load_tenants(&cancel).await?;
        let requested = tenants.len();
        let results = executor
            .execute_tenants(&cancel, tenants, &services, operation)
            .await;
        Ok::<_, anyhow::Error>((requested, results))
    })?;
    let summary = ExecutionSummary::for_tenants(operation, requested, &results, start.elapsed());

    print_tenant_report(&summary, &results, ctx.json)?;
    if !summary.is_success() {
        anyhow::bail!(
            "tenant {} finished with {} failed and {} skipped tenant(s)",
            operation,
            summary.failed,
            summary.skipped
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.config()?;
    let tenancy = tenancy(config)?;
    let source = source_from_config(tenancy, &config.base_dir)?;
    let origin = source.describe();

    let tenants = block_on(ctx.timeout, |cancel| async move {
        source
            .load_tenants(&cancel)
            .await
            .map_err(anyhow::Error::from)
    })?;

    if ctx.json {
        // Connection values may hold credentials; only keys are shown.
        let items: Vec<_> = tenants
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "connection_keys": t.connection.keys().collect::<Vec<_>>(),
                })
            })
            .collect();
        return print_json(&serde_json::json!({ "source": origin, "tenants": items }));
    }

    let rows = tenants
        .iter()
        .map(|t| {
            vec![
                t.id.clone(),
                t.connection.keys().cloned().collect::<Vec<_>>().join(", "),
            ]
        })
        .collect();
    print_table(&["TENANT", "CONNECTION"], rows);
    println!();
    println!("{} tenant(s) from {origin}", tenants.len());
    Ok(())
}
