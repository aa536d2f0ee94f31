use super::{block_on, select_services, Context};
use crate::output::{print_service_report, print_tenant_report};
use migra_core::adapter::AdapterRegistry;
use migra_core::engine::{Engine, EngineOptions, ExecutionSummary, SequentialEngine};
use migra_core::tenant::{source_from_config, TenantExecutor, TenantExecutorOptions};
use migra_core::types::Operation;
use std::sync::Arc;
use std::time::Instant;

pub fn run(ctx: &Context, service: &str, steps: u32, tenant: Option<&str>) -> anyhow::Result<()> {
    let registry = Arc::new(AdapterRegistry::with_defaults());
    let config = ctx.checked_config(&registry)?;
    let services = select_services(config, Some(service))?;
    let store = ctx.open_store();

    match tenant {
        None => {
            let engine = SequentialEngine::new(
                registry,
                store,
                EngineOptions {
                    stop_on_failure: true,
                    dry_run: false,
                    rollback_steps: steps,
                },
            );
            let start = Instant::now();
            let results = block_on(ctx.timeout, |cancel| async move {
                engine
                    .execute(&cancel, &services, Operation::Rollback)
                    .await
                    .map_err(anyhow::Error::from)
            })?;
            let summary =
                ExecutionSummary::for_services(Operation::Rollback, 1, &results, start.elapsed());
            print_service_report(&summary, &results, ctx.json)?;

            match results.first() {
                Some(r) if r.success => Ok(()),
                Some(r) => anyhow::bail!("rollback of {service} failed: {}", r.error),
                None => anyhow::bail!("rollback of {service} did not run"),
            }
        }
        Some(tenant_id) => {
            let Some(tenancy) = config.tenancy() else {
                anyhow::bail!("--tenant requires tenancy to be enabled in the configuration");
            };
            let source = source_from_config(tenancy, &config.base_dir)?;
            let executor = TenantExecutor::new(
                source,
                registry,
                store,
                TenantExecutorOptions {
                    max_parallel: 1,
                    stop_on_failure: true,
                    rollback_steps: steps,
                    only: Some(tenant_id.to_string()),
                },
            );
            let start = Instant::now();
            let results = block_on(ctx.timeout, |cancel| async move {
                executor
                    .execute(&cancel, &services, Operation::Rollback)
                    .await
                    .map_err(anyhow::Error::from)
            })?;
            let summary =
                ExecutionSummary::for_tenants(Operation::Rollback, 1, &results, start.elapsed());
            print_tenant_report(&summary, &results, ctx.json)?;

            match results.first() {
                Some(r) if r.success => Ok(()),
                Some(r) => anyhow::bail!("rollback for tenant {tenant_id} failed: {}", r.error),
                None => anyhow::bail!("rollback for tenant {tenant_id} did not run"),
            }
        }
    }
}
