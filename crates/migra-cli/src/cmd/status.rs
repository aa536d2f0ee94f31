use super::{block_on, Context};
use crate::output::{print_json, print_service_report, print_table, relative_time};
use migra_core::adapter::AdapterRegistry;
use migra_core::engine::{Engine, EngineOptions, ExecutionSummary, SequentialEngine};
use migra_core::state::ServiceExecutionRecord;
use migra_core::types::Operation;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

pub fn run(ctx: &Context, live: bool) -> anyhow::Result<()> {
    if live {
        live_status(ctx)
    } else {
        recorded_status(ctx)
    }
}

fn recorded_status(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.config()?;
    let state = ctx.open_store().state();

    if ctx.json {
        let services: BTreeMap<&str, Option<&ServiceExecutionRecord>> = config
            .services
            .iter()
            .map(|s| (s.name.as_str(), state.services.get(&s.name)))
            .collect();
        return print_json(&serde_json::json!({
            "last_execution": state.last_execution,
            "services": services,
            "tenants": state.tenants.len(),
        }));
    }

    let rows = config
        .services
        .iter()
        .map(|svc| match state.services.get(&svc.name) {
            None => vec![
                svc.name.clone(),
                "never".to_string(),
                "-".to_string(),
                "0".to_string(),
                "0".to_string(),
            ],
            Some(rec) => vec![
                svc.name.clone(),
                rec.last_run
                    .map(relative_time)
                    .unwrap_or_else(|| "never".to_string()),
                rec.last_result.clone(),
                rec.success_count.to_string(),
                rec.failure_count.to_string(),
            ],
        })
        .collect();
    print_table(&["SERVICE", "LAST RUN", "RESULT", "SUCCESS", "FAILURES"], rows);

    if config.tenancy().is_some() && !state.tenants.is_empty() {
        println!();
        println!("Tenant Summary: {} tenant(s) processed", state.tenants.len());
    }
    Ok(())
}

fn live_status(ctx: &Context) -> anyhow::Result<()> {
    let registry = Arc::new(AdapterRegistry::with_defaults());
    let config = ctx.checked_config(&registry)?;
    let services = config.services.clone();
    let requested = services.len();

    let engine = SequentialEngine::new(
        registry,
        ctx.open_store(),
        EngineOptions {
            stop_on_failure: false,
            ..EngineOptions::default()
        },
    );
    let start = Instant::now();
    let results = block_on(ctx.timeout, |cancel| async move {
        engine
            .execute(&cancel, &services, Operation::Status)
            .await
            .map_err(anyhow::Error::from)
    })?;
    let summary =
        ExecutionSummary::for_services(Operation::Status, requested, &results, start.elapsed());

    print_service_report(&summary, &results, ctx.json)?;
    if !summary.is_success() {
        anyhow::bail!("status could not be read for {} service(s)", summary.failed);
    }
    Ok(())
}
