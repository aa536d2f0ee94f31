use super::{block_on, select_services, Context};
use crate::output::print_service_report;
use migra_core::adapter::AdapterRegistry;
use migra_core::engine::{
    Engine, EngineOptions, ExecutionSummary, ParallelEngine, SequentialEngine,
};
use migra_core::types::Operation;
use std::sync::Arc;
use std::time::Instant;

pub fn run(
    ctx: &Context,
    service: Option<&str>,
    dry_run: bool,
    parallel: bool,
) -> anyhow::Result<()> {
    let registry = Arc::new(AdapterRegistry::with_defaults());
    let config = ctx.checked_config(&registry)?;
    let services = select_services(config, service)?;
    let store = ctx.open_store();

    let options = EngineOptions {
        stop_on_failure: config.execution.stop_on_failure,
        dry_run,
        ..EngineOptions::default()
    };
    let engine: Box<dyn Engine> = if parallel || config.is_parallel() {
        Box::new(ParallelEngine::new(
            registry,
            store,
            options,
            config.parallel_limit(),
        ))
    } else {
        Box::new(SequentialEngine::new(registry, store, options))
    };

    let requested = services.len();
    tracing::info!(services = requested, dry_run, "starting deployment");
    let start = Instant::now();
    let results = block_on(ctx.timeout, |cancel| async move {
        engine
            .execute(&cancel, &services, Operation::Deploy)
            .await
            .map_err(anyhow::Error::from)
    })?;
    let summary = ExecutionSummary::for_services(
        Operation::Deploy,
        requested,
        &results,
        start.elapsed(),
    );

    print_service_report(&summary, &results, ctx.json)?;
    if !summary.is_success() {
        anyhow::bail!(
            "deployment finished with {} failed and {} skipped service(s)",
            summary.failed,
            summary.skipped
        );
    }
    Ok(())
}
