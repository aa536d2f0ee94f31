use super::{effective_limit, run_service, Engine, EngineOptions};
use crate::adapter::AdapterRegistry;
use crate::error::Result;
use crate::state::StateStore;
use crate::types::{Operation, Service, ServiceResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Runs every service in its own task, at most `max_parallel` at a time.
///
/// With stop-on-failure, the first failing result (or a panicking task)
/// raises a stop signal.
/// Tasks still waiting for a slot (or admitted but not yet dispatched) see
/// it and return without a result; tasks already talking to an adapter run
/// to completion.
pub struct ParallelEngine {
    registry: Arc<AdapterRegistry>,
    store: Arc<StateStore>,
    options: EngineOptions,
    max_parallel: usize,
}

impl ParallelEngine {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: Arc<StateStore>,
        options: EngineOptions,
        max_parallel: usize,
    ) -> Self {
        Self {
            registry,
            store,
            options,
            max_parallel: effective_limit(max_parallel),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }
}

#[async_trait]
impl Engine for ParallelEngine {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        services: &[Service],
        operation: Operation,
    ) -> Result<Vec<ServiceResult>> {
        // Child of the caller's token: a caller cancel also closes the gate,
        // our own stop never propagates upward.
        let stop = cancel.child_token();
        let gate = Arc::new(Semaphore::new(self.max_parallel));

        let mut handles = Vec::with_capacity(services.len());
        for service in services.iter().cloned() {
            let gate = gate.clone();
            let stop = stop.clone();
            let cancel = cancel.clone();
            let registry = self.registry.clone();
            let store = self.store.clone();
            let options = self.options;

            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = stop.cancelled() => return None,
                    permit = gate.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => return None,
                    },
                };
                if stop.is_cancelled() {
                    tracing::debug!(service = %service.name, "skipped after stop");
                    return None;
                }

                // Raises the stop signal on a failed result and on unwind.
                let guard = options.stop_on_failure.then(|| stop.clone().drop_guard());
                let result =
                    run_service(&registry, &store, options, &cancel, &service, operation).await;
                if result.success {
                    if let Some(guard) = guard {
                        guard.disarm();
                    }
                }
                Some(result)
            }));
        }

        let mut slots: Vec<Option<ServiceResult>> = vec![None; services.len()];
        for (idx, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(result) => slots[idx] = result,
                Err(e) => {
                    let name = &services[idx].name;
                    let error = format!("execution task failed: {e}");
                    tracing::error!(service = %name, error = %e, "execution task failed");
                    if !self.options.dry_run {
                        if let Err(e) = self.store.record_service_execution(
                            name,
                            false,
                            Duration::ZERO,
                            Some(&error),
                        ) {
                            tracing::warn!(service = %name, error = %e, "failed to record execution state");
                        }
                    }
                    slots[idx] = Some(ServiceResult {
                        service_name: name.clone(),
                        success: false,
                        duration: Duration::ZERO,
                        error,
                        output: String::new(),
                    });
                }
            }
        }

        let results: Vec<ServiceResult> = slots.into_iter().flatten().collect();
        if results.len() < services.len() {
            tracing::warn!(
                requested = services.len(),
                completed = results.len(),
                "some services were skipped"
            );
        }
        Ok(results)
    }
}
