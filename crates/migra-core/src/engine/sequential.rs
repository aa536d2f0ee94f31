use super::{run_service, Engine, EngineOptions};
use crate::adapter::AdapterRegistry;
use crate::error::Result;
use crate::state::StateStore;
use crate::types::{Operation, Service, ServiceResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs services one at a time in input order.
pub struct SequentialEngine {
    registry: Arc<AdapterRegistry>,
    store: Arc<StateStore>,
    options: EngineOptions,
}

impl SequentialEngine {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        store: Arc<StateStore>,
        options: EngineOptions,
    ) -> Self {
        Self {
            registry,
            store,
            options,
        }
    }
}

#[async_trait]
impl Engine for SequentialEngine {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        services: &[Service],
        operation: Operation,
    ) -> Result<Vec<ServiceResult>> {
        let mut results = Vec::with_capacity(services.len());

        for service in services {
            if cancel.is_cancelled() {
                tracing::warn!(next = %service.name, "cancelled, not starting remaining services");
                break;
            }

            let result = run_service(
                &self.registry,
                &self.store,
                self.options,
                cancel,
                service,
                operation,
            )
            .await;
            let failed = !result.success;
            results.push(result);

            if failed && self.options.stop_on_failure {
                tracing::warn!(service = %service.name, "stopping after failure");
                break;
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DRY_RUN_OUTPUT;
    use crate::testing::{services, ScriptedAdapter};
    use tempfile::TempDir;

    fn engine(
        dir: &TempDir,
        adapter: Arc<ScriptedAdapter>,
        options: EngineOptions,
    ) -> (SequentialEngine, Arc<StateStore>) {
        let mut registry = AdapterRegistry::new();
        registry.register("mock", adapter);
        let store = Arc::new(StateStore::new(dir.path()));
        (
            SequentialEngine::new(Arc::new(registry), store.clone(), options),
            store,
        )
    }

    #[tokio::test]
    async fn runs_in_input_order() {
        let dir = TempDir::new().unwrap();
        let adapter = Arc::new(ScriptedAdapter::new());
        let (engine, store) = engine(&dir, adapter.clone(), EngineOptions::default());

        let results = engine
            .execute(&CancellationToken::new(), &services(&["a", "b", "c"]), Operation::Deploy)
            .await
            .unwrap();

        let names: Vec<_> = results.iter().map(|r| r.service_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(adapter.calls(), vec!["a", "b", "c"]);
        assert_eq!(adapter.peak_concurrency(), 1);
        assert_eq!(store.state().services.len(), 3);
    }

    #[tokio::test]
    async fn stop_on_failure_returns_through_first_failure() {
        let dir = TempDir::new().unwrap();
        let adapter = Arc::new(ScriptedAdapter::new().failing("b"));
        let (engine, store) = engine(&dir, adapter.clone(), EngineOptions::default());

        let results = engine
            .execute(
                &CancellationToken::new(),
                &services(&["a", "b", "c", "d"]),
                Operation::Deploy,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].error, "boom");
        assert_eq!(adapter.calls(), vec!["a", "b"]);
        assert!(!store.state().services.contains_key("c"));
    }

    #[tokio::test]
    async fn without_stop_on_failure_every_service_reports() {
        let dir = TempDir::new().unwrap();
        let adapter = Arc::new(ScriptedAdapter::new().failing("a").failing("c"));
        let options = EngineOptions {
            stop_on_failure: false,
            ..EngineOptions::default()
        };
        let (engine, store) = engine(&dir, adapter, options);

        let results = engine
            .execute(&CancellationToken::new(), &services(&["a", "b", "c"]), Operation::Deploy)
            .await
            .unwrap();

        let outcomes: Vec<_> = results.iter().map(|r| r.success).collect();
        assert_eq!(outcomes, vec![false, true, false]);
        let state = store.state();
        assert_eq!(state.services["a"].failure_count, 1);
        assert_eq!(state.services["b"].success_count, 1);
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let adapter = Arc::new(ScriptedAdapter::new());
        let options = EngineOptions {
            dry_run: true,
            ..EngineOptions::default()
        };
        let (engine, store) = engine(&dir, adapter.clone(), options);
        let before = store.state();

        let results = engine
            .execute(&CancellationToken::new(), &services(&["a", "b"]), Operation::Deploy)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success && r.output == DRY_RUN_OUTPUT));
        assert!(adapter.calls().is_empty());
        assert_eq!(store.state().services, before.services);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn cancelled_caller_starts_nothing() {
        let dir = TempDir::new().unwrap();
        let adapter = Arc::new(ScriptedAdapter::new());
        let (engine, _store) = engine(&dir, adapter.clone(), EngineOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = engine
            .execute(&cancel, &services(&["a", "b"]), Operation::Deploy)
            .await
            .unwrap();
        assert!(results.is_empty());
        assert!(adapter.calls().is_empty());
    }
}
