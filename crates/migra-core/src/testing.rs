//! Scripted adapters and tenant sources for engine and executor tests.

use crate::adapter::Adapter;
use crate::error::{MigraError, Result};
use crate::tenant::TenantSource;
use crate::types::{OperationResult, Service, StatusResult, Tenant};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Adapter whose outcomes are decided by service (and optionally tenant) name.
#[derive(Default)]
pub(crate) struct ScriptedAdapter {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
    rollback_steps: Mutex<Option<u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `service` for every tenant.
    pub fn failing(mut self, service: &str) -> Self {
        self.failing.insert(service.to_string());
        self
    }

    /// Fail `service` only for `tenant`.
    pub fn failing_for(mut self, tenant: &str, service: &str) -> Self {
        self.failing.insert(format!("{tenant}/{service}"));
        self
    }

    /// Panic inside the adapter call for `service`.
    pub fn panicking(mut self, service: &str) -> Self {
        self.panicking.insert(service.to_string());
        self
    }

    pub fn delay(mut self, service: &str, delay: Duration) -> Self {
        self.delays.insert(service.to_string(), delay);
        self
    }

    /// Calls in start order, as `service` or `tenant/service`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn last_rollback_steps(&self) -> Option<u32> {
        *self.rollback_steps.lock().unwrap()
    }

    async fn run(&self, service: &Service, tenant: Option<&Tenant>) -> bool {
        let key = match tenant {
            Some(t) => format!("{}/{}", t.id, service.name),
            None => service.name.clone(),
        };
        self.calls.lock().unwrap().push(key.clone());
        if self.panicking.contains(&service.name) {
            panic!("scripted panic in {key}");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(&service.name) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        !(self.failing.contains(&service.name) || self.failing.contains(&key))
    }

    fn outcome(ok: bool) -> OperationResult {
        if ok {
            OperationResult::succeeded("migrated", Duration::from_millis(1))
        } else {
            OperationResult::failed("", "boom", Duration::from_millis(1))
        }
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn deploy(
        &self,
        _cancel: &CancellationToken,
        service: &Service,
        tenant: Option<&Tenant>,
    ) -> Result<OperationResult> {
        Ok(Self::outcome(self.run(service, tenant).await))
    }

    async fn rollback(
        &self,
        _cancel: &CancellationToken,
        service: &Service,
        tenant: Option<&Tenant>,
        steps: u32,
    ) -> Result<OperationResult> {
        *self.rollback_steps.lock().unwrap() = Some(steps);
        Ok(Self::outcome(self.run(service, tenant).await))
    }

    async fn status(
        &self,
        _cancel: &CancellationToken,
        service: &Service,
        tenant: Option<&Tenant>,
    ) -> Result<StatusResult> {
        if !self.run(service, tenant).await {
            return Err(MigraError::CommandFailed {
                program: "mock".into(),
                message: "boom".into(),
            });
        }
        Ok(StatusResult {
            applied: vec!["0001_initial".into(), "0002_users".into()],
            pending: vec!["0003_orders".into()],
            last_error: None,
        })
    }
}

/// Tenant source returning a fixed list.
pub(crate) struct StaticSource(pub Vec<Tenant>);

impl StaticSource {
    pub fn ids(ids: &[&str]) -> Self {
        Self(ids.iter().map(|id| Tenant::new(*id)).collect())
    }
}

#[async_trait]
impl TenantSource for StaticSource {
    async fn load_tenants(&self, _cancel: &CancellationToken) -> Result<Vec<Tenant>> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "static list".to_string()
    }
}

pub(crate) fn services(names: &[&str]) -> Vec<Service> {
    names
        .iter()
        .map(|n| Service::new(*n, "mock", format!("/srv/{n}")))
        .collect()
}
