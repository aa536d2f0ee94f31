//! Framework adapters.
//!
//! An [`Adapter`] turns an abstract [`Operation`](crate::types::Operation)
//! into a concrete external command for one service (optionally scoped to a
//! tenant) and normalizes the outcome. The [`AdapterRegistry`] maps a
//! service's `type` string to the adapter that handles it.

mod command;
mod django;
mod laravel;
mod prisma;

pub use command::{run_command, sanitize_output};
pub use django::DjangoAdapter;
pub use laravel::LaravelAdapter;
pub use prisma::PrismaAdapter;

use crate::error::{MigraError, Result};
use crate::types::{OperationResult, Service, StatusResult, Tenant};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const FRAMEWORK_DJANGO: &str = "django";
pub const FRAMEWORK_LARAVEL: &str = "laravel";
pub const FRAMEWORK_PRISMA: &str = "prisma";

/// Per-framework migration strategy.
///
/// `cancel` is the caller's token. Implementations must stop their external
/// work when it fires and must not treat any other signal as a reason to
/// abort. Operations a framework cannot perform return
/// [`MigraError::UnsupportedOperation`].
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    async fn deploy(
        &self,
        cancel: &CancellationToken,
        service: &Service,
        tenant: Option<&Tenant>,
    ) -> Result<OperationResult>;

    async fn rollback(
        &self,
        cancel: &CancellationToken,
        service: &Service,
        tenant: Option<&Tenant>,
        steps: u32,
    ) -> Result<OperationResult>;

    async fn status(
        &self,
        cancel: &CancellationToken,
        service: &Service,
        tenant: Option<&Tenant>,
    ) -> Result<StatusResult>;

    /// External program this adapter shells out to, if any.
    fn program(&self) -> Option<&str> {
        None
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in django, laravel and prisma adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(FRAMEWORK_DJANGO, Arc::new(DjangoAdapter::new()));
        registry.register(FRAMEWORK_LARAVEL, Arc::new(LaravelAdapter::new()));
        registry.register(FRAMEWORK_PRISMA, Arc::new(PrismaAdapter::new()));
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(kind.into(), adapter);
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn Adapter>> {
        self.adapters
            .get(kind)
            .cloned()
            .ok_or_else(|| MigraError::AdapterNotFound(kind.to_string()))
    }

    pub fn get_for_service(&self, service: &Service) -> Result<Arc<dyn Adapter>> {
        self.get(&service.kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(|k| k.as_str())
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.adapters.contains_key(kind)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("kinds", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
