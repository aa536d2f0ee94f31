pub mod deploy;
pub mod rollback;
pub mod state;
pub mod status;
pub mod tenants;
pub mod validate;

use anyhow::{anyhow, Context as _};
use migra_core::adapter::AdapterRegistry;
use migra_core::config::Config;
use migra_core::state::StateStore;
use migra_core::types::Service;
use migra_core::MigraError;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a command needs from the global flags.
pub struct Context {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: Result<Config, MigraError>,
    pub json: bool,
    pub timeout: Option<Duration>,
}

impl Context {
    pub fn config(&self) -> anyhow::Result<&Config> {
        self.config.as_ref().map_err(|e| {
            anyhow!(
                "failed to load config {}: {e}",
                self.config_path.display()
            )
        })
    }

    /// Config that passed validation; warnings are logged.
    pub fn checked_config(&self, registry: &AdapterRegistry) -> anyhow::Result<&Config> {
        let config = self.config()?;
        let warnings = config.check(registry)?;
        for w in &warnings {
            tracing::warn!("{}", w.message);
        }
        Ok(config)
    }

    /// State store for this root. An unreadable state file is not fatal:
    /// the run continues with empty history.
    pub fn open_store(&self) -> Arc<StateStore> {
        let store = StateStore::new(&self.root);
        if let Err(e) = store.load() {
            tracing::warn!(error = %e, "failed to load state, starting fresh");
        }
        Arc::new(store)
    }
}

/// Run `f` on a fresh runtime with a token cancelled by Ctrl-C or `--timeout`.
pub fn block_on<F, Fut, T>(timeout: Option<Duration>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    rt.block_on(async move {
        let cancel = CancellationToken::new();

        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping");
                on_signal.cancel();
            }
        });

        if let Some(limit) = timeout {
            let on_deadline = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::warn!(timeout = ?limit, "deadline reached, stopping");
                on_deadline.cancel();
            });
        }

        f(cancel).await
    })
}

/// All services, or only `name` when given.
pub fn select_services(config: &Config, name: Option<&str>) -> anyhow::Result<Vec<Service>> {
    match name {
        None => Ok(config.services.clone()),
        Some(name) => config
            .service(name)
            .cloned()
            .map(|s| vec![s])
            .ok_or_else(|| anyhow!("service '{name}' not found")),
    }
}
