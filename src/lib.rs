pub mod accounts;
pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod ledger;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::accounts::AccountStore;
use crate::api::rate_limit::RateLimiter;
use crate::ledger::{Ledger, SlotCatalogue};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub ledger: Ledger,
    pub accounts: AccountStore,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, catalogue: SlotCatalogue) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            ledger: Ledger::new(db.clone(), catalogue),
            accounts: AccountStore::new(db.clone()),
            config,
            db,
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Current lot-local time, to the minute.
    pub fn now(&self) -> chrono::NaiveDateTime {
        self.config.clock.now()
    }
}
