//! Application services over a [`StockStore`].
//!
//! Each service is a thin, synchronous orchestrator: validate input, run one
//! store operation under the retry policy, log the outcome. The ledger rules
//! themselves live in `stockledger-inventory`.

mod allocator;
mod ledger;
mod policy;
mod registry;

use std::sync::Arc;

use stockledger_core::{Clock, SystemClock};

use crate::config::StoreConfig;
use crate::retry::RetryPolicy;
use crate::store::{SqliteStockStore, StockStore};

pub use allocator::CodeAllocator;
pub use ledger::Ledger;
pub use policy::StockPolicy;
pub use registry::{ItemRegistry, MAX_ALLOCATION_ATTEMPTS};

/// The four services wired to one shared store and clock.
#[derive(Debug, Clone)]
pub struct Stockroom<S> {
    pub registry: ItemRegistry<S>,
    pub allocator: CodeAllocator<S>,
    pub ledger: Ledger<S>,
    pub policy: StockPolicy<S>,
}

impl<S> Stockroom<S>
where
    S: StockStore + Clone,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        let allocator = CodeAllocator::new(store.clone(), clock.clone(), retry);
        Self {
            registry: ItemRegistry::new(store.clone(), allocator.clone(), retry),
            ledger: Ledger::new(store.clone(), clock, retry),
            policy: StockPolicy::new(store, retry),
            allocator,
        }
    }
}

impl Stockroom<Arc<SqliteStockStore>> {
    /// Open the SQLite store named by `config` with the system clock.
    pub fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStockStore::open(config)?);
        Ok(Self::new(store, Arc::new(SystemClock), config.retry))
    }
}
