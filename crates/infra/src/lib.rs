//! Infrastructure layer: stores, retry, config, and the ledger services.

pub mod config;
pub mod retry;
pub mod services;
pub mod store;


pub use config::StoreConfig;
pub use retry::RetryPolicy;
pub use services::{CodeAllocator, ItemRegistry, Ledger, StockPolicy, Stockroom};
pub use store::{InMemoryStockStore, SqliteStockStore, StockStore, StoreError};
