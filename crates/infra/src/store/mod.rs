//! Persistence boundary for the item registry and movement log.

pub mod in_memory;
pub mod sqlite;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use r#trait::{AppendedMovement, BalanceDrift, MovementGuard, Retirement, StockStore, StoreError};
pub use sqlite::SqliteStockStore;
