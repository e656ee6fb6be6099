use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{ItemId, StockError, StockResult};
use stockledger_inventory::{
    Item, ItemCode, Keyword, LedgerEntry, MovementQuery, MovementRecord, NewItem, NewMovement,
    StockLevel,
};

/// Storage-boundary error.
///
/// These are **infrastructure** outcomes (locking, constraint violations, IO)
/// as opposed to the ledger rules, which travel through `Rejected`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer holds the store; the operation may be retried.
    #[error("store busy: {0}")]
    Busy(String),

    /// A write would have given two items the same code.
    #[error("unique code violation: {0}")]
    UniqueViolation(String),

    /// A ledger rule evaluated inside the transaction refused the operation.
    #[error(transparent)]
    Rejected(StockError),

    /// Anything else the backend reported.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for StockError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Busy(_) => StockError::StoreBusy { attempts: 1 },
            StoreError::UniqueViolation(code) => StockError::DuplicateCode(code),
            StoreError::Rejected(err) => err,
            StoreError::Backend(msg) => StockError::Storage(msg),
        }
    }
}

impl From<StockError> for StoreError {
    fn from(value: StockError) -> Self {
        StoreError::Rejected(value)
    }
}

/// Check run inside the append transaction against the item and its balance
/// before the entry is written.
pub type MovementGuard<'a> = &'a dyn Fn(&Item, i64) -> StockResult<()>;

/// Result of a committed append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedMovement {
    pub entry: LedgerEntry,
    /// Item as it was inside the transaction.
    pub item: Item,
    pub balance_before: i64,
    pub balance_after: i64,
}

/// Result of a committed retirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retirement {
    /// The item after retirement (inactive, marker code).
    pub item: Item,
    /// Numeral released for reuse.
    pub freed_code: u64,
    pub marker: ItemCode,
}

/// A cached balance that disagrees with the replayed log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDrift {
    pub item_id: ItemId,
    pub cached: i64,
    pub replayed: i64,
}

/// Persisted item registry plus append-only movement log.
///
/// ## Atomicity
///
/// Every mutating method is one transaction: either all of its effects become
/// visible or none do. In particular `append_movement` writes the entry and
/// the cached balance together, and `retire_item` flips `active` and rewrites
/// the code together.
///
/// ## Ordering
///
/// `append_movement` assigns a `sequence` strictly greater than every earlier
/// entry and never stamps a timestamp earlier than the latest one, so
/// `(timestamp, sequence)` totally orders the log.
///
/// ## Contention
///
/// A backend shared with other processes reports lock contention as
/// `StoreError::Busy`; callers decide whether to retry.
pub trait StockStore: Send + Sync {
    /// Insert an active item and a zero balance row.
    fn insert_item(&self, item: NewItem) -> Result<Item, StoreError>;

    /// Replace code and attributes of an active item.
    fn update_item(&self, item_id: ItemId, item: NewItem) -> Result<Item, StoreError>;

    /// Deactivate an item and rewrite its code to the marker for `at`.
    fn retire_item(&self, item_id: ItemId, at: DateTime<Utc>) -> Result<Retirement, StoreError>;

    /// Any item by id, retired ones included.
    fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError>;

    fn active_item_by_code(&self, code: &ItemCode) -> Result<Option<Item>, StoreError>;

    /// Numerals held by active items.
    fn active_codes(&self) -> Result<Vec<u64>, StoreError>;

    /// Active items matching `keyword`, ordered by numeric code.
    fn search_items(&self, keyword: &Keyword) -> Result<Vec<StockLevel>, StoreError>;

    /// Append one movement and apply its delta to the cached balance.
    fn append_movement(
        &self,
        movement: NewMovement,
        at: DateTime<Utc>,
        guard: MovementGuard<'_>,
    ) -> Result<AppendedMovement, StoreError>;

    /// Cached balance; `None` if the item does not exist.
    fn balance(&self, item_id: ItemId) -> Result<Option<i64>, StoreError>;

    /// Every entry for one item, in insertion order.
    fn entries_for_item(&self, item_id: ItemId) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Newest-first filtered view of the log.
    fn query_movements(&self, query: &MovementQuery) -> Result<Vec<MovementRecord>, StoreError>;

    /// Cached balances that disagree with a full replay.
    fn balance_drift(&self) -> Result<Vec<BalanceDrift>, StoreError>;

    /// Overwrite every drifting cached balance with its replayed value.
    fn rebuild_balances(&self) -> Result<Vec<BalanceDrift>, StoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn insert_item(&self, item: NewItem) -> Result<Item, StoreError> {
        (**self).insert_item(item)
    }

    fn update_item(&self, item_id: ItemId, item: NewItem) -> Result<Item, StoreError> {
        (**self).update_item(item_id, item)
    }

    fn retire_item(&self, item_id: ItemId, at: DateTime<Utc>) -> Result<Retirement, StoreError> {
        (**self).retire_item(item_id, at)
    }

    fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).item(item_id)
    }

    fn active_item_by_code(&self, code: &ItemCode) -> Result<Option<Item>, StoreError> {
        (**self).active_item_by_code(code)
    }

    fn active_codes(&self) -> Result<Vec<u64>, StoreError> {
        (**self).active_codes()
    }

    fn search_items(&self, keyword: &Keyword) -> Result<Vec<StockLevel>, StoreError> {
        (**self).search_items(keyword)
    }

    fn append_movement(
        &self,
        movement: NewMovement,
        at: DateTime<Utc>,
        guard: MovementGuard<'_>,
    ) -> Result<AppendedMovement, StoreError> {
        (**self).append_movement(movement, at, guard)
    }

    fn balance(&self, item_id: ItemId) -> Result<Option<i64>, StoreError> {
        (**self).balance(item_id)
    }

    fn entries_for_item(&self, item_id: ItemId) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).entries_for_item(item_id)
    }

    fn query_movements(&self, query: &MovementQuery) -> Result<Vec<MovementRecord>, StoreError> {
        (**self).query_movements(query)
    }

    fn balance_drift(&self) -> Result<Vec<BalanceDrift>, StoreError> {
        (**self).balance_drift()
    }

    fn rebuild_balances(&self) -> Result<Vec<BalanceDrift>, StoreError> {
        (**self).rebuild_balances()
    }
}
