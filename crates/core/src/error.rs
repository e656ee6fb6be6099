//! Error taxonomy for the stock ledger.

use thiserror::Error;

/// Result type used across the ledger layers.
pub type StockResult<T> = Result<T, StockError>;

/// Ledger-level error.
///
/// Every failure a caller can observe maps to exactly one variant, so a UI can
/// render a precise message (or drive a confirmation flow) per kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// No item matches the given id or code.
    #[error("item not found: {0}")]
    ItemNotFound(String),

    /// The code already denotes an item (active or retired).
    #[error("duplicate item code: {0}")]
    DuplicateCode(String),

    /// A required field was blank or a value was malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Movement quantities must be strictly positive.
    #[error("invalid quantity {0}: must be greater than zero")]
    InvalidQuantity(i64),

    /// Applying the movement would take the balance outside the `i64` range.
    #[error("balance overflow: balance {balance}, quantity {quantity}")]
    BalanceOverflow { balance: i64, quantity: i64 },

    /// Outbound would drive the balance negative and was not confirmed.
    #[error("insufficient stock: balance {balance}, requested {requested}")]
    InsufficientStock { balance: i64, requested: i64 },

    /// The item is retired; retirement is one-way.
    #[error("item already retired: {0}")]
    AlreadyRetired(String),

    /// The store stayed locked by another writer through every retry.
    #[error("store busy after {attempts} attempt(s)")]
    StoreBusy { attempts: u32 },

    /// Non-transient storage failure (IO, corrupt row, closed pool).
    #[error("storage failure: {0}")]
    Storage(String),
}

impl StockError {
    pub fn item_not_found(key: impl core::fmt::Display) -> Self {
        Self::ItemNotFound(key.to_string())
    }

    pub fn duplicate_code(code: impl Into<String>) -> Self {
        Self::DuplicateCode(code.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn already_retired(key: impl core::fmt::Display) -> Self {
        Self::AlreadyRetired(key.to_string())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreBusy { .. })
    }
}
