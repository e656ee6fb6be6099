//! Stock ledger domain module.
//!
//! This crate contains the business rules for items, codes, movements and the
//! outbound policy, implemented purely as deterministic domain logic (no IO,
//! no storage).

pub mod code;
pub mod item;
pub mod movement;
pub mod policy;
pub mod query;

pub use code::{FIRST_CODE, ItemCode, MAX_CODE, RetirementMarker, next_free_code};
pub use item::{Item, ItemDetails, ItemDraft, NewItem, StockLevel};
pub use movement::{
    Counterparty, LedgerEntry, MovementKind, MovementReceipt, MovementRecord, NewMovement,
    movement_matches_keyword, replay_balance, validate_quantity,
};
pub use policy::{OutboundAssessment, assess_outbound};
pub use query::{DEFAULT_QUERY_LIMIT, Keyword, MovementQuery, TimeRange};
