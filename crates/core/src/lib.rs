//! `stockledger-core`: foundation building blocks for the stock ledger.
//!
//! This crate contains **pure** primitives (no storage, no IO): typed
//! identifiers, the error taxonomy shared by every layer, and the clock
//! abstraction used to stamp movements and retirements.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{StockError, StockResult};
pub use id::{EntryId, ItemId};
