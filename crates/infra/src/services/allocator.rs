//! Code allocation and retirement.

use std::sync::Arc;

use tracing::info;

use stockledger_core::{Clock, ItemId, StockResult};
use stockledger_inventory::next_free_code;

use crate::retry::RetryPolicy;
use crate::store::{Retirement, StockStore};

/// Issues the next free numeric code and retires items, freeing their codes.
///
/// `next_code` is not a reservation: two callers may be handed the same
/// numeral, and whichever inserts second sees `DuplicateCode`.
#[derive(Debug, Clone)]
pub struct CodeAllocator<S> {
    store: S,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S> CodeAllocator<S>
where
    S: StockStore,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    /// Smallest numeral >= 10001 not held by an active item.
    pub fn next_code(&self) -> StockResult<u64> {
        let used = self.retry.run("active_codes", || self.store.active_codes())?;
        Ok(next_free_code(used))
    }

    /// Deactivate the item and rewrite its code to a retirement marker dated now.
    pub fn retire(&self, item_id: ItemId) -> StockResult<Retirement> {
        let at = self.clock.now();
        let retirement = self
            .retry
            .run("retire_item", || self.store.retire_item(item_id, at))?;

        info!(
            item_id = %item_id,
            freed_code = retirement.freed_code,
            marker = %retirement.marker,
            "item retired"
        );
        Ok(retirement)
    }
}
