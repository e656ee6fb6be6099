//! Item registry service.

use tracing::{debug, info};

use stockledger_core::{ItemId, StockError, StockResult};
use stockledger_inventory::{Item, ItemCode, ItemDetails, ItemDraft, Keyword, NewItem, StockLevel};

use super::allocator::CodeAllocator;
use crate::retry::RetryPolicy;
use crate::store::StockStore;

/// How many freshly allocated codes `create_with_next_code` tries before
/// giving up on a burst of concurrent creators.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 8;

/// Item identity and master attributes.
#[derive(Debug, Clone)]
pub struct ItemRegistry<S> {
    store: S,
    allocator: CodeAllocator<S>,
    retry: RetryPolicy,
}

impl<S> ItemRegistry<S>
where
    S: StockStore,
{
    pub fn new(store: S, allocator: CodeAllocator<S>, retry: RetryPolicy) -> Self {
        Self {
            store,
            allocator,
            retry,
        }
    }

    /// Create an active item under the draft's explicit code.
    pub fn create(&self, draft: ItemDraft) -> StockResult<Item> {
        let item = draft.validate()?;
        self.insert(item)
    }

    /// Create an active item under the next free code.
    ///
    /// A concurrent creator may take the allocated code first; that shows up
    /// as `DuplicateCode` and a new code is allocated.
    pub fn create_with_next_code(&self, details: ItemDetails) -> StockResult<Item> {
        let details = details.normalized()?;
        let mut last_conflict = None;

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let code = ItemCode::active(self.allocator.next_code()?)?;
            match self.insert(NewItem {
                code: code.clone(),
                details: details.clone(),
            }) {
                Err(StockError::DuplicateCode(taken)) => {
                    debug!(attempt, code = %taken, "allocated code taken concurrently");
                    last_conflict = Some(taken);
                }
                other => return other,
            }
        }

        Err(StockError::DuplicateCode(last_conflict.unwrap_or_default()))
    }

    /// Replace code and attributes of an active item.
    pub fn update(&self, item_id: ItemId, draft: ItemDraft) -> StockResult<Item> {
        let item = draft.validate()?;
        let updated = self
            .retry
            .run("update_item", || self.store.update_item(item_id, item.clone()))?;

        info!(item_id = %updated.id, code = %updated.code, "item updated");
        Ok(updated)
    }

    /// Any item by id, retired ones included.
    pub fn get(&self, item_id: ItemId) -> StockResult<Item> {
        self.retry
            .run("item", || self.store.item(item_id))?
            .ok_or_else(|| StockError::item_not_found(item_id))
    }

    /// Active item holding `code`. Leading zeros and surrounding blanks are ignored.
    pub fn find_by_code(&self, code: &str) -> StockResult<Item> {
        let Ok(parsed) = ItemCode::parse_active(code) else {
            return Err(StockError::item_not_found(code.trim()));
        };
        self.retry
            .run("active_item_by_code", || self.store.active_item_by_code(&parsed))?
            .ok_or_else(|| StockError::item_not_found(parsed))
    }

    /// Active items matching `keyword` with their balances, by numeric code.
    pub fn search(&self, keyword: &str) -> StockResult<Vec<StockLevel>> {
        let keyword = Keyword::new(keyword);
        self.retry.run("search_items", || self.store.search_items(&keyword))
    }

    fn insert(&self, item: NewItem) -> StockResult<Item> {
        let created = self
            .retry
            .run("insert_item", || self.store.insert_item(item.clone()))?;

        info!(item_id = %created.id, code = %created.code, name = %created.details.name, "item created");
        Ok(created)
    }
}
