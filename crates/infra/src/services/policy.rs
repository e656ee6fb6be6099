//! Outbound preview.

use stockledger_core::{ItemId, StockError, StockResult};
use stockledger_inventory::{OutboundAssessment, assess_outbound, validate_quantity};

use crate::retry::RetryPolicy;
use crate::store::StockStore;

/// Read-only preview of what `Ledger::record_outbound` would decide.
#[derive(Debug, Clone)]
pub struct StockPolicy<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S> StockPolicy<S>
where
    S: StockStore,
{
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn evaluate_outbound(&self, item_id: ItemId, quantity: i64) -> StockResult<OutboundAssessment> {
        let quantity = validate_quantity(quantity)?;
        let item = self
            .retry
            .run("item", || self.store.item(item_id))?
            .ok_or_else(|| StockError::item_not_found(item_id))?;
        item.ensure_active()?;
        let balance = self
            .retry
            .run("balance", || self.store.balance(item_id))?
            .unwrap_or(0);

        assess_outbound(balance, item.safety_stock(), quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use stockledger_inventory::{Counterparty, ItemDetails, ItemDraft, MovementKind, NewMovement};

    use crate::store::InMemoryStockStore;

    fn stocked(quantity: i64, safety: u32) -> (StockPolicy<Arc<InMemoryStockStore>>, ItemId) {
        let store = Arc::new(InMemoryStockStore::new());
        let item = store
            .insert_item(
                ItemDraft::new("10001", ItemDetails::new("Widget").safety_stock(safety))
                    .validate()
                    .unwrap(),
            )
            .unwrap();
        let movement = NewMovement::new(item.id, MovementKind::Inbound, quantity, Counterparty::default()).unwrap();
        store.append_movement(movement, Utc::now(), &|_, _| Ok(())).unwrap();
        (StockPolicy::new(store, RetryPolicy::no_retry()), item.id)
    }

    #[test]
    fn preview_matches_outbound_rules() {
        let (policy, id) = stocked(20, 5);

        let fine = policy.evaluate_outbound(id, 10).unwrap();
        assert!(fine.ok && !fine.below_safety_after);

        let low = policy.evaluate_outbound(id, 18).unwrap();
        assert!(low.ok && low.below_safety_after);
        assert_eq!(low.projected, 2);

        let short = policy.evaluate_outbound(id, 25).unwrap();
        assert!(!short.ok && short.requires_confirmation);
        assert_eq!(short.balance, 20);
        assert_eq!(short.projected, -5);
    }

    #[test]
    fn preview_changes_nothing() {
        let (policy, id) = stocked(3, 0);
        policy.evaluate_outbound(id, 100).unwrap();
        assert_eq!(policy.store.balance(id).unwrap(), Some(3));
        assert_eq!(policy.store.entries_for_item(id).unwrap().len(), 1);
    }

    #[test]
    fn preview_of_a_huge_outbound_on_negative_stock_is_an_error() {
        let (policy, id) = stocked(1, 0);
        let forced = NewMovement::new(id, MovementKind::Outbound, 6, Counterparty::default()).unwrap();
        policy.store.append_movement(forced, Utc::now(), &|_, _| Ok(())).unwrap();

        assert_eq!(
            policy.evaluate_outbound(id, i64::MAX),
            Err(StockError::BalanceOverflow { balance: -5, quantity: i64::MAX })
        );
        assert_eq!(policy.evaluate_outbound(id, 1).unwrap().projected, -6);
    }

    #[test]
    fn preview_rejects_bad_quantity_and_unknown_items() {
        let (policy, _) = stocked(1, 0);
        assert_eq!(policy.evaluate_outbound(ItemId::new(), 0), Err(StockError::InvalidQuantity(0)));
        assert!(matches!(policy.evaluate_outbound(ItemId::new(), 1), Err(StockError::ItemNotFound(_))));
    }
}
