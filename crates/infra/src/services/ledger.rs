//! Movement recording and balance queries.
//!
//! Every append goes through `StockStore::append_movement`, which evaluates a
//! guard against the item and its balance inside the store transaction. The
//! outbound guard is the same `assess_outbound` decision `StockPolicy`
//! previews, so a preview and the real append can only disagree if another
//! writer moved the balance in between.

use std::sync::Arc;

use tracing::{info, warn};

use stockledger_core::{Clock, ItemId, StockError, StockResult};
use stockledger_inventory::{
    Counterparty, Item, LedgerEntry, MovementKind, MovementQuery, MovementReceipt, MovementRecord,
    NewMovement, assess_outbound, replay_balance,
};

use crate::retry::RetryPolicy;
use crate::store::{AppendedMovement, BalanceDrift, MovementGuard, StockStore};

/// Append-only movement log and the balances derived from it.
#[derive(Debug, Clone)]
pub struct Ledger<S> {
    store: S,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl<S> Ledger<S>
where
    S: StockStore,
{
    pub fn new(store: S, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self { store, clock, retry }
    }

    pub fn record_inbound(
        &self,
        item_id: ItemId,
        quantity: i64,
        counterparty: Counterparty,
    ) -> StockResult<MovementReceipt> {
        let movement = NewMovement::new(item_id, MovementKind::Inbound, quantity, counterparty)?;
        let guard = |item: &Item, _balance: i64| item.ensure_active();
        let appended = self.append(movement, &guard)?;

        info!(
            item_id = %item_id,
            code = %appended.item.code,
            quantity,
            balance = appended.balance_after,
            "inbound recorded"
        );
        Ok(MovementReceipt {
            entry: appended.entry,
            balance_after: appended.balance_after,
            below_safety_stock: false,
            went_negative: false,
        })
    }

    /// Record an outbound movement.
    ///
    /// Without `allow_negative`, an outbound that would leave a negative
    /// balance fails with `InsufficientStock` and appends nothing.
    pub fn record_outbound(
        &self,
        item_id: ItemId,
        quantity: i64,
        counterparty: Counterparty,
        allow_negative: bool,
    ) -> StockResult<MovementReceipt> {
        let movement = NewMovement::new(item_id, MovementKind::Outbound, quantity, counterparty)?;
        let guard = |item: &Item, balance: i64| -> StockResult<()> {
            item.ensure_active()?;
            assess_outbound(balance, item.safety_stock(), quantity)?.authorize(allow_negative)?;
            Ok(())
        };
        let appended = self.append(movement, &guard)?;

        let assessment = assess_outbound(appended.balance_before, appended.item.safety_stock(), quantity)?;
        let receipt = MovementReceipt {
            entry: appended.entry,
            balance_after: appended.balance_after,
            below_safety_stock: assessment.below_safety_after,
            went_negative: appended.balance_after < 0,
        };

        info!(
            item_id = %item_id,
            code = %appended.item.code,
            quantity,
            balance = receipt.balance_after,
            "outbound recorded"
        );
        if receipt.went_negative {
            warn!(item_id = %item_id, balance = receipt.balance_after, "forced outbound left a negative balance");
        } else if receipt.below_safety_stock {
            warn!(
                item_id = %item_id,
                balance = receipt.balance_after,
                safety_stock = appended.item.details.safety_stock,
                "balance below safety stock"
            );
        }
        Ok(receipt)
    }

    /// Cached balance; may be negative after a forced outbound.
    pub fn balance(&self, item_id: ItemId) -> StockResult<i64> {
        self.retry
            .run("balance", || self.store.balance(item_id))?
            .ok_or_else(|| StockError::item_not_found(item_id))
    }

    /// Balance recomputed from the full log, ignoring the cache.
    pub fn replay_balance(&self, item_id: ItemId) -> StockResult<i64> {
        let entries = self.history(item_id)?;
        Ok(replay_balance(&entries, item_id))
    }

    /// Every entry for one item, retired or not, in insertion order.
    pub fn history(&self, item_id: ItemId) -> StockResult<Vec<LedgerEntry>> {
        if self.retry.run("item", || self.store.item(item_id))?.is_none() {
            return Err(StockError::item_not_found(item_id));
        }
        self.retry
            .run("entries_for_item", || self.store.entries_for_item(item_id))
    }

    /// Newest-first filtered view of the log, truncated to `query.limit`.
    pub fn query(&self, query: &MovementQuery) -> StockResult<Vec<MovementRecord>> {
        self.retry.run("query_movements", || self.store.query_movements(query))
    }

    /// Cached balances that disagree with the log. Empty when consistent.
    pub fn verify_balances(&self) -> StockResult<Vec<BalanceDrift>> {
        self.retry.run("balance_drift", || self.store.balance_drift())
    }

    /// Rewrite every drifting cached balance from a full replay.
    pub fn rebuild_balances(&self) -> StockResult<Vec<BalanceDrift>> {
        let repaired = self
            .retry
            .run("rebuild_balances", || self.store.rebuild_balances())?;

        if repaired.is_empty() {
            info!("balances consistent with ledger");
        } else {
            for drift in &repaired {
                warn!(
                    item_id = %drift.item_id,
                    cached = drift.cached,
                    replayed = drift.replayed,
                    "repaired drifted balance"
                );
            }
        }
        Ok(repaired)
    }

    fn append(
        &self,
        movement: NewMovement,
        guard: MovementGuard<'_>,
    ) -> StockResult<AppendedMovement> {
        let at = self.clock.now();
        self.retry.run("append_movement", || {
            self.store.append_movement(movement.clone(), at, guard)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone, Utc};
    use stockledger_core::FixedClock;
    use stockledger_inventory::{ItemDetails, ItemDraft, TimeRange};

    use crate::store::InMemoryStockStore;

    struct Fixture {
        store: Arc<InMemoryStockStore>,
        clock: FixedClock,
        ledger: Ledger<Arc<InMemoryStockStore>>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStockStore::new());
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap());
        let ledger = Ledger::new(store.clone(), Arc::new(clock.clone()), RetryPolicy::no_retry());
        Fixture { store, clock, ledger }
    }

    fn item(store: &InMemoryStockStore, code: &str, name: &str, safety: u32) -> Item {
        store
            .insert_item(
                ItemDraft::new(code, ItemDetails::new(name).safety_stock(safety))
                    .validate()
                    .unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn inbound_increments_balance() {
        let f = fixture();
        let widget = item(&f.store, "10001", "Widget", 0);

        let receipt = f
            .ledger
            .record_inbound(widget.id, 20, Counterparty::default().supplier("ACME"))
            .unwrap();

        assert_eq!(receipt.balance_after, 20);
        assert_eq!(receipt.entry.kind, MovementKind::Inbound);
        assert_eq!(f.ledger.balance(widget.id).unwrap(), 20);
    }

    #[test]
    fn invalid_quantity_is_checked_before_lookup() {
        let f = fixture();
        assert_eq!(
            f.ledger.record_inbound(ItemId::new(), 0, Counterparty::default()),
            Err(StockError::InvalidQuantity(0))
        );
        assert_eq!(
            f.ledger.record_outbound(ItemId::new(), -3, Counterparty::default(), true),
            Err(StockError::InvalidQuantity(-3))
        );
    }

    #[test]
    fn unknown_item_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.ledger.record_inbound(ItemId::new(), 1, Counterparty::default()),
            Err(StockError::ItemNotFound(_))
        ));
        assert!(matches!(f.ledger.balance(ItemId::new()), Err(StockError::ItemNotFound(_))));
        assert!(matches!(f.ledger.history(ItemId::new()), Err(StockError::ItemNotFound(_))));
    }

    #[test]
    fn outbound_below_safety_stock_is_advisory() {
        let f = fixture();
        let widget = item(&f.store, "10001", "Widget", 5);
        f.ledger.record_inbound(widget.id, 20, Counterparty::default()).unwrap();

        let receipt = f
            .ledger
            .record_outbound(widget.id, 18, Counterparty::default(), false)
            .unwrap();

        assert_eq!(receipt.balance_after, 2);
        assert!(receipt.below_safety_stock);
        assert!(!receipt.went_negative);
    }

    #[test]
    fn insufficient_stock_appends_nothing() {
        let f = fixture();
        let widget = item(&f.store, "10001", "Widget", 0);
        f.ledger.record_inbound(widget.id, 2, Counterparty::default()).unwrap();

        assert_eq!(
            f.ledger.record_outbound(widget.id, 5, Counterparty::default(), false),
            Err(StockError::InsufficientStock { balance: 2, requested: 5 })
        );
        assert_eq!(f.ledger.balance(widget.id).unwrap(), 2);
        assert_eq!(f.ledger.history(widget.id).unwrap().len(), 1);
    }

    #[test]
    fn forced_outbound_goes_negative() {
        let f = fixture();
        let widget = item(&f.store, "10001", "Widget", 5);
        f.ledger.record_inbound(widget.id, 2, Counterparty::default()).unwrap();

        let receipt = f
            .ledger
            .record_outbound(widget.id, 5, Counterparty::default().reason("stocktake correction"), true)
            .unwrap();

        assert_eq!(receipt.balance_after, -3);
        assert!(receipt.went_negative);
        assert!(!receipt.below_safety_stock);
        assert_eq!(f.ledger.replay_balance(widget.id).unwrap(), -3);
    }

    #[test]
    fn retired_items_accept_no_movements_but_keep_history() {
        let f = fixture();
        let widget = item(&f.store, "10001", "Widget", 0);
        f.ledger.record_inbound(widget.id, 4, Counterparty::default()).unwrap();
        f.store.retire_item(widget.id, f.clock.now()).unwrap();

        assert!(matches!(
            f.ledger.record_inbound(widget.id, 1, Counterparty::default()),
            Err(StockError::AlreadyRetired(_))
        ));
        assert!(matches!(
            f.ledger.record_outbound(widget.id, 1, Counterparty::default(), false),
            Err(StockError::AlreadyRetired(_))
        ));
        assert_eq!(f.ledger.history(widget.id).unwrap().len(), 1);
        assert_eq!(f.ledger.balance(widget.id).unwrap(), 4);
    }

    #[test]
    fn query_filters_kind_range_and_keyword_newest_first() {
        let f = fixture();
        let widget = item(&f.store, "10001", "Widget", 0);
        let bolt = item(&f.store, "10002", "Bolt", 0);

        f.ledger.record_inbound(widget.id, 50, Counterparty::default()).unwrap();
        f.ledger.record_inbound(bolt.id, 50, Counterparty::default()).unwrap();
        f.clock.advance(Duration::days(40));
        f.ledger
            .record_outbound(widget.id, 1, Counterparty::default().destination("Line 1"), false)
            .unwrap();
        f.clock.advance(Duration::hours(1));
        f.ledger
            .record_outbound(widget.id, 2, Counterparty::default().destination("Line 2"), false)
            .unwrap();
        f.ledger
            .record_outbound(bolt.id, 3, Counterparty::default().requester("widget team"), false)
            .unwrap();

        let outbound = f
            .ledger
            .query(&MovementQuery::new(MovementKind::Outbound).keyword("WIDGET"))
            .unwrap();
        let quantities: Vec<_> = outbound.iter().map(|r| r.entry.quantity).collect();
        assert_eq!(quantities, vec![3, 2, 1]);
        assert!(outbound.iter().all(|r| r.entry.kind == MovementKind::Outbound));
        assert_eq!(outbound[1].item_code.as_str(), "10001");

        let march = f
            .ledger
            .query(&MovementQuery::new(MovementKind::Outbound).range(TimeRange::month(2026, 3).unwrap()))
            .unwrap();
        assert_eq!(march.len(), 3);

        let february = f
            .ledger
            .query(&MovementQuery::new(MovementKind::Inbound).range(TimeRange::month(2026, 2).unwrap()))
            .unwrap();
        assert_eq!(february.len(), 2);

        let limited = f
            .ledger
            .query(&MovementQuery::new(MovementKind::Outbound).limit(1))
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].entry.quantity, 3);
    }

    #[test]
    fn rebuild_reports_and_repairs_drift() {
        let f = fixture();
        let widget = item(&f.store, "10001", "Widget", 0);
        f.ledger.record_inbound(widget.id, 9, Counterparty::default()).unwrap();
        assert!(f.ledger.verify_balances().unwrap().is_empty());

        f.store.corrupt_cached_balance(widget.id, 0);
        assert_eq!(f.ledger.verify_balances().unwrap().len(), 1);

        let repaired = f.ledger.rebuild_balances().unwrap();
        assert_eq!(repaired[0].replayed, 9);
        assert_eq!(f.ledger.balance(widget.id).unwrap(), 9);
    }
}
