//! In-memory stock store.
//!
//! Every operation runs under one write lock, so appends and balance updates
//! are applied together or not at all. Used by tests and benches.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use stockledger_core::{EntryId, ItemId, StockError};
use stockledger_inventory::{
    Item, ItemCode, Keyword, LedgerEntry, MovementQuery, MovementRecord, NewItem, NewMovement,
    StockLevel, movement_matches_keyword,
};

use super::r#trait::{
    AppendedMovement, BalanceDrift, MovementGuard, Retirement, StockStore, StoreError,
};

#[derive(Debug, Default)]
struct State {
    items: HashMap<ItemId, Item>,
    /// Every code currently held, active or retired.
    codes: HashMap<ItemCode, ItemId>,
    balances: HashMap<ItemId, i64>,
    entries: Vec<LedgerEntry>,
}

impl State {
    fn require_active(&self, item_id: ItemId) -> Result<&Item, StoreError> {
        let item = self
            .items
            .get(&item_id)
            .ok_or_else(|| StockError::item_not_found(item_id))?;
        item.ensure_active()?;
        Ok(item)
    }

    fn code_taken_by_other(&self, code: &ItemCode, item_id: ItemId) -> bool {
        self.codes.get(code).is_some_and(|owner| *owner != item_id)
    }

    fn replayed_balances(&self) -> HashMap<ItemId, i64> {
        let mut replayed: HashMap<ItemId, i64> = self.items.keys().map(|id| (*id, 0)).collect();
        for entry in &self.entries {
            *replayed.entry(entry.item_id).or_default() += entry.delta();
        }
        replayed
    }

    fn drift(&self) -> Vec<BalanceDrift> {
        let mut drift: Vec<BalanceDrift> = self
            .replayed_balances()
            .into_iter()
            .filter_map(|(item_id, replayed)| {
                let cached = self.balances.get(&item_id).copied().unwrap_or(0);
                (cached != replayed).then_some(BalanceDrift {
                    item_id,
                    cached,
                    replayed,
                })
            })
            .collect();
        drift.sort_by_key(|d| d.item_id);
        drift
    }
}

/// In-memory item registry and movement log.
///
/// Intended for tests/dev. Each operation runs under one lock, which makes it
/// trivially atomic; nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: RwLock<State>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    /// Overwrite a cached balance without touching the log.
    #[cfg(test)]
    pub(crate) fn corrupt_cached_balance(&self, item_id: ItemId, quantity: i64) {
        self.write().unwrap().balances.insert(item_id, quantity);
    }
}

impl StockStore for InMemoryStockStore {
    fn insert_item(&self, item: NewItem) -> Result<Item, StoreError> {
        let mut state = self.write()?;
        if state.codes.contains_key(&item.code) {
            return Err(StoreError::UniqueViolation(item.code.into_string()));
        }

        let item = Item::from_new(ItemId::new(), item);
        state.codes.insert(item.code.clone(), item.id);
        state.balances.insert(item.id, 0);
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    fn update_item(&self, item_id: ItemId, item: NewItem) -> Result<Item, StoreError> {
        let mut state = self.write()?;
        let old_code = state.require_active(item_id)?.code.clone();
        if state.code_taken_by_other(&item.code, item_id) {
            return Err(StoreError::UniqueViolation(item.code.into_string()));
        }

        let updated = Item {
            id: item_id,
            code: item.code,
            details: item.details,
            active: true,
        };
        state.codes.remove(&old_code);
        state.codes.insert(updated.code.clone(), item_id);
        state.items.insert(item_id, updated.clone());
        Ok(updated)
    }

    fn retire_item(&self, item_id: ItemId, at: DateTime<Utc>) -> Result<Retirement, StoreError> {
        let mut state = self.write()?;
        let current = state.require_active(item_id)?.clone();
        let freed_code = current
            .code
            .numeral()
            .ok_or_else(|| StockError::invalid_input(format!("cannot retire code {}", current.code)))?;
        let marker = current.code.retirement_marker(at)?;
        if state.code_taken_by_other(&marker, item_id) {
            return Err(StoreError::UniqueViolation(marker.into_string()));
        }

        state.codes.remove(&current.code);
        let retired = Item {
            code: marker.clone(),
            active: false,
            ..current
        };
        state.codes.insert(marker.clone(), item_id);
        state.items.insert(item_id, retired.clone());
        Ok(Retirement {
            item: retired,
            freed_code,
            marker,
        })
    }

    fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.read()?.items.get(&item_id).cloned())
    }

    fn active_item_by_code(&self, code: &ItemCode) -> Result<Option<Item>, StoreError> {
        let state = self.read()?;
        Ok(state
            .codes
            .get(code)
            .and_then(|id| state.items.get(id))
            .filter(|item| item.active)
            .cloned())
    }

    fn active_codes(&self) -> Result<Vec<u64>, StoreError> {
        let state = self.read()?;
        Ok(state
            .items
            .values()
            .filter(|item| item.active)
            .filter_map(|item| item.code.numeral())
            .collect())
    }

    fn search_items(&self, keyword: &Keyword) -> Result<Vec<StockLevel>, StoreError> {
        let state = self.read()?;
        let mut levels: Vec<StockLevel> = state
            .items
            .values()
            .filter(|item| item.active && item.matches_keyword(keyword))
            .map(|item| StockLevel {
                item: item.clone(),
                balance: state.balances.get(&item.id).copied().unwrap_or(0),
            })
            .collect();
        levels.sort_by_key(|level| (level.item.code.numeral().unwrap_or(u64::MAX), level.item.id));
        Ok(levels)
    }

    fn append_movement(
        &self,
        movement: NewMovement,
        at: DateTime<Utc>,
        guard: MovementGuard<'_>,
    ) -> Result<AppendedMovement, StoreError> {
        let mut state = self.write()?;
        let item = state
            .items
            .get(&movement.item_id)
            .cloned()
            .ok_or_else(|| StockError::item_not_found(movement.item_id))?;
        let balance_before = state.balances.get(&item.id).copied().unwrap_or(0);
        guard(&item, balance_before)?;
        let balance_after = movement.apply_to(balance_before)?;

        let timestamp = state
            .entries
            .last()
            .map_or(at, |last| at.max(last.timestamp));
        let sequence = state.entries.len() as u64 + 1;
        let entry = movement.into_entry(EntryId::new(), sequence, timestamp);

        state.entries.push(entry.clone());
        state.balances.insert(item.id, balance_after);
        Ok(AppendedMovement {
            entry,
            item,
            balance_before,
            balance_after,
        })
    }

    fn balance(&self, item_id: ItemId) -> Result<Option<i64>, StoreError> {
        let state = self.read()?;
        if !state.items.contains_key(&item_id) {
            return Ok(None);
        }
        Ok(Some(state.balances.get(&item_id).copied().unwrap_or(0)))
    }

    fn entries_for_item(&self, item_id: ItemId) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.read()?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.item_id == item_id)
            .cloned()
            .collect())
    }

    fn query_movements(&self, query: &MovementQuery) -> Result<Vec<MovementRecord>, StoreError> {
        let state = self.read()?;
        // Entries are stored in (timestamp, sequence) order already.
        let records = state
            .entries
            .iter()
            .rev()
            .filter(|e| e.kind == query.kind && query.range.contains(e.timestamp))
            .filter_map(|e| state.items.get(&e.item_id).map(|item| (e, item)))
            .filter(|(e, item)| movement_matches_keyword(e, item, &query.keyword))
            .take(query.limit)
            .map(|(e, item)| MovementRecord {
                entry: e.clone(),
                item_code: item.code.clone(),
                item_name: item.details.name.clone(),
                item_unit: item.details.unit.clone(),
            })
            .collect();
        Ok(records)
    }

    fn balance_drift(&self) -> Result<Vec<BalanceDrift>, StoreError> {
        Ok(self.read()?.drift())
    }

    fn rebuild_balances(&self) -> Result<Vec<BalanceDrift>, StoreError> {
        let mut state = self.write()?;
        let drift = state.drift();
        for d in &drift {
            state.balances.insert(d.item_id, d.replayed);
        }
        Ok(drift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockledger_inventory::{Counterparty, ItemDetails, ItemDraft, MovementKind};

    fn new_item(code: &str, name: &str) -> NewItem {
        ItemDraft::new(code, ItemDetails::new(name)).validate().unwrap()
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, minute, 0).unwrap()
    }

    fn allow_all(_: &Item, _: i64) -> stockledger_core::StockResult<()> {
        Ok(())
    }

    fn inbound(item_id: ItemId, qty: i64) -> NewMovement {
        NewMovement::new(item_id, MovementKind::Inbound, qty, Counterparty::default()).unwrap()
    }

    #[test]
    fn insert_rejects_codes_held_by_any_item() {
        let store = InMemoryStockStore::new();
        store.insert_item(new_item("10001", "Widget")).unwrap();

        let err = store.insert_item(new_item("10001", "Gadget")).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(code) if code == "10001"));
    }

    #[test]
    fn retire_frees_original_code_in_index() {
        let store = InMemoryStockStore::new();
        let item = store.insert_item(new_item("10001", "Widget")).unwrap();

        let retirement = store.retire_item(item.id, at(0)).unwrap();

        assert_eq!(retirement.freed_code, 10001);
        assert_eq!(retirement.marker.as_str(), "X10001_202604廃止");
        assert!(store.active_item_by_code(&ItemCode::from_stored("10001")).unwrap().is_none());
        assert!(store.insert_item(new_item("10001", "Widget v2")).is_ok());
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let store = InMemoryStockStore::new();
        let item = store.insert_item(new_item("10001", "Widget")).unwrap();

        let first = store.append_movement(inbound(item.id, 1), at(30), &allow_all).unwrap();
        let second = store.append_movement(inbound(item.id, 1), at(10), &allow_all).unwrap();

        assert_eq!(second.entry.timestamp, first.entry.timestamp);
        assert!(second.entry.sequence > first.entry.sequence);
    }

    #[test]
    fn rejected_guard_leaves_no_trace() {
        let store = InMemoryStockStore::new();
        let item = store.insert_item(new_item("10001", "Widget")).unwrap();

        let err = store
            .append_movement(inbound(item.id, 5), at(0), &|_, _| {
                Err(StockError::invalid_input("nope"))
            })
            .unwrap_err();

        assert!(matches!(err, StoreError::Rejected(StockError::InvalidInput(_))));
        assert!(store.entries_for_item(item.id).unwrap().is_empty());
        assert_eq!(store.balance(item.id).unwrap(), Some(0));
    }

    #[test]
    fn overflowing_append_is_rejected_and_store_stays_usable() {
        let store = InMemoryStockStore::new();
        let item = store.insert_item(new_item("10001", "Widget")).unwrap();
        store.append_movement(inbound(item.id, i64::MAX), at(0), &allow_all).unwrap();

        let err = store
            .append_movement(inbound(item.id, 1), at(1), &allow_all)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Rejected(StockError::BalanceOverflow { balance: i64::MAX, quantity: 1 })
        ));

        assert_eq!(store.balance(item.id).unwrap(), Some(i64::MAX));
        assert_eq!(store.entries_for_item(item.id).unwrap().len(), 1);
        assert!(store.balance_drift().unwrap().is_empty());
    }

    #[test]
    fn rebuild_repairs_drifted_cache() {
        let store = InMemoryStockStore::new();
        let item = store.insert_item(new_item("10001", "Widget")).unwrap();
        store.append_movement(inbound(item.id, 7), at(0), &allow_all).unwrap();
        store.corrupt_cached_balance(item.id, 99);

        let drift = store.balance_drift().unwrap();
        assert_eq!(drift, vec![BalanceDrift { item_id: item.id, cached: 99, replayed: 7 }]);

        store.rebuild_balances().unwrap();
        assert_eq!(store.balance(item.id).unwrap(), Some(7));
        assert!(store.balance_drift().unwrap().is_empty());
    }
}
