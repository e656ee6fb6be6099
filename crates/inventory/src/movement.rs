//! Ledger entries: the append-only record of stock movements.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{EntryId, ItemId, StockError, StockResult};

use crate::code::ItemCode;
use crate::item::{Item, non_blank};
use crate::query::Keyword;

/// Direction of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Inbound,
    Outbound,
}

impl MovementKind {
    /// Stored form (`IN` / `OUT`).
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inbound => "IN",
            MovementKind::Outbound => "OUT",
        }
    }

    /// Effect of one unit of this movement on the balance.
    pub fn sign(&self) -> i64 {
        match self {
            MovementKind::Inbound => 1,
            MovementKind::Outbound => -1,
        }
    }
}

impl FromStr for MovementKind {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(MovementKind::Inbound),
            "OUT" => Ok(MovementKind::Outbound),
            other => Err(StockError::invalid_input(format!("unknown movement kind: {other}"))),
        }
    }
}

/// Free-text context of a movement, kept for audit and reporting only.
///
/// Inbound movements usually fill `supplier`/`operator`; outbound ones
/// `destination`/`requester`/`handler`. Nothing here affects balances.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counterparty {
    pub supplier: Option<String>,
    pub destination: Option<String>,
    pub requester: Option<String>,
    pub handler: Option<String>,
    pub operator: Option<String>,
    pub reason: Option<String>,
    pub memo: Option<String>,
}

impl Counterparty {
    pub fn supplier(mut self, v: impl Into<String>) -> Self {
        self.supplier = Some(v.into());
        self
    }

    pub fn destination(mut self, v: impl Into<String>) -> Self {
        self.destination = Some(v.into());
        self
    }

    pub fn requester(mut self, v: impl Into<String>) -> Self {
        self.requester = Some(v.into());
        self
    }

    pub fn handler(mut self, v: impl Into<String>) -> Self {
        self.handler = Some(v.into());
        self
    }

    pub fn operator(mut self, v: impl Into<String>) -> Self {
        self.operator = Some(v.into());
        self
    }

    pub fn reason(mut self, v: impl Into<String>) -> Self {
        self.reason = Some(v.into());
        self
    }

    pub fn memo(mut self, v: impl Into<String>) -> Self {
        self.memo = Some(v.into());
        self
    }

    pub fn normalized(self) -> Self {
        Self {
            supplier: non_blank(self.supplier),
            destination: non_blank(self.destination),
            requester: non_blank(self.requester),
            handler: non_blank(self.handler),
            operator: non_blank(self.operator),
            reason: non_blank(self.reason),
            memo: non_blank(self.memo),
        }
    }

    pub fn fields(&self) -> [Option<&str>; 7] {
        [
            self.supplier.as_deref(),
            self.destination.as_deref(),
            self.requester.as_deref(),
            self.handler.as_deref(),
            self.operator.as_deref(),
            self.reason.as_deref(),
            self.memo.as_deref(),
        ]
    }
}

/// Reject zero and negative quantities.
pub fn validate_quantity(quantity: i64) -> StockResult<i64> {
    if quantity <= 0 {
        return Err(StockError::InvalidQuantity(quantity));
    }
    Ok(quantity)
}

/// A movement ready to be appended (not yet assigned id, sequence or timestamp).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub item_id: ItemId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub counterparty: Counterparty,
}

impl NewMovement {
    pub fn new(
        item_id: ItemId,
        kind: MovementKind,
        quantity: i64,
        counterparty: Counterparty,
    ) -> StockResult<Self> {
        Ok(Self {
            item_id,
            kind,
            quantity: validate_quantity(quantity)?,
            counterparty: counterparty.normalized(),
        })
    }

    /// Balance after applying this movement to `balance`.
    pub fn apply_to(&self, balance: i64) -> StockResult<i64> {
        let applied = match self.kind {
            MovementKind::Inbound => balance.checked_add(self.quantity),
            MovementKind::Outbound => balance.checked_sub(self.quantity),
        };
        applied.ok_or(StockError::BalanceOverflow {
            balance,
            quantity: self.quantity,
        })
    }

    /// Stamp the movement as the store appends it.
    pub fn into_entry(self, id: EntryId, sequence: u64, timestamp: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            id,
            sequence,
            timestamp,
            kind: self.kind,
            item_id: self.item_id,
            quantity: self.quantity,
            counterparty: self.counterparty,
        }
    }
}

/// One immutable ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Insertion position; strictly increasing across the whole log.
    pub sequence: u64,
    /// Never earlier than the previous entry's timestamp.
    pub timestamp: DateTime<Utc>,
    pub kind: MovementKind,
    pub item_id: ItemId,
    /// Always positive; direction comes from `kind`.
    pub quantity: i64,
    #[serde(flatten)]
    pub counterparty: Counterparty,
}

impl LedgerEntry {
    pub fn delta(&self) -> i64 {
        self.kind.sign() * self.quantity
    }
}

/// Balance of `item_id` by full replay of `entries`.
pub fn replay_balance<'a, I>(entries: I, item_id: ItemId) -> i64
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    entries
        .into_iter()
        .filter(|e| e.item_id == item_id)
        .map(LedgerEntry::delta)
        .sum()
}

/// A ledger entry joined with the item's current code, name and unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    #[serde(flatten)]
    pub entry: LedgerEntry,
    pub item_code: ItemCode,
    pub item_name: String,
    pub item_unit: Option<String>,
}

/// What the caller gets back from a successful append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReceipt {
    pub entry: LedgerEntry,
    pub balance_after: i64,
    /// Advisory only: outbound left `0 <= balance < safety_stock`.
    pub below_safety_stock: bool,
    /// A confirmed forced outbound drove the balance negative.
    pub went_negative: bool,
}

/// Keyword match for ledger queries: item code/name/location/note plus every
/// counterparty field.
pub fn movement_matches_keyword(entry: &LedgerEntry, item: &Item, keyword: &Keyword) -> bool {
    let item_fields = [
        Some(item.code.as_str()),
        Some(item.details.name.as_str()),
        item.details.location.as_deref(),
        item.details.note.as_deref(),
    ];
    keyword.matches(item_fields.into_iter().chain(entry.counterparty.fields()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn entry(item_id: ItemId, kind: MovementKind, quantity: i64, sequence: u64) -> LedgerEntry {
        NewMovement::new(item_id, kind, quantity, Counterparty::default())
            .unwrap()
            .into_entry(
                EntryId::new(),
                sequence,
                Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            )
    }

    #[test]
    fn kind_round_trips_through_stored_form() {
        for kind in [MovementKind::Inbound, MovementKind::Outbound] {
            assert_eq!(kind.as_str().parse::<MovementKind>().unwrap(), kind);
        }
        assert!("SIDEWAYS".parse::<MovementKind>().is_err());
    }

    #[test]
    fn zero_and_negative_quantities_are_rejected() {
        let id = ItemId::new();
        for q in [0, -1, i64::MIN] {
            let err = NewMovement::new(id, MovementKind::Inbound, q, Counterparty::default()).unwrap_err();
            assert_eq!(err, StockError::InvalidQuantity(q));
        }
    }

    #[test]
    fn applying_a_movement_checks_the_balance_range() {
        let id = ItemId::new();
        let inbound = NewMovement::new(id, MovementKind::Inbound, i64::MAX, Counterparty::default()).unwrap();
        let outbound = NewMovement::new(id, MovementKind::Outbound, i64::MAX, Counterparty::default()).unwrap();

        assert_eq!(inbound.apply_to(0), Ok(i64::MAX));
        assert_eq!(
            inbound.apply_to(1),
            Err(StockError::BalanceOverflow { balance: 1, quantity: i64::MAX })
        );
        assert_eq!(outbound.apply_to(-1), Ok(i64::MIN));
        assert!(matches!(outbound.apply_to(-2), Err(StockError::BalanceOverflow { .. })));
    }

    #[test]
    fn counterparty_blanks_are_dropped() {
        let cp = Counterparty::default().supplier("  ACME ").memo("   ").normalized();
        assert_eq!(cp.supplier.as_deref(), Some("ACME"));
        assert_eq!(cp.memo, None);
    }

    #[test]
    fn replay_only_counts_the_requested_item() {
        let a = ItemId::new();
        let b = ItemId::new();
        let log = vec![
            entry(a, MovementKind::Inbound, 20, 1),
            entry(b, MovementKind::Inbound, 7, 2),
            entry(a, MovementKind::Outbound, 18, 3),
        ];

        assert_eq!(replay_balance(&log, a), 2);
        assert_eq!(replay_balance(&log, b), 7);
        assert_eq!(replay_balance(&log, ItemId::new()), 0);
    }

    proptest! {
        #[test]
        fn replay_equals_inbound_minus_outbound(moves in proptest::collection::vec((any::<bool>(), 1i64..1000), 0..64)) {
            let id = ItemId::new();
            let log: Vec<_> = moves
                .iter()
                .enumerate()
                .map(|(i, (inbound, q))| {
                    let kind = if *inbound { MovementKind::Inbound } else { MovementKind::Outbound };
                    entry(id, kind, *q, i as u64 + 1)
                })
                .collect();

            let inbound: i64 = moves.iter().filter(|(i, _)| *i).map(|(_, q)| q).sum();
            let outbound: i64 = moves.iter().filter(|(i, _)| !*i).map(|(_, q)| q).sum();

            prop_assert_eq!(replay_balance(&log, id), inbound - outbound);
        }
    }
}
