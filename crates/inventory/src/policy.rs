//! Outbound decision rules.
//!
//! The same pure assessment backs both the read-only policy preview and the
//! check the ledger applies inside its append transaction.

use serde::{Deserialize, Serialize};

use stockledger_core::{StockError, StockResult};

/// Outcome of checking a proposed outbound against the current balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundAssessment {
    pub balance: i64,
    pub quantity: i64,
    pub projected: i64,
    /// The movement can be recorded without confirmation.
    pub ok: bool,
    /// The movement would drive the balance negative; only a confirmed
    /// (forced) outbound may proceed.
    pub requires_confirmation: bool,
    /// `0 <= projected < safety_stock`. Never blocks.
    pub below_safety_after: bool,
}

pub fn assess_outbound(balance: i64, safety_stock: i64, quantity: i64) -> StockResult<OutboundAssessment> {
    let projected = balance
        .checked_sub(quantity)
        .ok_or(StockError::BalanceOverflow { balance, quantity })?;
    let negative = projected < 0;
    Ok(OutboundAssessment {
        balance,
        quantity,
        projected,
        ok: !negative,
        requires_confirmation: negative,
        below_safety_after: !negative && projected < safety_stock,
    })
}

impl OutboundAssessment {
    /// Apply the caller's final decision.
    pub fn authorize(self, allow_negative: bool) -> StockResult<Self> {
        if self.requires_confirmation && !allow_negative {
            return Err(StockError::InsufficientStock {
                balance: self.balance,
                requested: self.quantity,
            });
        }
        Ok(self)
    }
}
