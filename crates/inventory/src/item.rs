//! Item master data and its validation.

use serde::{Deserialize, Serialize};

use stockledger_core::{ItemId, StockError, StockResult};

use crate::code::ItemCode;
use crate::query::Keyword;

/// Master attributes of an item (everything except identity, code and state).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemDetails {
    pub name: String,
    pub location: Option<String>,
    pub unit: Option<String>,
    /// Balance below which an outbound raises an advisory.
    pub safety_stock: u32,
    pub note: Option<String>,
}

impl ItemDetails {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn safety_stock(mut self, safety_stock: u32) -> Self {
        self.safety_stock = safety_stock;
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Trim every field, turn blank optionals into `None`, and require a name.
    pub fn normalized(self) -> StockResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(StockError::invalid_input("item name cannot be blank"));
        }
        Ok(Self {
            name,
            location: non_blank(self.location),
            unit: non_blank(self.unit),
            safety_stock: self.safety_stock,
            note: non_blank(self.note),
        })
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Caller input for creating or fully replacing an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub code: String,
    #[serde(flatten)]
    pub details: ItemDetails,
}

impl ItemDraft {
    pub fn new(code: impl Into<String>, details: ItemDetails) -> Self {
        Self {
            code: code.into(),
            details,
        }
    }

    pub fn validate(self) -> StockResult<NewItem> {
        let details = self.details.normalized()?;
        let code = ItemCode::parse_active(&self.code)?;
        Ok(NewItem { code, details })
    }
}

/// A validated draft, ready to hand to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub code: ItemCode,
    pub details: ItemDetails,
}

/// An item record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub code: ItemCode,
    #[serde(flatten)]
    pub details: ItemDetails,
    pub active: bool,
}

impl Item {
    pub fn from_new(id: ItemId, new: NewItem) -> Self {
        Self {
            id,
            code: new.code,
            details: new.details,
            active: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn safety_stock(&self) -> i64 {
        i64::from(self.details.safety_stock)
    }

    /// Fails with `AlreadyRetired` for retired items.
    pub fn ensure_active(&self) -> StockResult<()> {
        if self.active {
            Ok(())
        } else {
            Err(StockError::already_retired(&self.code))
        }
    }

    /// Registry search: code, name, location, unit, note.
    pub fn matches_keyword(&self, keyword: &Keyword) -> bool {
        keyword.matches([
            Some(self.code.as_str()),
            Some(self.details.name.as_str()),
            self.details.location.as_deref(),
            self.details.unit.as_deref(),
            self.details.note.as_deref(),
        ])
    }
}

/// An active item together with its current balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    #[serde(flatten)]
    pub item: Item,
    pub balance: i64,
}

impl StockLevel {
    pub fn is_below_safety_stock(&self) -> bool {
        self.balance < self.item.safety_stock()
    }
}
