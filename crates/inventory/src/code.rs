//! Item codes: active numerals, retirement markers, and gap-reuse allocation.
//!
//! Active items carry a decimal numeral `>= 10001`. Retiring an item rewrites
//! its code to `X<numeral>_<YYYYMM>廃止`, which frees the numeral for reuse.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{StockError, StockResult};

/// Lowest numeral ever issued to an item.
pub const FIRST_CODE: u64 = 10001;

/// Highest numeral accepted; SQLite compares codes as signed 64-bit integers.
pub const MAX_CODE: u64 = i64::MAX as u64;

const MARKER_PREFIX: char = 'X';
const MARKER_SUFFIX: &str = "廃止";

/// An item's code as stored: either an active numeral or a retirement marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemCode(String);

impl ItemCode {
    /// Code for an allocator-issued numeral.
    pub fn active(numeral: u64) -> StockResult<Self> {
        if numeral < FIRST_CODE {
            return Err(StockError::invalid_input(format!(
                "item code {numeral} is below {FIRST_CODE}"
            )));
        }
        if numeral > MAX_CODE {
            return Err(StockError::invalid_input(format!(
                "item code {numeral} is above {MAX_CODE}"
            )));
        }
        Ok(Self(numeral.to_string()))
    }

    /// Parse caller input as an active code.
    ///
    /// Surrounding whitespace is ignored and leading zeros are normalised away,
    /// so `" 010001"` and `"10001"` denote the same code.
    pub fn parse_active(input: &str) -> StockResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(StockError::invalid_input("item code cannot be empty"));
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StockError::invalid_input(format!(
                "item code must be a decimal numeral: {trimmed:?}"
            )));
        }
        let numeral: u64 = trimmed
            .parse()
            .map_err(|_| StockError::invalid_input(format!("item code out of range: {trimmed}")))?;
        Self::active(numeral)
    }

    /// Wrap a code read back from storage without validating it.
    pub fn from_stored(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The numeric value, if this is an active-format code.
    pub fn numeral(&self) -> Option<u64> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }

    pub fn is_retirement_marker(&self) -> bool {
        RetirementMarker::parse(&self.0).is_some()
    }

    /// The marker this code turns into when its item is retired at `at`.
    pub fn retirement_marker(&self, at: DateTime<Utc>) -> StockResult<ItemCode> {
        let numeral = self.numeral().ok_or_else(|| {
            StockError::invalid_input(format!("cannot retire non-numeric code {:?}", self.0))
        })?;
        let marker = RetirementMarker {
            original: numeral,
            year_month: year_month(at),
        };
        Ok(Self(marker.to_string()))
    }
}

impl core::fmt::Display for ItemCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded form of `X<numeral>_<YYYYMM>廃止`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetirementMarker {
    pub original: u64,
    /// `YYYY * 100 + MM`.
    pub year_month: u32,
}

impl RetirementMarker {
    pub fn parse(code: &str) -> Option<Self> {
        let body = code.strip_prefix(MARKER_PREFIX)?.strip_suffix(MARKER_SUFFIX)?;
        let (numeral, ym) = body.split_once('_')?;
        if numeral.is_empty() || !numeral.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if ym.len() != 6 || !ym.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            original: numeral.parse().ok()?,
            year_month: ym.parse().ok()?,
        })
    }
}

impl core::fmt::Display for RetirementMarker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{MARKER_PREFIX}{}_{:06}{MARKER_SUFFIX}",
            self.original, self.year_month
        )
    }
}

fn year_month(at: DateTime<Utc>) -> u32 {
    at.year() as u32 * 100 + at.month()
}

/// Smallest numeral `>= FIRST_CODE` that is not in `used`.
///
/// `used` is the set of active numerals; retired items hold markers and so
/// never block a numeral.
pub fn next_free_code<I>(used: I) -> u64
where
    I: IntoIterator<Item = u64>,
{
    let used: HashSet<u64> = used.into_iter().filter(|n| *n >= FIRST_CODE).collect();
    let mut candidate = FIRST_CODE;
    while used.contains(&candidate) {
        candidate += 1;
    }
    candidate
}
