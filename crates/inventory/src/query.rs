//! Query parameters shared by every store implementation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{StockError, StockResult};

use crate::movement::MovementKind;

/// Default row cap for ledger queries.
pub const DEFAULT_QUERY_LIMIT: usize = 5000;

/// A case-insensitive substring search term. Blank matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Keyword {
    raw: String,
    folded: String,
}

impl Keyword {
    pub fn new(input: impl AsRef<str>) -> Self {
        let raw = input.as_ref().trim().to_string();
        let folded = raw.to_lowercase();
        Self { raw, folded }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if any present field contains the keyword.
    pub fn matches<'a, I>(&self, fields: I) -> bool
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        if self.is_empty() {
            return true;
        }
        fields
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&self.folded))
    }

    /// `%keyword%` with `%`, `_` and `\` escaped for `LIKE ... ESCAPE '\'`.
    pub fn like_pattern(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut pattern = String::with_capacity(self.raw.len() + 2);
        pattern.push('%');
        for ch in self.raw.chars() {
            if matches!(ch, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(ch);
        }
        pattern.push('%');
        Some(pattern)
    }
}

/// Half-open `[start, end)` timestamp range; either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Calendar year `year` (UTC).
    pub fn year(year: i32) -> StockResult<Self> {
        Ok(Self::between(month_start(year, 1)?, month_start(next_year(year)?, 1)?))
    }

    /// Calendar month `month` of `year` (UTC).
    pub fn month(year: i32, month: u32) -> StockResult<Self> {
        let start = month_start(year, month)?;
        let end = if month == 12 {
            month_start(next_year(year)?, 1)?
        } else {
            month_start(year, month + 1)?
        };
        Ok(Self::between(start, end))
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at < e)
    }
}

fn next_year(year: i32) -> StockResult<i32> {
    year.checked_add(1)
        .ok_or_else(|| StockError::invalid_input(format!("invalid year {year}")))
}

fn month_start(year: i32, month: u32) -> StockResult<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| StockError::invalid_input(format!("invalid period {year:04}-{month:02}")))
}

/// Filters for a ledger query. Every call runs afresh against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementQuery {
    pub kind: MovementKind,
    pub keyword: Keyword,
    pub range: TimeRange,
    pub limit: usize,
}

impl MovementQuery {
    pub fn new(kind: MovementKind) -> Self {
        Self {
            kind,
            keyword: Keyword::default(),
            range: TimeRange::all(),
            limit: DEFAULT_QUERY_LIMIT,
        }
    }

    pub fn keyword(mut self, keyword: impl AsRef<str>) -> Self {
        self.keyword = Keyword::new(keyword);
        self
    }

    pub fn range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}
