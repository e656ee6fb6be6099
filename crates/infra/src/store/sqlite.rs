//! SQLite-backed stock store.
//!
//! This module provides a production store backed by a single SQLite file in
//! WAL mode, so several processes can share one ledger.
//!
//! ## Schema
//!
//! - `items`: one row per item, active or retired. `code` is UNIQUE across both,
//!   which is what makes retirement markers collide rather than duplicate.
//! - `balances`: cached running balance per item, updated in the same
//!   transaction as every ledger append.
//! - `ledger_entries`: append-only; `sequence` is an AUTOINCREMENT key, so it
//!   is never reused even across deleted rows.
//!
//! Timestamps are stored as integer microseconds since the Unix epoch.
//!
//! ## Sync API
//!
//! `StockStore` is synchronous. The store owns a small tokio runtime and
//! blocks on it, so it must not be called from inside another async runtime.

use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tokio::runtime::Runtime;
use tracing::{info, instrument};

use stockledger_core::{EntryId, ItemId, StockError};
use stockledger_inventory::{
    Counterparty, Item, ItemCode, ItemDetails, Keyword, LedgerEntry, MovementKind, MovementQuery,
    MovementRecord, NewItem, NewMovement, StockLevel,
};

use super::r#trait::{
    AppendedMovement, BalanceDrift, MovementGuard, Retirement, StockStore, StoreError,
};
use crate::config::StoreConfig;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id           TEXT PRIMARY KEY,
        code         TEXT NOT NULL UNIQUE,
        name         TEXT NOT NULL,
        location     TEXT NULL,
        unit         TEXT NULL,
        safety_stock INTEGER NOT NULL DEFAULT 0 CHECK (safety_stock >= 0),
        note         TEXT NULL,
        active       INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS balances (
        item_id  TEXT PRIMARY KEY REFERENCES items(id),
        quantity INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        sequence    INTEGER PRIMARY KEY AUTOINCREMENT,
        id          TEXT NOT NULL UNIQUE,
        timestamp   INTEGER NOT NULL,
        kind        TEXT NOT NULL CHECK (kind IN ('IN', 'OUT')),
        item_id     TEXT NOT NULL REFERENCES items(id),
        quantity    INTEGER NOT NULL CHECK (quantity > 0),
        supplier    TEXT NULL,
        destination TEXT NULL,
        requester   TEXT NULL,
        handler     TEXT NULL,
        operator    TEXT NULL,
        reason      TEXT NULL,
        memo        TEXT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ledger_entries_item ON ledger_entries (item_id, sequence)",
    "CREATE INDEX IF NOT EXISTS idx_ledger_entries_kind_time ON ledger_entries (kind, timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_items_active ON items (active)",
];

const ITEM_COLUMNS: &str = "i.id, i.code, i.name, i.location, i.unit, i.safety_stock, i.note, i.active";

const ITEM_KEYWORD_COLUMNS: &[&str] = &["i.code", "i.name", "i.location", "i.unit", "i.note"];

const MOVEMENT_KEYWORD_COLUMNS: &[&str] = &[
    "i.code",
    "i.name",
    "i.location",
    "i.note",
    "e.supplier",
    "e.destination",
    "e.requester",
    "e.handler",
    "e.operator",
    "e.reason",
    "e.memo",
];

const ENTRY_COLUMNS: &str = "e.sequence, e.id, e.timestamp, e.kind, e.item_id, e.quantity, \
     e.supplier, e.destination, e.requester, e.handler, e.operator, e.reason, e.memo";

const DRIFT_QUERY: &str = r#"
    SELECT item_id, cached, replayed FROM (
        SELECT
            i.id AS item_id,
            COALESCE(b.quantity, 0) AS cached,
            COALESCE((
                SELECT SUM(CASE e.kind WHEN 'IN' THEN e.quantity ELSE -e.quantity END)
                FROM ledger_entries e
                WHERE e.item_id = i.id
            ), 0) AS replayed
        FROM items i
        LEFT JOIN balances b ON b.item_id = i.id
    )
    WHERE cached <> replayed
    ORDER BY item_id
"#;

/// SQLite implementation of [`StockStore`].
#[derive(Debug)]
pub struct SqliteStockStore {
    // Dropped before the runtime it was created on.
    pool: SqlitePool,
    runtime: Runtime,
}

impl SqliteStockStore {
    /// Open (creating if missing) the database named by `config` and apply the schema.
    pub fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("stockledger-sqlite")
            .enable_all()
            .build()
            .context("failed to build runtime for SQLite store")?;

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .with_context(|| format!("invalid database url {:?}", config.database_url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = runtime.block_on(async {
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.busy_timeout)
                .connect_with(options)
                .await
                .with_context(|| format!("failed to open SQLite database at {}", config.database_url))?;

            for statement in SCHEMA {
                sqlx::query(statement)
                    .execute(&pool)
                    .await
                    .context("failed to apply stock ledger schema")?;
            }
            anyhow::Ok(pool)
        })?;

        info!(database_url = %config.database_url, "opened SQLite stock store");
        Ok(Self { pool, runtime })
    }

    /// Overwrite a cached balance without touching the log.
    #[cfg(test)]
    pub(crate) fn corrupt_cached_balance(&self, item_id: ItemId, quantity: i64) {
        self.runtime
            .block_on(
                sqlx::query("UPDATE balances SET quantity = ?1 WHERE item_id = ?2")
                    .bind(quantity)
                    .bind(item_id.to_string())
                    .execute(&self.pool),
            )
            .unwrap();
    }
}

impl StockStore for SqliteStockStore {
    fn insert_item(&self, item: NewItem) -> Result<Item, StoreError> {
        self.runtime.block_on(insert_item(&self.pool, item))
    }

    fn update_item(&self, item_id: ItemId, item: NewItem) -> Result<Item, StoreError> {
        self.runtime.block_on(update_item(&self.pool, item_id, item))
    }

    fn retire_item(&self, item_id: ItemId, at: DateTime<Utc>) -> Result<Retirement, StoreError> {
        self.runtime.block_on(retire_item(&self.pool, item_id, at))
    }

    fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        self.runtime.block_on(async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| map_sqlx_error("acquire", e))?;
            fetch_item(&mut conn, item_id).await
        })
    }

    fn active_item_by_code(&self, code: &ItemCode) -> Result<Option<Item>, StoreError> {
        self.runtime.block_on(active_item_by_code(&self.pool, code))
    }

    fn active_codes(&self) -> Result<Vec<u64>, StoreError> {
        self.runtime.block_on(active_codes(&self.pool))
    }

    fn search_items(&self, keyword: &Keyword) -> Result<Vec<StockLevel>, StoreError> {
        self.runtime.block_on(search_items(&self.pool, keyword))
    }

    fn append_movement(
        &self,
        movement: NewMovement,
        at: DateTime<Utc>,
        guard: MovementGuard<'_>,
    ) -> Result<AppendedMovement, StoreError> {
        self.runtime
            .block_on(append_movement(&self.pool, movement, at, guard))
    }

    fn balance(&self, item_id: ItemId) -> Result<Option<i64>, StoreError> {
        self.runtime.block_on(balance(&self.pool, item_id))
    }

    fn entries_for_item(&self, item_id: ItemId) -> Result<Vec<LedgerEntry>, StoreError> {
        self.runtime.block_on(entries_for_item(&self.pool, item_id))
    }

    fn query_movements(&self, query: &MovementQuery) -> Result<Vec<MovementRecord>, StoreError> {
        self.runtime.block_on(query_movements(&self.pool, query))
    }

    fn balance_drift(&self) -> Result<Vec<BalanceDrift>, StoreError> {
        self.runtime.block_on(async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| map_sqlx_error("acquire", e))?;
            balance_drift(&mut conn).await
        })
    }

    fn rebuild_balances(&self) -> Result<Vec<BalanceDrift>, StoreError> {
        self.runtime.block_on(rebuild_balances(&self.pool))
    }
}

#[instrument(skip(pool, item), fields(code = %item.code), err)]
async fn insert_item(pool: &SqlitePool, item: NewItem) -> Result<Item, StoreError> {
    let item = Item::from_new(ItemId::new(), item);
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;

    let details = &item.details;
    sqlx::query(
        r#"
        INSERT INTO items (id, code, name, location, unit, safety_stock, note, active)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)
        "#,
    )
    .bind(item.id.to_string())
    .bind(item.code.as_str())
    .bind(&details.name)
    .bind(&details.location)
    .bind(&details.unit)
    .bind(i64::from(details.safety_stock))
    .bind(&details.note)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_code_error("insert_item", &item.code, e))?;

    sqlx::query("INSERT INTO balances (item_id, quantity) VALUES (?1, 0)")
        .bind(item.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_balance", e))?;

    tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
    Ok(item)
}

#[instrument(skip(pool, item), fields(item_id = %item_id, code = %item.code), err)]
async fn update_item(pool: &SqlitePool, item_id: ItemId, item: NewItem) -> Result<Item, StoreError> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
    claim_writer(&mut tx, item_id).await?;

    let current = fetch_item(&mut tx, item_id)
        .await?
        .ok_or_else(|| StockError::item_not_found(item_id))?;
    current.ensure_active()?;

    let details = &item.details;
    sqlx::query(
        r#"
        UPDATE items
        SET code = ?1, name = ?2, location = ?3, unit = ?4, safety_stock = ?5, note = ?6
        WHERE id = ?7
        "#,
    )
    .bind(item.code.as_str())
    .bind(&details.name)
    .bind(&details.location)
    .bind(&details.unit)
    .bind(i64::from(details.safety_stock))
    .bind(&details.note)
    .bind(item_id.to_string())
    .execute(&mut *tx)
    .await
    .map_err(|e| map_code_error("update_item", &item.code, e))?;

    tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
    Ok(Item {
        id: item_id,
        code: item.code,
        details: item.details,
        active: true,
    })
}

#[instrument(skip(pool), fields(item_id = %item_id), err)]
async fn retire_item(
    pool: &SqlitePool,
    item_id: ItemId,
    at: DateTime<Utc>,
) -> Result<Retirement, StoreError> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
    claim_writer(&mut tx, item_id).await?;

    let current = fetch_item(&mut tx, item_id)
        .await?
        .ok_or_else(|| StockError::item_not_found(item_id))?;
    current.ensure_active()?;
    let freed_code = current
        .code
        .numeral()
        .ok_or_else(|| StockError::invalid_input(format!("cannot retire code {}", current.code)))?;
    let marker = current.code.retirement_marker(at)?;

    sqlx::query("UPDATE items SET code = ?1, active = 0 WHERE id = ?2")
        .bind(marker.as_str())
        .bind(item_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_code_error("retire_item", &marker, e))?;

    tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
    Ok(Retirement {
        item: Item {
            code: marker.clone(),
            active: false,
            ..current
        },
        freed_code,
        marker,
    })
}

async fn active_item_by_code(pool: &SqlitePool, code: &ItemCode) -> Result<Option<Item>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {ITEM_COLUMNS} FROM items i WHERE i.code = ?1 AND i.active = 1"
    ))
    .bind(code.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("active_item_by_code", e))?;

    row.as_ref().map(item_from_row).transpose()
}

async fn active_codes(pool: &SqlitePool) -> Result<Vec<u64>, StoreError> {
    let codes: Vec<String> = sqlx::query_scalar("SELECT code FROM items WHERE active = 1")
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("active_codes", e))?;

    Ok(codes
        .into_iter()
        .filter_map(|code| ItemCode::from_stored(code).numeral())
        .collect())
}

#[instrument(skip(pool), fields(keyword = %keyword.as_str(), rows = tracing::field::Empty), err)]
async fn search_items(pool: &SqlitePool, keyword: &Keyword) -> Result<Vec<StockLevel>, StoreError> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
        "SELECT {ITEM_COLUMNS}, COALESCE(b.quantity, 0) AS balance \
         FROM items i LEFT JOIN balances b ON b.item_id = i.id \
         WHERE i.active = 1"
    ));
    push_keyword_filter(&mut qb, keyword, ITEM_KEYWORD_COLUMNS);
    qb.push(" ORDER BY CAST(i.code AS INTEGER), i.id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("search_items", e))?;
    tracing::Span::current().record("rows", rows.len());

    rows.iter()
        .map(|row| {
            Ok(StockLevel {
                item: item_from_row(row)?,
                balance: get(row, "balance")?,
            })
        })
        .collect()
}

#[instrument(
    skip(pool, movement, guard),
    fields(item_id = %movement.item_id, kind = movement.kind.as_str(), quantity = movement.quantity),
    err
)]
async fn append_movement(
    pool: &SqlitePool,
    movement: NewMovement,
    at: DateTime<Utc>,
    guard: MovementGuard<'_>,
) -> Result<AppendedMovement, StoreError> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
    claim_writer(&mut tx, movement.item_id).await?;

    let item = fetch_item(&mut tx, movement.item_id)
        .await?
        .ok_or_else(|| StockError::item_not_found(movement.item_id))?;
    let balance_before = fetch_balance(&mut tx, item.id).await?.unwrap_or(0);

    // Rejection drops `tx`, which rolls back.
    guard(&item, balance_before)?;
    let balance_after = movement.apply_to(balance_before)?;

    let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(timestamp) FROM ledger_entries")
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("latest_timestamp", e))?;
    let micros = latest.map_or(at.timestamp_micros(), |last| at.timestamp_micros().max(last));
    let timestamp = DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {micros}")))?;

    let entry_id = EntryId::new();
    let cp = &movement.counterparty;
    let inserted = sqlx::query(
        r#"
        INSERT INTO ledger_entries
            (id, timestamp, kind, item_id, quantity,
             supplier, destination, requester, handler, operator, reason, memo)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(entry_id.to_string())
    .bind(micros)
    .bind(movement.kind.as_str())
    .bind(item.id.to_string())
    .bind(movement.quantity)
    .bind(&cp.supplier)
    .bind(&cp.destination)
    .bind(&cp.requester)
    .bind(&cp.handler)
    .bind(&cp.operator)
    .bind(&cp.reason)
    .bind(&cp.memo)
    .execute(&mut *tx)
    .await
    .map_err(|e| map_sqlx_error("insert_entry", e))?;
    let sequence = u64::try_from(inserted.last_insert_rowid())
        .map_err(|_| StoreError::Backend("negative ledger sequence".to_string()))?;

    upsert_balance(&mut tx, item.id, balance_after).await?;

    tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
    Ok(AppendedMovement {
        entry: movement.into_entry(entry_id, sequence, timestamp),
        item,
        balance_before,
        balance_after,
    })
}

async fn balance(pool: &SqlitePool, item_id: ItemId) -> Result<Option<i64>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(b.quantity, 0) AS quantity
        FROM items i LEFT JOIN balances b ON b.item_id = i.id
        WHERE i.id = ?1
        "#,
    )
    .bind(item_id.to_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("balance", e))?;

    row.as_ref().map(|row| get(row, "quantity")).transpose()
}

async fn entries_for_item(pool: &SqlitePool, item_id: ItemId) -> Result<Vec<LedgerEntry>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ledger_entries e WHERE e.item_id = ?1 ORDER BY e.sequence ASC"
    ))
    .bind(item_id.to_string())
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("entries_for_item", e))?;

    rows.iter().map(entry_from_row).collect()
}

#[instrument(skip(pool, query), fields(kind = query.kind.as_str(), limit = query.limit, rows = tracing::field::Empty), err)]
async fn query_movements(
    pool: &SqlitePool,
    query: &MovementQuery,
) -> Result<Vec<MovementRecord>, StoreError> {
    let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
        "SELECT {ENTRY_COLUMNS}, i.code AS item_code, i.name AS item_name, i.unit AS item_unit \
         FROM ledger_entries e JOIN items i ON i.id = e.item_id \
         WHERE e.kind = "
    ));
    qb.push_bind(query.kind.as_str());
    if let Some(start) = query.range.start {
        qb.push(" AND e.timestamp >= ").push_bind(start.timestamp_micros());
    }
    if let Some(end) = query.range.end {
        qb.push(" AND e.timestamp < ").push_bind(end.timestamp_micros());
    }
    push_keyword_filter(&mut qb, &query.keyword, MOVEMENT_KEYWORD_COLUMNS);
    qb.push(" ORDER BY e.timestamp DESC, e.sequence DESC LIMIT ")
        .push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .map_err(|e| map_sqlx_error("query_movements", e))?;
    tracing::Span::current().record("rows", rows.len());

    rows.iter()
        .map(|row| {
            Ok(MovementRecord {
                entry: entry_from_row(row)?,
                item_code: ItemCode::from_stored(get::<String>(row, "item_code")?),
                item_name: get(row, "item_name")?,
                item_unit: get(row, "item_unit")?,
            })
        })
        .collect()
}

async fn balance_drift(conn: &mut SqliteConnection) -> Result<Vec<BalanceDrift>, StoreError> {
    let rows = sqlx::query(DRIFT_QUERY)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("balance_drift", e))?;

    rows.iter()
        .map(|row| {
            Ok(BalanceDrift {
                item_id: parse_id(row, "item_id")?,
                cached: get(row, "cached")?,
                replayed: get(row, "replayed")?,
            })
        })
        .collect()
}

#[instrument(skip(pool), fields(repaired = tracing::field::Empty), err)]
async fn rebuild_balances(pool: &SqlitePool) -> Result<Vec<BalanceDrift>, StoreError> {
    let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
    // Take the write lock before reading the drift snapshot.
    sqlx::query("UPDATE balances SET quantity = quantity WHERE rowid = (SELECT MIN(rowid) FROM balances)")
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("claim_writer", e))?;

    let drift = balance_drift(&mut tx).await?;
    for d in &drift {
        upsert_balance(&mut tx, d.item_id, d.replayed).await?;
    }

    tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
    tracing::Span::current().record("repaired", drift.len());
    Ok(drift)
}

/// Open the transaction with a write so SQLite takes the write lock before
/// any read snapshot exists.
async fn claim_writer(conn: &mut SqliteConnection, item_id: ItemId) -> Result<(), StoreError> {
    sqlx::query("UPDATE balances SET quantity = quantity WHERE item_id = ?1")
        .bind(item_id.to_string())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("claim_writer", e))?;
    Ok(())
}

async fn fetch_item(conn: &mut SqliteConnection, item_id: ItemId) -> Result<Option<Item>, StoreError> {
    let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items i WHERE i.id = ?1"))
        .bind(item_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_item", e))?;

    row.as_ref().map(item_from_row).transpose()
}

async fn fetch_balance(conn: &mut SqliteConnection, item_id: ItemId) -> Result<Option<i64>, StoreError> {
    sqlx::query_scalar("SELECT quantity FROM balances WHERE item_id = ?1")
        .bind(item_id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_balance", e))
}

async fn upsert_balance(
    conn: &mut SqliteConnection,
    item_id: ItemId,
    quantity: i64,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO balances (item_id, quantity) VALUES (?1, ?2)
        ON CONFLICT (item_id) DO UPDATE SET quantity = excluded.quantity
        "#,
    )
    .bind(item_id.to_string())
    .bind(quantity)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("upsert_balance", e))?;
    Ok(())
}

/// Append `AND (col LIKE ? ESCAPE '\' OR ...)` for a non-blank keyword.
fn push_keyword_filter(qb: &mut QueryBuilder<'_, Sqlite>, keyword: &Keyword, columns: &[&str]) {
    let Some(pattern) = keyword.like_pattern() else {
        return;
    };
    qb.push(" AND (");
    let mut clauses = qb.separated(" OR ");
    for column in columns {
        clauses.push(format!("{column} LIKE "));
        clauses.push_bind_unseparated(pattern.clone());
        clauses.push_unseparated(" ESCAPE '\\'");
    }
    qb.push(")");
}

// Row mapping

fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to read column {column}: {e}")))
}

fn parse_id<T>(row: &SqliteRow, column: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = StockError>,
{
    let raw: String = get(row, column)?;
    raw.parse()
        .map_err(|e: StockError| StoreError::Backend(format!("corrupt {column}: {e}")))
}

fn item_from_row(row: &SqliteRow) -> Result<Item, StoreError> {
    let safety_stock: i64 = get(row, "safety_stock")?;
    Ok(Item {
        id: parse_id(row, "id")?,
        code: ItemCode::from_stored(get::<String>(row, "code")?),
        details: ItemDetails {
            name: get(row, "name")?,
            location: get(row, "location")?,
            unit: get(row, "unit")?,
            safety_stock: u32::try_from(safety_stock)
                .map_err(|_| StoreError::Backend(format!("corrupt safety_stock: {safety_stock}")))?,
            note: get(row, "note")?,
        },
        active: get(row, "active")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, StoreError> {
    let sequence: i64 = get(row, "sequence")?;
    let micros: i64 = get(row, "timestamp")?;
    let kind: String = get(row, "kind")?;
    Ok(LedgerEntry {
        id: parse_id(row, "id")?,
        sequence: u64::try_from(sequence)
            .map_err(|_| StoreError::Backend(format!("corrupt sequence: {sequence}")))?,
        timestamp: DateTime::from_timestamp_micros(micros)
            .ok_or_else(|| StoreError::Backend(format!("corrupt timestamp: {micros}")))?,
        kind: kind
            .parse::<MovementKind>()
            .map_err(|e| StoreError::Backend(format!("corrupt kind: {e}")))?,
        item_id: parse_id(row, "item_id")?,
        quantity: get(row, "quantity")?,
        counterparty: Counterparty {
            supplier: get(row, "supplier")?,
            destination: get(row, "destination")?,
            requester: get(row, "requester")?,
            handler: get(row, "handler")?,
            operator: get(row, "operator")?,
            reason: get(row, "reason")?,
            memo: get(row, "memo")?,
        },
    })
}

// Error mapping

/// SQLite primary result codes for lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED`),
/// matched against the low byte of the extended code.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);

            if matches!(primary, Some(SQLITE_BUSY | SQLITE_LOCKED)) {
                StoreError::Busy(msg)
            } else if db_err.is_unique_violation() {
                StoreError::UniqueViolation(msg)
            } else {
                StoreError::Backend(msg)
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Busy(format!("timed out acquiring a connection in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {}: {}", operation, other)),
    }
}

/// Like `map_sqlx_error`, but a unique violation reports the conflicting code.
fn map_code_error(operation: &str, code: &ItemCode, err: sqlx::Error) -> StoreError {
    match map_sqlx_error(operation, err) {
        StoreError::UniqueViolation(_) => StoreError::UniqueViolation(code.as_str().to_string()),
        other => other,
    }
}
