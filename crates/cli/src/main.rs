//! `stockledger`: command-line front end over the ledger services.
//!
//! Results are written to stdout as JSON; logs go to stderr.

use std::io::Write;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use stockledger_core::{StockError, StockResult};
use stockledger_infra::{StoreConfig, Stockroom};
use stockledger_inventory::{
    Counterparty, ItemDetails, ItemDraft, MovementKind, MovementQuery, TimeRange,
};

#[derive(Parser)]
#[command(name = "stockledger")]
#[command(about = "Stock ledger and item-code allocation")]
#[command(version)]
struct Cli {
    /// Database URL (overrides STOCKLEDGER_DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the next free item code
    NextCode,

    /// Create an item (allocates the next free code unless --code is given)
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: Option<String>,
        #[command(flatten)]
        attrs: ItemAttrs,
    },

    /// Replace an item's code and attributes
    Update {
        /// Current code of the item
        current: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[command(flatten)]
        attrs: ItemAttrs,
    },

    /// Retire an item, freeing its code for reuse
    Retire { code: String },

    /// Record an inbound movement
    Inbound {
        code: String,
        quantity: i64,
        #[command(flatten)]
        counterparty: CounterpartyArgs,
    },

    /// Record an outbound movement
    Outbound {
        code: String,
        quantity: i64,
        /// Record even if the balance goes negative
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        counterparty: CounterpartyArgs,
    },

    /// Preview an outbound without recording it
    Check { code: String, quantity: i64 },

    /// Current balance of an item
    Balance { code: String },

    /// Active items matching a keyword, with balances
    Search {
        #[arg(default_value = "")]
        keyword: String,
    },

    /// Movement history, newest first
    History {
        #[arg(value_enum)]
        kind: KindArg,
        #[arg(long, default_value = "")]
        keyword: String,
        #[arg(long)]
        year: Option<i32>,
        /// Requires --year
        #[arg(long, requires = "year")]
        month: Option<u32>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Report cached balances that disagree with the ledger
    Verify,

    /// Rewrite drifted cached balances from the ledger
    RebuildBalances,
}

#[derive(clap::Args)]
struct ItemAttrs {
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    unit: Option<String>,
    #[arg(long, default_value_t = 0)]
    safety_stock: u32,
    #[arg(long)]
    note: Option<String>,
}

impl ItemAttrs {
    fn into_details(self, name: String) -> ItemDetails {
        ItemDetails {
            name,
            location: self.location,
            unit: self.unit,
            safety_stock: self.safety_stock,
            note: self.note,
        }
    }
}

#[derive(clap::Args)]
struct CounterpartyArgs {
    #[arg(long)]
    supplier: Option<String>,
    #[arg(long)]
    destination: Option<String>,
    #[arg(long)]
    requester: Option<String>,
    #[arg(long)]
    handler: Option<String>,
    #[arg(long)]
    operator: Option<String>,
    #[arg(long)]
    reason: Option<String>,
    #[arg(long)]
    memo: Option<String>,
}

impl From<CounterpartyArgs> for Counterparty {
    fn from(args: CounterpartyArgs) -> Self {
        Counterparty {
            supplier: args.supplier,
            destination: args.destination,
            requester: args.requester,
            handler: args.handler,
            operator: args.operator,
            reason: args.reason,
            memo: args.memo,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    In,
    Out,
}

impl From<KindArg> for MovementKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::In => MovementKind::Inbound,
            KindArg::Out => MovementKind::Outbound,
        }
    }
}

fn main() -> anyhow::Result<()> {
    stockledger_observability::init();
    let cli = Cli::parse();

    let mut config = StoreConfig::from_env().context("failed to read store configuration")?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    tracing::debug!(database_url = %config.database_url, "opening stock store");
    let room = Stockroom::open(&config)?;

    let mut out = std::io::stdout().lock();
    run(&room, cli.command, &mut out).map_err(with_hint)
}

/// Attach a next-step hint to errors the user can act on.
fn with_hint(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<StockError>() {
        Some(StockError::InsufficientStock { .. }) => err.context("use --force to record anyway"),
        _ => err,
    }
}

fn run<S, W>(room: &Stockroom<S>, command: Commands, out: &mut W) -> anyhow::Result<()>
where
    S: stockledger_infra::StockStore + Clone,
    W: Write,
{
    match command {
        Commands::NextCode => emit(out, &room.allocator.next_code()?),
        Commands::Create { name, code, attrs } => {
            let details = attrs.into_details(name);
            let item = match code {
                Some(code) => room.registry.create(ItemDraft::new(code, details))?,
                None => room.registry.create_with_next_code(details)?,
            };
            emit(out, &item)
        }
        Commands::Update {
            current,
            code,
            name,
            attrs,
        } => {
            let item = room.registry.find_by_code(&current)?;
            emit(out, &room.registry.update(item.id, ItemDraft::new(code, attrs.into_details(name)))?)
        }
        Commands::Retire { code } => {
            let item = room.registry.find_by_code(&code)?;
            emit(out, &room.allocator.retire(item.id)?)
        }
        Commands::Inbound {
            code,
            quantity,
            counterparty,
        } => {
            let item = room.registry.find_by_code(&code)?;
            emit(out, &room.ledger.record_inbound(item.id, quantity, counterparty.into())?)
        }
        Commands::Outbound {
            code,
            quantity,
            force,
            counterparty,
        } => {
            let item = room.registry.find_by_code(&code)?;
            emit(out, &room.ledger.record_outbound(item.id, quantity, counterparty.into(), force)?)
        }
        Commands::Check { code, quantity } => {
            let item = room.registry.find_by_code(&code)?;
            emit(out, &room.policy.evaluate_outbound(item.id, quantity)?)
        }
        Commands::Balance { code } => {
            let item = room.registry.find_by_code(&code)?;
            emit(out, &room.ledger.balance(item.id)?)
        }
        Commands::Search { keyword } => emit(out, &room.registry.search(&keyword)?),
        Commands::History {
            kind,
            keyword,
            year,
            month,
            limit,
        } => {
            let query = history_query(kind, keyword, year, month, limit)?;
            emit(out, &room.ledger.query(&query)?)
        }
        Commands::Verify => emit(out, &room.ledger.verify_balances()?),
        Commands::RebuildBalances => emit(out, &room.ledger.rebuild_balances()?),
    }
}

fn history_query(
    kind: KindArg,
    keyword: String,
    year: Option<i32>,
    month: Option<u32>,
    limit: Option<usize>,
) -> StockResult<MovementQuery> {
    let mut query = MovementQuery::new(kind.into()).keyword(keyword);
    match (year, month) {
        (Some(y), Some(m)) => query = query.range(TimeRange::month(y, m)?),
        (Some(y), None) => query = query.range(TimeRange::year(y)?),
        _ => {}
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok(query)
}

fn emit<W: Write, T: Serialize>(out: &mut W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to write output")?;
    writeln!(out).context("failed to write output")
}
