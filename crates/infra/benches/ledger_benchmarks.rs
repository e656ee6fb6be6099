use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{TimeZone, Utc};
use stockledger_core::{EntryId, FixedClock, ItemId};
use stockledger_infra::{InMemoryStockStore, RetryPolicy, SqliteStockStore, StoreConfig, Stockroom};
use stockledger_inventory::{
    Counterparty, ItemDetails, ItemDraft, LedgerEntry, MovementKind, MovementQuery, NewMovement,
    replay_balance,
};
use std::sync::Arc;

fn in_memory_room() -> Stockroom<Arc<InMemoryStockStore>> {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    Stockroom::new(Arc::new(InMemoryStockStore::new()), Arc::new(clock), RetryPolicy::no_retry())
}

fn synthetic_log(item_id: ItemId, len: usize) -> Vec<LedgerEntry> {
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    (0..len)
        .map(|i| {
            let kind = if i % 3 == 0 { MovementKind::Outbound } else { MovementKind::Inbound };
            NewMovement::new(item_id, kind, (i % 17 + 1) as i64, Counterparty::default())
                .unwrap()
                .into_entry(EntryId::new(), i as u64 + 1, at)
        })
        .collect()
}

fn bench_append_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_latency");
    group.throughput(Throughput::Elements(1));

    group.bench_function("in_memory_inbound", |b| {
        let room = in_memory_room();
        let item = room.registry.create(ItemDraft::new("10001", ItemDetails::new("Widget"))).unwrap();
        b.iter(|| {
            room.ledger
                .record_inbound(black_box(item.id), 1, Counterparty::default())
                .unwrap()
        });
    });

    group.bench_function("sqlite_inbound", |b| {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStockStore::open(&StoreConfig::sqlite_file(dir.path().join("bench.db"))).unwrap();
        let room = Stockroom::new(
            Arc::new(store),
            Arc::new(FixedClock::new(Utc::now())),
            RetryPolicy::default(),
        );
        let item = room.registry.create(ItemDraft::new("10001", ItemDetails::new("Widget"))).unwrap();
        b.iter(|| {
            room.ledger
                .record_inbound(black_box(item.id), 1, Counterparty::default().memo("bench"))
                .unwrap()
        });
    });

    group.finish();
}

fn bench_replay_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay_speed");

    for len in [100usize, 1_000, 10_000].iter() {
        let item_id = ItemId::new();
        let log = synthetic_log(item_id, *len);
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &log, |b, log| {
            b.iter(|| replay_balance(black_box(log), item_id));
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_outbound");

    let room = in_memory_room();
    for n in 0..50u64 {
        let item = room
            .registry
            .create(ItemDraft::new((10001 + n).to_string(), ItemDetails::new(format!("Part {n}"))))
            .unwrap();
        room.ledger.record_inbound(item.id, 1_000, Counterparty::default()).unwrap();
        for _ in 0..20 {
            room.ledger
                .record_outbound(item.id, 1, Counterparty::default().destination("Line 1"), false)
                .unwrap();
        }
    }

    group.bench_function("all", |b| {
        let query = MovementQuery::new(MovementKind::Outbound);
        b.iter(|| room.ledger.query(black_box(&query)).unwrap().len());
    });
    group.bench_function("keyword", |b| {
        let query = MovementQuery::new(MovementKind::Outbound).keyword("part 4");
        b.iter(|| room.ledger.query(black_box(&query)).unwrap().len());
    });

    group.finish();
}

criterion_group!(benches, bench_append_latency, bench_replay_speed, bench_query);
criterion_main!(benches);
