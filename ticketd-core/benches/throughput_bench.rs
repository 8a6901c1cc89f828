use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ticketd_core::events::{EventSink, LeaseEvent};
use ticketd_core::liveness::LivenessProbe;
use ticketd_core::protocol::ProtocolHandler;
use ticketd_core::table::LeaseTable;
use ticketd_core::types::HolderId;

struct NullSink;

impl EventSink for NullSink {
    fn record(&self, event: LeaseEvent) {
        black_box(event);
    }
}

fn holder(raw: u32) -> HolderId {
    HolderId::new(raw).expect("non-zero holder")
}

fn bench_acquire_release(c: &mut Criterion) {
    c.bench_function("acquire_release_cycle", |b| {
        let mut table = LeaseTable::with_capacity(3);
        b.iter(|| {
            let ticket = table.acquire(holder(4242)).expect("slot free");
            table.release(black_box(&ticket)).expect("valid ticket");
        })
    });
}

fn bench_protocol(c: &mut Criterion) {
    let sink = NullSink;

    c.bench_function("protocol_hello_gbye", |b| {
        let mut table = LeaseTable::with_capacity(3);
        b.iter(|| {
            let reply = ProtocolHandler::handle(&mut table, &sink, b"HELLO 4242", None);
            black_box(reply);
            let reply = ProtocolHandler::handle(&mut table, &sink, b"GBYE 4242.0", None);
            black_box(reply);
        })
    });
}

fn bench_reclaim(c: &mut Criterion) {
    let mut group = c.benchmark_group("reclaim_sweep");

    for capacity in [3, 64, 1024] {
        group.bench_with_input(
            BenchmarkId::new("slots", capacity),
            &capacity,
            |b, &capacity| {
                let probe = |h: HolderId| h.get() % 2 == 0;
                b.iter(|| {
                    let mut table = LeaseTable::with_capacity(capacity);
                    for raw in 1..=capacity as u32 {
                        let _ = table.acquire(holder(raw));
                    }
                    black_box(table.reclaim_dead(&probe as &dyn LivenessProbe).len())
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_acquire_release, bench_protocol, bench_reclaim);
criterion_main!(benches);
