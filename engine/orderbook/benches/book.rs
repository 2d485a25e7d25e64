use criterion::{criterion_group, criterion_main, Criterion};
use orderbook::{Order, OrderBook, OrderBookCallbacks};
use protocol::{ErrorCode, Id, Lifespan, Price, Side, Timestamp, Volume};
use rand::prelude::*;
use rand_pcg::Pcg32;

struct NullSink;

impl OrderBookCallbacks for NullSink {
    fn on_trade(
        &mut self,
        _maker: &Order,
        _taker_client_id: Id,
        _taker_order_id: Id,
        _price: Price,
        _taker_total_quantity: Volume,
        _taker_cumulative_quantity: Volume,
        _traded_quantity: Volume,
        _timestamp: Timestamp,
    ) {
    }
    fn on_order_inserted(&mut self, _r: Id, _o: &Order, _t: Timestamp) {}
    fn on_order_cancelled(&mut self, _r: Id, _o: &Order, _t: Timestamp) {}
    fn on_order_amended(&mut self, _r: Id, _old: Volume, _o: &Order, _t: Timestamp) {}
    fn on_level_update(&mut self, _s: Side, _p: Price, _q: Volume, _t: Timestamp) {}
    fn on_error(&mut self, _c: Id, _r: Id, _code: ErrorCode, _m: &str, _t: Timestamp) {}
}

fn bench_submit_cancel(c: &mut Criterion) {
    c.bench_function("submit_cancel_mixed", |b| {
        b.iter_batched(
            || (OrderBook::new(), Pcg32::seed_from_u64(7)),
            |(mut book, mut rng)| {
                let mut sink = NullSink;
                for op in 0..1_000u32 {
                    let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                    let price = rng.gen_range(990..1010);
                    let qty = rng.gen_range(1..100);
                    book.submit_order(&mut sink, price, qty, side, Lifespan::GoodForDay, 1, op);
                }
                book
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let mut book = OrderBook::new();
    let mut sink = NullSink;
    let mut rng = Pcg32::seed_from_u64(11);
    for op in 0..2_000u32 {
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let price = rng.gen_range(900..1100);
        let qty = rng.gen_range(1..50);
        book.submit_order(&mut sink, price, qty, side, Lifespan::GoodForDay, 1, op);
    }
    c.bench_function("build_snapshot_depth10", |b| b.iter(|| book.build_snapshot()));
}

criterion_group!(benches, bench_submit_cancel, bench_snapshot);
criterion_main!(benches);
