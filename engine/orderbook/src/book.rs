//! The authoritative matching engine state: submit / cancel / amend over two
//! `BookSide`s, an order-id index, and snapshot construction.

use std::collections::HashMap;

use protocol::{
    ErrorCode, Id, Lifespan, Price, Side, Volume, MAXIMUM_ASK, MAX_ORDERS, MINIMUM_BID,
    ORDER_BOOK_MESSAGE_DEPTH,
};
use tracing::debug;

use crate::arena::OrderHandle;
use crate::callbacks::OrderBookCallbacks;
use crate::clock;
use crate::side::BookSide;

/// Top-of-book to depth 10, zero-filled past the last non-empty level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BookSnapshot {
    pub bid_prices: [Price; ORDER_BOOK_MESSAGE_DEPTH],
    pub bid_volumes: [Volume; ORDER_BOOK_MESSAGE_DEPTH],
    pub ask_prices: [Price; ORDER_BOOK_MESSAGE_DEPTH],
    pub ask_volumes: [Volume; ORDER_BOOK_MESSAGE_DEPTH],
}

pub struct OrderBook {
    bids: BookSide,
    asks: BookSide,
    /// `order_id -> (side, slot)`; the single source of truth for liveness.
    index: HashMap<Id, (Side, OrderHandle)>,
    next_order_id: Id,
    /// Scratch for fully-filled maker ids, reused across submits.
    filled_scratch: Vec<Id>,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
            index: HashMap::with_capacity(MAX_ORDERS),
            next_order_id: 1,
            filled_scratch: Vec::with_capacity(64),
        }
    }

    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    #[inline]
    pub fn level_total(&self, side: Side, price: Price) -> Volume {
        match side {
            Side::Buy => self.bids.level_total(price),
            Side::Sell => self.asks.level_total(price),
        }
    }

    #[inline]
    pub fn open_orders(&self) -> usize {
        self.index.len()
    }

    /// True while the order id maps to a live resting order.
    #[inline]
    pub fn is_live(&self, order_id: Id) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Submit a limit order: validate, cross against the opposite side in
    /// price-time order, then rest the residual (GFD) or drop it (FAK).
    #[allow(clippy::too_many_arguments)]
    pub fn submit_order<C: OrderBookCallbacks>(
        &mut self,
        cb: &mut C,
        price: Price,
        quantity: Volume,
        side: Side,
        lifespan: Lifespan,
        client_id: Id,
        client_request_id: Id,
    ) {
        if quantity == 0 {
            cb.on_error(
                client_id,
                client_request_id,
                ErrorCode::InvalidVolume,
                ErrorCode::InvalidVolume.message(),
                clock::utc_now_ns(),
            );
            return;
        }
        if !(MINIMUM_BID..=MAXIMUM_ASK).contains(&price) {
            cb.on_error(
                client_id,
                client_request_id,
                ErrorCode::InvalidPrice,
                ErrorCode::InvalidPrice.message(),
                clock::utc_now_ns(),
            );
            return;
        }

        let order_id = self.next_order_id;
        self.next_order_id = self.next_order_id.wrapping_add(1);

        let mut filled = std::mem::take(&mut self.filled_scratch);
        filled.clear();

        let (opposite, own) = match side {
            Side::Buy => (&mut self.asks, &mut self.bids),
            Side::Sell => (&mut self.bids, &mut self.asks),
        };
        let remaining =
            opposite.match_incoming(cb, price, quantity, order_id, client_id, &mut filled);
        for id in filled.drain(..) {
            self.index.remove(&id);
        }
        self.filled_scratch = filled;

        if remaining == 0 {
            return;
        }
        if lifespan == Lifespan::FillAndKill {
            // FAK residual is dropped without an event.
            debug!(order_id, remaining, "fill-and-kill residual dropped");
            return;
        }

        match own.add_order(price, quantity, remaining, order_id, client_id) {
            Some(handle) => {
                self.index.insert(order_id, (side, handle));
                let now = clock::utc_now_ns();
                let order = match side {
                    Side::Buy => *self.bids_order(handle),
                    Side::Sell => *self.asks_order(handle),
                };
                cb.on_order_inserted(client_request_id, &order, now);
                let total = self.level_total(side, price);
                cb.on_level_update(side, price, total, now);
            }
            None => {
                cb.on_error(
                    client_id,
                    client_request_id,
                    ErrorCode::OrderBookFull,
                    ErrorCode::OrderBookFull.message(),
                    clock::utc_now_ns(),
                );
            }
        }
    }

    /// Cancel a resting order owned by `client_id`.
    pub fn cancel_order<C: OrderBookCallbacks>(
        &mut self,
        cb: &mut C,
        client_id: Id,
        client_request_id: Id,
        order_id: Id,
    ) {
        let Some(&(side, handle)) = self.index.get(&order_id) else {
            cb.on_error(
                client_id,
                client_request_id,
                ErrorCode::OrderNotFound,
                ErrorCode::OrderNotFound.message(),
                clock::utc_now_ns(),
            );
            return;
        };

        let owner = match side {
            Side::Buy => self.bids_order(handle).client_id,
            Side::Sell => self.asks_order(handle).client_id,
        };
        if owner != client_id {
            cb.on_error(
                client_id,
                client_request_id,
                ErrorCode::Unauthorised,
                ErrorCode::Unauthorised.message(),
                clock::utc_now_ns(),
            );
            return;
        }

        let order = match side {
            Side::Buy => self.bids.remove_order(handle),
            Side::Sell => self.asks.remove_order(handle),
        };
        self.index.remove(&order_id);

        let now = clock::utc_now_ns();
        cb.on_order_cancelled(client_request_id, &order, now);
        let total = self.level_total(side, order.price);
        cb.on_level_update(side, order.price, total, now);
    }

    /// Amend a resting order's total quantity. Strictly a decrease of the
    /// remaining quantity; a same-remaining amend is acknowledged without
    /// touching book state, and an amend to zero remaining destroys the
    /// order.
    pub fn amend_order<C: OrderBookCallbacks>(
        &mut self,
        cb: &mut C,
        client_id: Id,
        client_request_id: Id,
        order_id: Id,
        new_total_quantity: Volume,
    ) {
        let Some(&(side, handle)) = self.index.get(&order_id) else {
            cb.on_error(
                client_id,
                client_request_id,
                ErrorCode::OrderNotFound,
                ErrorCode::OrderNotFound.message(),
                clock::utc_now_ns(),
            );
            return;
        };

        let current = match side {
            Side::Buy => *self.bids_order(handle),
            Side::Sell => *self.asks_order(handle),
        };
        if current.client_id != client_id {
            cb.on_error(
                client_id,
                client_request_id,
                ErrorCode::Unauthorised,
                ErrorCode::Unauthorised.message(),
                clock::utc_now_ns(),
            );
            return;
        }

        // Increases (of remaining quantity) lose time priority and must go
        // through cancel + new order; they are rejected here.
        if new_total_quantity < current.quantity_cumulative {
            cb.on_error(
                client_id,
                client_request_id,
                ErrorCode::InvalidVolume,
                ErrorCode::InvalidVolume.message(),
                clock::utc_now_ns(),
            );
            return;
        }
        let new_remaining = new_total_quantity - current.quantity_cumulative;
        if new_remaining > current.quantity_remaining {
            cb.on_error(
                client_id,
                client_request_id,
                ErrorCode::InvalidVolume,
                ErrorCode::InvalidVolume.message(),
                clock::utc_now_ns(),
            );
            return;
        }

        let old_total = current.quantity_total;
        let delta = current.quantity_remaining - new_remaining;
        let now = clock::utc_now_ns();

        if delta == 0 {
            // No-op amend: acknowledged, book untouched.
            let mut order = current;
            order.quantity_total = new_total_quantity;
            cb.on_order_amended(client_request_id, old_total, &order, now);
            return;
        }

        let order = match side {
            Side::Buy => self.bids.reduce_order(handle, new_total_quantity, delta),
            Side::Sell => self.asks.reduce_order(handle, new_total_quantity, delta),
        };
        cb.on_order_amended(client_request_id, old_total, &order, now);
        let total = self.level_total(side, order.price);
        cb.on_level_update(side, order.price, total, now);

        if order.quantity_remaining == 0 {
            match side {
                Side::Buy => {
                    self.bids.remove_order(handle);
                }
                Side::Sell => {
                    self.asks.remove_order(handle);
                }
            }
            self.index.remove(&order_id);
        }
    }

    /// Depth-10 view of both sides from the touch outward, empty levels
    /// skipped, unused slots zero-filled.
    pub fn build_snapshot(&self) -> BookSnapshot {
        let mut snap = BookSnapshot::default();
        self.bids.top_levels(&mut snap.bid_prices, &mut snap.bid_volumes);
        self.asks.top_levels(&mut snap.ask_prices, &mut snap.ask_volumes);
        snap
    }

    #[inline]
    fn bids_order(&self, h: OrderHandle) -> &crate::arena::Order {
        self.bids.order(h)
    }

    #[inline]
    fn asks_order(&self, h: OrderHandle) -> &crate::arena::Order {
        self.asks.order(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Timestamp;

    #[derive(Debug, Clone, PartialEq)]
    enum Ev {
        Trade {
            maker_order_id: Id,
            maker_leaves: Volume,
            taker_order_id: Id,
            price: Price,
            taker_cumulative: Volume,
            quantity: Volume,
        },
        Inserted { request_id: Id, order_id: Id, price: Price, leaves: Volume, side: Side },
        Cancelled { request_id: Id, order_id: Id, leaves: Volume },
        Amended { request_id: Id, order_id: Id, old_total: Volume, new_total: Volume, leaves: Volume },
        Level { side: Side, price: Price, total: Volume },
        Error { client_id: Id, request_id: Id, code: ErrorCode },
    }

    #[derive(Default)]
    struct Spy {
        events: Vec<Ev>,
    }

    impl Spy {
        fn last_inserted_id(&self) -> Id {
            self.events
                .iter()
                .rev()
                .find_map(|e| match e {
                    Ev::Inserted { order_id, .. } => Some(*order_id),
                    _ => None,
                })
                .expect("no insert recorded")
        }
    }

    impl OrderBookCallbacks for Spy {
        fn on_trade(
            &mut self,
            maker: &crate::arena::Order,
            _taker_client_id: Id,
            taker_order_id: Id,
            price: Price,
            _taker_total_quantity: Volume,
            taker_cumulative_quantity: Volume,
            traded_quantity: Volume,
            _timestamp: Timestamp,
        ) {
            self.events.push(Ev::Trade {
                maker_order_id: maker.order_id,
                maker_leaves: maker.quantity_remaining,
                taker_order_id,
                price,
                taker_cumulative: taker_cumulative_quantity,
                quantity: traded_quantity,
            });
        }

        fn on_order_inserted(&mut self, client_request_id: Id, order: &crate::arena::Order, _t: Timestamp) {
            self.events.push(Ev::Inserted {
                request_id: client_request_id,
                order_id: order.order_id,
                price: order.price,
                leaves: order.quantity_remaining,
                side: order.side,
            });
        }

        fn on_order_cancelled(&mut self, client_request_id: Id, order: &crate::arena::Order, _t: Timestamp) {
            self.events.push(Ev::Cancelled {
                request_id: client_request_id,
                order_id: order.order_id,
                leaves: order.quantity_remaining,
            });
        }

        fn on_order_amended(
            &mut self,
            client_request_id: Id,
            quantity_old: Volume,
            order: &crate::arena::Order,
            _t: Timestamp,
        ) {
            self.events.push(Ev::Amended {
                request_id: client_request_id,
                order_id: order.order_id,
                old_total: quantity_old,
                new_total: order.quantity_total,
                leaves: order.quantity_remaining,
            });
        }

        fn on_level_update(&mut self, side: Side, price: Price, total_quantity: Volume, _t: Timestamp) {
            self.events.push(Ev::Level { side, price, total: total_quantity });
        }

        fn on_error(
            &mut self,
            client_id: Id,
            client_request_id: Id,
            code: ErrorCode,
            _message: &str,
            _t: Timestamp,
        ) {
            self.events.push(Ev::Error { client_id, request_id: client_request_id, code });
        }
    }

    const GFD: Lifespan = Lifespan::GoodForDay;
    const FAK: Lifespan = Lifespan::FillAndKill;

    #[test]
    fn resting_order_is_confirmed_with_level_update() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 10, Side::Buy, GFD, 1, 7);

        assert_eq!(spy.events.len(), 2);
        assert!(matches!(
            spy.events[0],
            Ev::Inserted { request_id: 7, price: 100, leaves: 10, side: Side::Buy, .. }
        ));
        assert_eq!(spy.events[1], Ev::Level { side: Side::Buy, price: 100, total: 10 });
        assert_eq!(book.best_bid(), Some(100));
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn simple_match_partial_maker() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 10, Side::Buy, GFD, 1, 0);
        let maker_id = spy.last_inserted_id();
        spy.events.clear();

        book.submit_order(&mut spy, 100, 7, Side::Sell, GFD, 2, 1);

        assert_eq!(
            spy.events,
            vec![
                Ev::Trade {
                    maker_order_id: maker_id,
                    maker_leaves: 3,
                    taker_order_id: maker_id + 1,
                    price: 100,
                    taker_cumulative: 7,
                    quantity: 7,
                },
                Ev::Level { side: Side::Buy, price: 100, total: 3 },
            ]
        );
        assert_eq!(book.level_total(Side::Buy, 100), 3);
        assert_eq!(book.best_ask(), None, "no ask residual should rest");
        assert!(book.is_live(maker_id));
    }

    #[test]
    fn walks_multiple_levels_at_maker_prices() {
        // Trades print at the makers' resting prices, not the taker limit.
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 101, 5, Side::Buy, GFD, 1, 0);
        book.submit_order(&mut spy, 100, 10, Side::Buy, GFD, 1, 1);
        spy.events.clear();

        book.submit_order(&mut spy, 99, 12, Side::Sell, GFD, 2, 2);

        let trades: Vec<_> = spy
            .events
            .iter()
            .filter_map(|e| match e {
                Ev::Trade { price, quantity, .. } => Some((*price, *quantity)),
                _ => None,
            })
            .collect();
        assert_eq!(trades, vec![(101, 5), (100, 7)]);

        let levels: Vec<_> = spy
            .events
            .iter()
            .filter_map(|e| match e {
                Ev::Level { price, total, .. } => Some((*price, *total)),
                _ => None,
            })
            .collect();
        assert_eq!(levels, vec![(101, 0), (100, 3)]);

        assert_eq!(book.best_bid(), Some(100));
        assert_eq!(book.best_ask(), None);
        assert!(!spy.events.iter().any(|e| matches!(e, Ev::Inserted { .. })));
    }

    #[test]
    fn fak_residual_is_dropped_silently() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 5, Side::Buy, FAK, 1, 0);

        assert!(spy.events.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.open_orders(), 0);
    }

    #[test]
    fn fak_still_matches_before_dropping() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 4, Side::Sell, GFD, 1, 0);
        spy.events.clear();

        book.submit_order(&mut spy, 100, 10, Side::Buy, FAK, 2, 1);
        let trades: Vec<_> =
            spy.events.iter().filter(|e| matches!(e, Ev::Trade { .. })).collect();
        assert_eq!(trades.len(), 1);
        assert!(!spy.events.iter().any(|e| matches!(e, Ev::Inserted { .. })));
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn cancel_by_wrong_owner_is_rejected_without_mutation() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 5, Side::Buy, GFD, 1, 0);
        let order_id = spy.last_inserted_id();
        spy.events.clear();

        book.cancel_order(&mut spy, 3, 9, order_id);
        assert_eq!(
            spy.events,
            vec![Ev::Error { client_id: 3, request_id: 9, code: ErrorCode::Unauthorised }]
        );
        assert!(book.is_live(order_id));
        assert_eq!(book.level_total(Side::Buy, 100), 5);
    }

    #[test]
    fn cancel_unknown_order_reports_not_found() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.cancel_order(&mut spy, 1, 2, 999);
        assert_eq!(
            spy.events,
            vec![Ev::Error { client_id: 1, request_id: 2, code: ErrorCode::OrderNotFound }]
        );
    }

    #[test]
    fn amend_decrease_updates_level_and_emits() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 10, Side::Buy, GFD, 1, 0);
        let order_id = spy.last_inserted_id();
        spy.events.clear();

        book.amend_order(&mut spy, 1, 5, order_id, 6);
        assert_eq!(
            spy.events,
            vec![
                Ev::Amended { request_id: 5, order_id, old_total: 10, new_total: 6, leaves: 6 },
                Ev::Level { side: Side::Buy, price: 100, total: 6 },
            ]
        );
        assert_eq!(book.level_total(Side::Buy, 100), 6);
    }

    #[test]
    fn amend_same_remaining_is_noop_but_acknowledged() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 10, Side::Buy, GFD, 1, 0);
        let order_id = spy.last_inserted_id();
        spy.events.clear();

        book.amend_order(&mut spy, 1, 6, order_id, 10);
        assert_eq!(
            spy.events,
            vec![Ev::Amended { request_id: 6, order_id, old_total: 10, new_total: 10, leaves: 10 }]
        );
        assert_eq!(book.level_total(Side::Buy, 100), 10);
    }

    #[test]
    fn amend_increase_is_rejected() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 10, Side::Buy, GFD, 1, 0);
        let order_id = spy.last_inserted_id();
        spy.events.clear();

        book.amend_order(&mut spy, 1, 7, order_id, 15);
        assert_eq!(
            spy.events,
            vec![Ev::Error { client_id: 1, request_id: 7, code: ErrorCode::InvalidVolume }]
        );
        assert_eq!(book.level_total(Side::Buy, 100), 10);
    }

    #[test]
    fn amend_below_filled_quantity_is_rejected() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 10, Side::Buy, GFD, 1, 0);
        let order_id = spy.last_inserted_id();
        // Fill 4 of the 10.
        book.submit_order(&mut spy, 100, 4, Side::Sell, GFD, 2, 1);
        spy.events.clear();

        book.amend_order(&mut spy, 1, 8, order_id, 3);
        assert_eq!(
            spy.events,
            vec![Ev::Error { client_id: 1, request_id: 8, code: ErrorCode::InvalidVolume }]
        );
        assert_eq!(book.level_total(Side::Buy, 100), 6);
    }

    #[test]
    fn amend_to_zero_remaining_destroys_the_order() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 10, Side::Buy, GFD, 1, 0);
        let order_id = spy.last_inserted_id();
        // Fill 4, then amend total down to the cumulative fill.
        book.submit_order(&mut spy, 100, 4, Side::Sell, GFD, 2, 1);
        spy.events.clear();

        book.amend_order(&mut spy, 1, 9, order_id, 4);
        assert!(matches!(spy.events[0], Ev::Amended { leaves: 0, .. }));
        assert_eq!(spy.events[1], Ev::Level { side: Side::Buy, price: 100, total: 0 });
        assert!(!book.is_live(order_id));
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn validation_errors_do_not_mutate() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();

        book.submit_order(&mut spy, 100, 0, Side::Buy, GFD, 1, 0);
        book.submit_order(&mut spy, 0, 5, Side::Buy, GFD, 1, 1);
        book.submit_order(&mut spy, MAXIMUM_ASK + 1, 5, Side::Buy, GFD, 1, 2);

        assert_eq!(
            spy.events,
            vec![
                Ev::Error { client_id: 1, request_id: 0, code: ErrorCode::InvalidVolume },
                Ev::Error { client_id: 1, request_id: 1, code: ErrorCode::InvalidPrice },
                Ev::Error { client_id: 1, request_id: 2, code: ErrorCode::InvalidPrice },
            ]
        );
        assert_eq!(book.open_orders(), 0);
    }

    #[test]
    fn submit_then_cancel_restores_book() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 105, 3, Side::Sell, GFD, 1, 0);
        let before_bid = book.best_bid();
        let before_ask = book.best_ask();

        book.submit_order(&mut spy, 101, 8, Side::Sell, GFD, 1, 1);
        let order_id = spy.last_inserted_id();
        assert_eq!(book.best_ask(), Some(101));

        book.cancel_order(&mut spy, 1, 2, order_id);
        assert_eq!(book.best_bid(), before_bid);
        assert_eq!(book.best_ask(), before_ask);
        assert_eq!(book.level_total(Side::Sell, 101), 0);
        assert_eq!(book.level_total(Side::Sell, 105), 3);
    }

    #[test]
    fn cancel_of_non_touch_level_keeps_the_best() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 95, 4, Side::Buy, GFD, 1, 0);
        let deep = spy.last_inserted_id();
        book.submit_order(&mut spy, 100, 5, Side::Buy, GFD, 1, 1);
        assert_eq!(book.best_bid(), Some(100));

        book.cancel_order(&mut spy, 1, 2, deep);
        assert_eq!(book.best_bid(), Some(100), "emptying a deeper level must not move the touch");
        assert_eq!(book.level_total(Side::Buy, 95), 0);
    }

    #[test]
    fn fifo_priority_within_level() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 5, Side::Buy, GFD, 1, 0);
        let first = spy.last_inserted_id();
        book.submit_order(&mut spy, 100, 5, Side::Buy, GFD, 2, 1);
        let second = spy.last_inserted_id();
        spy.events.clear();

        book.submit_order(&mut spy, 100, 6, Side::Sell, GFD, 3, 2);
        let trade_makers: Vec<_> = spy
            .events
            .iter()
            .filter_map(|e| match e {
                Ev::Trade { maker_order_id, quantity, .. } => Some((*maker_order_id, *quantity)),
                _ => None,
            })
            .collect();
        assert_eq!(trade_makers, vec![(first, 5), (second, 1)]);
        assert!(!book.is_live(first));
        assert!(book.is_live(second));
    }

    #[test]
    fn taker_cumulative_totals_match_filled_quantity() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 102, 4, Side::Sell, GFD, 1, 0);
        book.submit_order(&mut spy, 103, 4, Side::Sell, GFD, 1, 1);
        spy.events.clear();

        book.submit_order(&mut spy, 103, 10, Side::Buy, GFD, 2, 2);
        let cumulative: Vec<_> = spy
            .events
            .iter()
            .filter_map(|e| match e {
                Ev::Trade { taker_cumulative, .. } => Some(*taker_cumulative),
                _ => None,
            })
            .collect();
        assert_eq!(cumulative, vec![4, 8]);

        // Residual 2 rests at 103 on the bid side.
        assert_eq!(book.level_total(Side::Buy, 103), 2);
        let total_traded: Volume = spy
            .events
            .iter()
            .filter_map(|e| match e {
                Ev::Trade { quantity, .. } => Some(*quantity),
                _ => None,
            })
            .sum();
        assert_eq!(total_traded, 10 - 2);
    }

    #[test]
    fn book_never_crossed_after_operations() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 100, 5, Side::Buy, GFD, 1, 0);
        book.submit_order(&mut spy, 102, 5, Side::Sell, GFD, 1, 1);
        book.submit_order(&mut spy, 101, 5, Side::Buy, GFD, 2, 2);
        book.submit_order(&mut spy, 101, 2, Side::Sell, GFD, 3, 3);

        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            assert!(bid < ask, "book crossed: bid {bid} >= ask {ask}");
        }
    }

    #[test]
    fn snapshot_lists_levels_from_touch_outward() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 101, 3, Side::Buy, GFD, 1, 0);
        book.submit_order(&mut spy, 100, 7, Side::Buy, GFD, 1, 1);
        book.submit_order(&mut spy, 102, 5, Side::Sell, GFD, 2, 2);

        let snap = book.build_snapshot();
        assert_eq!(snap.bid_prices[0], 101);
        assert_eq!(snap.bid_prices[1], 100);
        assert_eq!(snap.bid_volumes[0], 3);
        assert_eq!(snap.bid_volumes[1], 7);
        assert_eq!(snap.ask_prices[0], 102);
        assert_eq!(snap.ask_volumes[0], 5);
        assert!(snap.bid_prices[2..].iter().all(|&p| p == 0));
        assert!(snap.ask_prices[1..].iter().all(|&p| p == 0));
        assert!(snap.bid_volumes[2..].iter().all(|&v| v == 0));
        assert!(snap.ask_volumes[1..].iter().all(|&v| v == 0));
    }

    #[test]
    fn snapshot_skips_emptied_levels() {
        let mut book = OrderBook::new();
        let mut spy = Spy::default();
        book.submit_order(&mut spy, 101, 3, Side::Sell, GFD, 1, 0);
        book.submit_order(&mut spy, 103, 4, Side::Sell, GFD, 1, 1);
        book.submit_order(&mut spy, 101, 3, Side::Buy, GFD, 2, 2); // clears 101

        let snap = book.build_snapshot();
        assert_eq!(snap.ask_prices[0], 103);
        assert_eq!(snap.ask_volumes[0], 4);
    }
}
