//! Notification surface of the matching engine.
//!
//! The book performs no I/O: every externally visible effect of a submit,
//! cancel or amend flows through this trait. The exchange translates the
//! calls into wire frames; tests plug in recording spies.

use protocol::{ErrorCode, Id, Price, Side, Timestamp, Volume};

use crate::arena::Order;

pub trait OrderBookCallbacks {
    /// One call per fill. `maker` is the resting order after the fill has
    /// been applied; `price` is the maker's resting price.
    #[allow(clippy::too_many_arguments)]
    fn on_trade(
        &mut self,
        maker: &Order,
        taker_client_id: Id,
        taker_order_id: Id,
        price: Price,
        taker_total_quantity: Volume,
        taker_cumulative_quantity: Volume,
        traded_quantity: Volume,
        timestamp: Timestamp,
    );

    fn on_order_inserted(&mut self, client_request_id: Id, order: &Order, timestamp: Timestamp);

    fn on_order_cancelled(&mut self, client_request_id: Id, order: &Order, timestamp: Timestamp);

    fn on_order_amended(
        &mut self,
        client_request_id: Id,
        quantity_old: Volume,
        order: &Order,
        timestamp: Timestamp,
    );

    /// Aggregate quantity now resting at `price` on `side`.
    fn on_level_update(&mut self, side: Side, price: Price, total_quantity: Volume, timestamp: Timestamp);

    fn on_error(
        &mut self,
        client_id: Id,
        client_request_id: Id,
        code: ErrorCode,
        message: &str,
        timestamp: Timestamp,
    );
}
