//! One side of the book: a dense array of price levels over the tick grid
//! plus the arena holding that side's resting orders.

use protocol::{Id, Price, Side, Volume, MAXIMUM_ASK, MAX_ORDERS, MINIMUM_BID, NUM_BOOK_LEVELS, TICK_SIZE};

use crate::arena::{Order, OrderArena, OrderHandle, NONE};
use crate::callbacks::OrderBookCallbacks;
use crate::clock;

/// FIFO chain plus running total for a single tick.
#[derive(Clone, Copy)]
pub struct PriceLevel {
    pub head: OrderHandle,
    pub tail: OrderHandle,
    pub total_quantity: Volume,
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self { head: NONE, tail: NONE, total_quantity: 0 }
    }
}

#[inline]
pub(crate) fn price_to_index(price: Price) -> usize {
    debug_assert!((MINIMUM_BID..=MAXIMUM_ASK).contains(&price));
    ((price - MINIMUM_BID) / TICK_SIZE) as usize
}

#[inline]
pub(crate) fn index_to_price(idx: usize) -> Price {
    MINIMUM_BID + idx as Price * TICK_SIZE
}

pub struct BookSide {
    levels: Box<[PriceLevel]>,
    pool: OrderArena,
    side: Side,
    /// Index of the touch; `NUM_BOOK_LEVELS` when the side is empty.
    best_price_index: usize,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            levels: vec![PriceLevel::default(); NUM_BOOK_LEVELS].into_boxed_slice(),
            pool: OrderArena::with_capacity(MAX_ORDERS),
            side,
            best_price_index: NUM_BOOK_LEVELS,
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    #[inline]
    pub fn best_price(&self) -> Option<Price> {
        (self.best_price_index < NUM_BOOK_LEVELS).then(|| index_to_price(self.best_price_index))
    }

    #[inline]
    pub fn level_total(&self, price: Price) -> Volume {
        self.levels[price_to_index(price)].total_quantity
    }

    #[inline]
    pub(crate) fn order(&self, h: OrderHandle) -> &Order {
        self.pool.get(h)
    }

    #[inline]
    pub fn open_orders(&self) -> usize {
        self.pool.in_use()
    }

    fn update_best_after_insert(&mut self, idx: usize) {
        if self.best_price_index == NUM_BOOK_LEVELS {
            self.best_price_index = idx;
            return;
        }
        match self.side {
            Side::Buy if idx > self.best_price_index => self.best_price_index = idx,
            Side::Sell if idx < self.best_price_index => self.best_price_index = idx,
            _ => {}
        }
    }

    fn update_best_after_empty(&mut self, old_idx: usize) {
        // Only an emptied touch moves the best pointer.
        if old_idx != self.best_price_index {
            return;
        }
        match self.side {
            Side::Buy => {
                for i in (0..old_idx).rev() {
                    if self.levels[i].total_quantity > 0 {
                        self.best_price_index = i;
                        return;
                    }
                }
                self.best_price_index = NUM_BOOK_LEVELS;
            }
            Side::Sell => {
                for i in (old_idx + 1)..NUM_BOOK_LEVELS {
                    if self.levels[i].total_quantity > 0 {
                        self.best_price_index = i;
                        return;
                    }
                }
                self.best_price_index = NUM_BOOK_LEVELS;
            }
        }
    }

    /// Rest a residual at its price level, FIFO order. Returns `None` when
    /// the arena has no free slot.
    pub(crate) fn add_order(
        &mut self,
        price: Price,
        quantity_total: Volume,
        quantity_remaining: Volume,
        order_id: Id,
        client_id: Id,
    ) -> Option<OrderHandle> {
        debug_assert!(quantity_remaining > 0);
        let idx = price_to_index(price);
        let h = self.pool.alloc()?;

        let tail = self.levels[idx].tail;
        {
            let o = self.pool.get_mut(h);
            o.order_id = order_id;
            o.client_id = client_id;
            o.price = price;
            o.side = self.side;
            o.quantity_total = quantity_total;
            o.quantity_remaining = quantity_remaining;
            o.quantity_cumulative = quantity_total - quantity_remaining;
            o.prev = tail;
            o.next = NONE;
        }

        if tail == NONE {
            self.levels[idx].head = h;
        } else {
            self.pool.get_mut(tail).next = h;
        }
        self.levels[idx].tail = h;
        self.levels[idx].total_quantity += quantity_remaining;
        self.update_best_after_insert(idx);
        Some(h)
    }

    /// Unlink a resting order, subtract its remaining quantity from the
    /// level total, maintain the touch, and free the slot. Returns a copy of
    /// the order as it was at removal.
    pub(crate) fn remove_order(&mut self, h: OrderHandle) -> Order {
        let order = *self.pool.get(h);
        let idx = price_to_index(order.price);

        if order.prev != NONE {
            self.pool.get_mut(order.prev).next = order.next;
        } else {
            self.levels[idx].head = order.next;
        }
        if order.next != NONE {
            self.pool.get_mut(order.next).prev = order.prev;
        } else {
            self.levels[idx].tail = order.prev;
        }

        self.levels[idx].total_quantity -= order.quantity_remaining;
        debug_assert!(
            (self.levels[idx].total_quantity == 0) == (self.levels[idx].head == NONE),
            "level total out of step with its chain"
        );
        if self.levels[idx].head == NONE {
            self.update_best_after_empty(idx);
        }
        self.pool.free(h);
        order
    }

    /// Shrink a resting order's total and remaining quantity in place
    /// (amend-decrease). Returns a copy of the amended order.
    pub(crate) fn reduce_order(&mut self, h: OrderHandle, new_total: Volume, delta: Volume) -> Order {
        let idx = {
            let o = self.pool.get_mut(h);
            debug_assert!(delta <= o.quantity_remaining);
            o.quantity_total = new_total;
            o.quantity_remaining -= delta;
            price_to_index(o.price)
        };
        self.levels[idx].total_quantity -= delta;
        *self.pool.get(h)
    }

    /// Walk this side from the touch, consuming crossable liquidity in
    /// price-time order against an incoming order of the opposite side.
    /// Emits one `on_trade` per fill and one `on_level_update` per level
    /// touched; fully filled maker ids are pushed to `filled`.
    /// Returns the incoming order's unmatched remainder.
    pub(crate) fn match_incoming<C: OrderBookCallbacks>(
        &mut self,
        cb: &mut C,
        limit_price: Price,
        incoming_quantity: Volume,
        taker_order_id: Id,
        taker_client_id: Id,
        filled: &mut Vec<Id>,
    ) -> Volume {
        let mut remaining = incoming_quantity;

        while remaining > 0 {
            if self.best_price_index == NUM_BOOK_LEVELS {
                break;
            }
            let level_idx = self.best_price_index;
            let level_price = index_to_price(level_idx);
            let crossable = match self.side {
                // Incoming buy consumes asks priced at or below its limit.
                Side::Sell => level_price <= limit_price,
                // Incoming sell consumes bids priced at or above its limit.
                Side::Buy => level_price >= limit_price,
            };
            if !crossable {
                break;
            }

            let mut emptied = false;
            while remaining > 0 {
                let head = self.levels[level_idx].head;
                debug_assert!(head != NONE, "best level must be non-empty");
                let now = clock::utc_now_ns();

                let (maker, fill) = {
                    let o = self.pool.get_mut(head);
                    let fill = o.quantity_remaining.min(remaining);
                    o.quantity_remaining -= fill;
                    o.quantity_cumulative += fill;
                    (*o, fill)
                };
                remaining -= fill;
                self.levels[level_idx].total_quantity -= fill;

                cb.on_trade(
                    &maker,
                    taker_client_id,
                    taker_order_id,
                    level_price,
                    incoming_quantity,
                    incoming_quantity - remaining,
                    fill,
                    now,
                );

                if maker.quantity_remaining == 0 {
                    filled.push(maker.order_id);
                    let next = maker.next;
                    self.levels[level_idx].head = next;
                    if next == NONE {
                        self.levels[level_idx].tail = NONE;
                        emptied = true;
                    } else {
                        self.pool.get_mut(next).prev = NONE;
                    }
                    self.pool.free(head);
                    if emptied {
                        break;
                    }
                }
            }

            let now = clock::utc_now_ns();
            cb.on_level_update(
                self.side,
                level_price,
                self.levels[level_idx].total_quantity,
                now,
            );

            if emptied {
                self.update_best_after_empty(level_idx);
            } else {
                // Level survived, so the incoming order is exhausted.
                break;
            }
        }

        remaining
    }

    /// Non-empty levels from the touch outward, up to `out.len()` entries.
    /// Remaining slots are left untouched (callers pre-zero them).
    pub(crate) fn top_levels(&self, out_prices: &mut [Price], out_volumes: &mut [Volume]) {
        debug_assert_eq!(out_prices.len(), out_volumes.len());
        if self.best_price_index == NUM_BOOK_LEVELS {
            return;
        }
        let mut filled = 0;
        match self.side {
            Side::Buy => {
                for i in (0..=self.best_price_index).rev() {
                    if self.levels[i].total_quantity > 0 {
                        out_prices[filled] = index_to_price(i);
                        out_volumes[filled] = self.levels[i].total_quantity;
                        filled += 1;
                        if filled == out_prices.len() {
                            break;
                        }
                    }
                }
            }
            Side::Sell => {
                for i in self.best_price_index..NUM_BOOK_LEVELS {
                    if self.levels[i].total_quantity > 0 {
                        out_prices[filled] = index_to_price(i);
                        out_volumes[filled] = self.levels[i].total_quantity;
                        filled += 1;
                        if filled == out_prices.len() {
                            break;
                        }
                    }
                }
            }
        }
    }
}
