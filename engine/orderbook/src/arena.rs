//! Pre-allocated order storage with an intrusive free list.
//!
//! Orders are addressed by slot index, never by pointer; `prev`/`next` form
//! the FIFO chain of the price level the order rests at.

use core::fmt;

use protocol::{Id, Price, Side, Volume};

#[repr(transparent)]
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct OrderHandle(pub u32);

pub const NONE: OrderHandle = OrderHandle(u32::MAX);

impl fmt::Debug for OrderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == NONE {
            write!(f, "NONE")
        } else {
            write!(f, "H({})", self.0)
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Order {
    pub order_id: Id,
    pub client_id: Id,
    pub price: Price,
    pub side: Side,
    pub quantity_total: Volume,
    pub quantity_remaining: Volume,
    pub quantity_cumulative: Volume,

    // intrusive FIFO links within the price level
    pub prev: OrderHandle,
    pub next: OrderHandle,
}

impl Default for Order {
    fn default() -> Self {
        Self {
            order_id: 0,
            client_id: 0,
            price: 0,
            side: Side::Buy,
            quantity_total: 0,
            quantity_remaining: 0,
            quantity_cumulative: 0,
            prev: NONE,
            next: NONE,
        }
    }
}

pub struct OrderArena {
    buf: Box<[Order]>,
    free: Vec<u32>,
    used: Vec<bool>,
}

impl OrderArena {
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "arena capacity must be > 0");
        let mut free = Vec::with_capacity(capacity);
        for i in (0..capacity).rev() {
            free.push(i as u32);
        }
        Self {
            buf: vec![Order::default(); capacity].into_boxed_slice(),
            free,
            used: vec![false; capacity],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn in_use(&self) -> usize {
        self.buf.len() - self.free.len()
    }

    /// `None` when every slot is taken; the caller surfaces ORDER_BOOK_FULL.
    #[inline]
    pub fn alloc(&mut self) -> Option<OrderHandle> {
        let idx = self.free.pop()?;
        debug_assert!(!self.used[idx as usize], "allocating an in-use slot");
        self.used[idx as usize] = true;
        let o = &mut self.buf[idx as usize];
        o.prev = NONE;
        o.next = NONE;
        Some(OrderHandle(idx))
    }

    #[inline]
    pub fn free(&mut self, h: OrderHandle) {
        assert!(h != NONE, "cannot free NONE");
        let i = h.0 as usize;
        assert!(i < self.buf.len(), "handle out of range");
        assert!(self.used[i], "double free detected");
        self.used[i] = false;
        self.buf[i] = Order::default();
        self.free.push(h.0);
    }

    #[inline]
    pub fn get(&self, h: OrderHandle) -> &Order {
        let i = h.0 as usize;
        debug_assert!(self.used[i], "get: slot not in use");
        &self.buf[i]
    }

    #[inline]
    pub fn get_mut(&mut self, h: OrderHandle) -> &mut Order {
        let i = h.0 as usize;
        debug_assert!(self.used[i], "get_mut: slot not in use");
        &mut self.buf[i]
    }
}
