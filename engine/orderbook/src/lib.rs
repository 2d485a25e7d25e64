//! In-memory price-time-priority order book and the lock-free plumbing the
//! engine thread shares with the I/O plane.

mod arena;
mod book;
mod callbacks;
pub mod clock;
mod side;
mod spsc;

pub use arena::{Order, OrderArena, OrderHandle, NONE};
pub use book::{BookSnapshot, OrderBook};
pub use callbacks::OrderBookCallbacks;
pub use side::{BookSide, PriceLevel};
pub use spsc::SpscQueue;
