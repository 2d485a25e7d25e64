//! Exchange coordinator: accepts TCP clients, frames their traffic through
//! bounded SPSC queues, and runs the single-threaded matching engine that
//! publishes private confirmations and the sequenced public feed.

mod connection;
mod engine;
mod error;
mod event_log;
mod exchange;
pub mod logging;

pub use connection::{ClientHandle, InboundRecord, OutboundRecord};
pub use error::ExchangeError;
pub use event_log::BinaryEventLogger;
pub use exchange::{Exchange, ExchangeConfig};
