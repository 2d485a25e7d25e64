//! Agent-based market simulator.
//!
//! Each agent is a wire-protocol client: it subscribes to the public feed,
//! maintains a shadow view of the book, estimates volatility / flow /
//! liquidity state from the feed, and drives order placement through a
//! Poisson event clock with per-order cancellation hazards.

mod dynamics;
mod error;
mod ledger;
mod rng;
mod shadow_book;
mod sim;
mod state;

pub use dynamics::{
    Archetype, InsertDecision, MarketDynamics, CANCEL_SCALING_FACTOR, LAMBDA_CANCEL_BASE,
    LAMBDA_INSERT_BASE,
};
pub use error::SimulatorError;
pub use ledger::OrderLedger;
pub use rng::{PcgSource, RandomSource};
pub use shadow_book::ShadowOrderBook;
pub use sim::{MarketSimulator, SimulatorConfig};
pub use state::{
    FlowState, LatentState, LiquidityState, PriceState, SimulationState, TimeState, TradeView,
    VolatilityState,
};
