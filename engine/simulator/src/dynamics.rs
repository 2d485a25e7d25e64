//! Order-flow dynamics: state-dependent event intensities and the
//! archetype-mixture placement policy for a single insertion.

use protocol::{Lifespan, Price, Side, Volume, MAXIMUM_ASK, MINIMUM_BID};

use crate::rng::RandomSource;
use crate::state::SimulationState;

/// Baseline per-agent event intensities, events per second.
pub const LAMBDA_INSERT_BASE: f64 = 40.0;
pub const LAMBDA_CANCEL_BASE: f64 = 25.0;
/// Open-order count at which the cancel depth multiplier reaches one.
pub const CANCEL_SCALING_FACTOR: f64 = 200.0;

const INSERT_MULT_RANGE: (f64, f64) = (0.3, 10.0);
const CANCEL_MULT_RANGE: (f64, f64) = (0.2, 25.0);
const HAZARD_INCREMENT_RANGE: (f64, f64) = (0.02, 100.0);

const COMMON_LOTS: [Volume; 6] = [1, 5, 10, 25, 50, 100];
const MAX_ORDER_QTY: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    MarketMaker,
    Taker,
    Deep,
    Noise,
}

impl Archetype {
    fn distance_multiplier(self) -> f64 {
        match self {
            Archetype::MarketMaker => 0.8,
            Archetype::Deep => 2.5,
            Archetype::Noise => 1.3,
            Archetype::Taker => 1.0,
        }
    }

    fn hazard_multiplier(self) -> f64 {
        match self {
            Archetype::MarketMaker => 0.55,
            Archetype::Deep => 2.0,
            _ => 1.0,
        }
    }

    fn marketable_probability(self) -> f64 {
        match self {
            Archetype::Taker => 0.85,
            Archetype::Noise => 0.15,
            Archetype::MarketMaker => 0.05,
            Archetype::Deep => 0.02,
        }
    }

    fn improve_probability(self) -> f64 {
        match self {
            Archetype::MarketMaker => 0.35,
            Archetype::Noise => 0.10,
            _ => 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InsertDecision {
    pub side: Side,
    pub price: Price,
    pub quantity: Volume,
    pub lifespan: Lifespan,
    pub archetype: Archetype,
    /// Hazard mass to add on top of the current cumulative hazard; the sum
    /// is the order's cancellation threshold.
    pub hazard_increment: f64,
}

#[derive(Debug, Default)]
pub struct MarketDynamics;

impl MarketDynamics {
    /// Insert intensity in events/second as a function of simulator state.
    pub fn insert_intensity<const N: usize>(&self, state: &SimulationState<N>) -> f64 {
        let fs = state.flow_state();
        let vs = state.volatility_state();
        let near_depth = state.liquidity_state().near_depth();

        let mult = 1.0
            + 0.45 * fs.flow_imbalance.abs()
            + 0.65 * vs.realised_vol_short().min(1.5)
            + 0.5 * fs.trade_excitation.clamp(0.0, 3.0)
            + 0.6 / (1.0 + near_depth).sqrt();
        LAMBDA_INSERT_BASE * mult.clamp(INSERT_MULT_RANGE.0, INSERT_MULT_RANGE.1)
    }

    /// Cancel intensity in hazard/second; feeds the cumulative hazard.
    pub fn cancel_intensity<const N: usize>(
        &self,
        state: &SimulationState<N>,
        open_orders: usize,
    ) -> f64 {
        let fs = state.flow_state();
        let vs = state.volatility_state();
        let spread_ticks = state.price_state().spread.unwrap_or(0) as f64;

        let depth_mult = 0.35 + open_orders as f64 / CANCEL_SCALING_FACTOR;
        let vol_mult = 1.0 + 1.2 * vs.realised_vol_short().min(1.5) + vs.jump_intensity;
        let flow_mult = 1.0 + fs.flow_imbalance.abs() + 0.6 * fs.taker_sign_ewma.abs();
        let spread_mult = 1.0 + 0.25 * spread_ticks;
        let excite_mult = 1.0 + 0.6 * fs.trade_excitation.clamp(0.0, 3.0);

        let mult = depth_mult * vol_mult * flow_mult * spread_mult * excite_mult;
        LAMBDA_CANCEL_BASE * mult.clamp(CANCEL_MULT_RANGE.0, CANCEL_MULT_RANGE.1)
    }

    /// One insertion: side, archetype, placement regime, size and hazard.
    pub fn decide_insert<const N: usize>(
        &self,
        state: &SimulationState<N>,
        rng: &mut dyn RandomSource,
    ) -> InsertDecision {
        let ps = *state.price_state();
        let fs = *state.flow_state();
        let vs = *state.volatility_state();
        let ls = state.liquidity_state();
        let near_depth = ls.near_depth();
        let near_touch_imbalance = ls.near_touch_imbalance();
        let sigma_short = vs.realised_vol_short();

        // 1. Side: lean against flow pressure, clamped away from certainty.
        let tilt =
            0.9 * fs.flow_imbalance + 0.6 * fs.taker_sign_ewma + 0.4 * near_touch_imbalance;
        let buy_prob = (0.5 + 0.35 * tilt.tanh()).clamp(0.02, 0.98);
        let side = if rng.bernoulli(buy_prob) { Side::Buy } else { Side::Sell };

        // 2. Archetype mixture, shifted by urgency and book thinness.
        let urgency = (0.35 * fs.flow_imbalance.abs()
            + 0.35 * sigma_short.min(1.0)
            + 0.3 * (fs.trade_excitation / 2.0).clamp(0.0, 1.0))
        .clamp(0.0, 1.0);

        let mut w_mm = 0.40 - 0.18 * urgency;
        if near_depth < 25.0 {
            w_mm *= 1.25;
        }
        let w_taker = 0.15 + 0.30 * urgency;
        let w_deep = 0.20 - 0.07 * urgency;
        let w_noise = (1.0 - w_mm - w_taker - w_deep).max(0.05);
        let total = w_mm + w_taker + w_deep + w_noise;
        let cumulative = [
            w_mm / total,
            (w_mm + w_taker) / total,
            (w_mm + w_taker + w_deep) / total,
            1.0,
        ];
        let archetype = [Archetype::MarketMaker, Archetype::Taker, Archetype::Deep, Archetype::Noise]
            [rng.categorical(&cumulative)];

        let spread_ticks = ps.spread.unwrap_or(0) as f64;
        let same_touch = match side {
            Side::Buy => ps.best_bid,
            Side::Sell => ps.best_ask,
        };
        let opposite_touch = match side {
            Side::Buy => ps.best_ask,
            Side::Sell => ps.best_bid,
        };

        // 3. Regime: marketable / improve / passive.
        let mut marketable = false;
        let mut p_marketable = archetype.marketable_probability();
        if spread_ticks > 0.0 && spread_ticks <= 2.0 {
            p_marketable = (p_marketable * 1.3).min(0.95);
        }

        let price = if opposite_touch.is_some() && rng.bernoulli(p_marketable) {
            marketable = true;
            opposite_touch.unwrap_or(MINIMUM_BID)
        } else if spread_ticks > 1.0
            && ps.best_bid.is_some()
            && ps.best_ask.is_some()
            && rng.bernoulli(archetype.improve_probability())
        {
            match side {
                Side::Buy => ps.best_bid.unwrap_or(MINIMUM_BID) + 1,
                Side::Sell => ps.best_ask.unwrap_or(MAXIMUM_ASK) - 1,
            }
        } else {
            self.passive_price(side, archetype, &ps, sigma_short, spread_ticks, vs.jump_intensity, state, rng)
        }
        .clamp(MINIMUM_BID, MAXIMUM_ASK);

        // 4. Size: lognormal with a small large-child mixture, snapped to
        // common lots about half the time.
        let depth_factor = 0.6 + 0.4 * near_depth.sqrt();
        let urgency_factor = 1.0 + 0.8 * urgency;
        let surprise_factor = (1.0 + 0.3 * fs.volume_surprise).clamp(0.5, 2.0);
        let mean_log = (8.0 * depth_factor * urgency_factor * surprise_factor).ln();
        let sigma_log = if rng.bernoulli(0.10) { 1.0 } else { 0.55 };
        let raw = (mean_log + sigma_log * rng.standard_normal()).exp();
        let mut quantity = raw.round().clamp(1.0, MAX_ORDER_QTY) as Volume;
        if rng.bernoulli(0.45) {
            quantity = *COMMON_LOTS
                .iter()
                .min_by_key(|&&lot| (i64::from(lot) - i64::from(quantity)).abs())
                .unwrap_or(&1);
        }

        // 5. Hazard threshold increment: exponential base, survival bias for
        // distance from the touch, archetype patience, pressure from adverse
        // flow and jumps.
        let distance_ticks = match same_touch {
            Some(best) => (price - best).abs() as f64,
            None => 0.0,
        };
        let side_sign = match side {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        };
        let adverse = (-side_sign * fs.flow_imbalance).max(0.0);
        let base_hazard = -rng.standard_uniform().ln();
        let hazard_increment = (base_hazard
            * (0.04 * distance_ticks).exp()
            * archetype.hazard_multiplier()
            / (1.0 + 2.5 * adverse + 1.5 * vs.jump_intensity))
            .clamp(HAZARD_INCREMENT_RANGE.0, HAZARD_INCREMENT_RANGE.1);

        // Marketable takers sometimes refuse to rest their residual.
        let lifespan = if marketable && archetype == Archetype::Taker && rng.bernoulli(0.35) {
            Lifespan::FillAndKill
        } else {
            Lifespan::GoodForDay
        };

        InsertDecision { side, price, quantity, lifespan, archetype, hazard_increment }
    }

    #[allow(clippy::too_many_arguments)]
    fn passive_price<const N: usize>(
        &self,
        side: Side,
        archetype: Archetype,
        ps: &crate::state::PriceState,
        sigma_short: f64,
        spread_ticks: f64,
        jump_intensity: f64,
        state: &SimulationState<N>,
        rng: &mut dyn RandomSource,
    ) -> Price {
        let fair_value = state.latent_state().fair_value;
        let same_touch = match side {
            Side::Buy => ps.best_bid,
            Side::Sell => ps.best_ask,
        };

        let anchor = match same_touch {
            Some(best) => {
                let fair = if fair_value > 0.0 { fair_value } else { best as f64 };
                0.65 * best as f64 + 0.35 * fair
            }
            None if ps.last_trade_price > 0 => ps.last_trade_price as f64,
            None if fair_value > 0.0 => fair_value,
            None => (MINIMUM_BID + MAXIMUM_ASK) as f64 / 2.0,
        };

        // Mean distance grows with spread, volatility regime and jumps;
        // archetype stretches or squeezes it.
        let mean_distance = 1.5
            * (1.0 + 0.5 * spread_ticks)
            * (1.0 + 2.0 * sigma_short.min(1.5))
            * (1.0 + jump_intensity)
            * archetype.distance_multiplier();
        let offset = rng.exponential(1.0 / mean_distance).round() as Price;

        let mut price = match side {
            Side::Buy => anchor.round() as Price - offset,
            Side::Sell => anchor.round() as Price + offset,
        };
        // Passive means passive: never cross the opposite touch.
        match side {
            Side::Buy => {
                if let Some(ask) = ps.best_ask {
                    price = price.min(ask - 1);
                }
            }
            Side::Sell => {
                if let Some(bid) = ps.best_bid {
                    price = price.max(bid + 1);
                }
            }
        }
        price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::PcgSource;
    use crate::shadow_book::ShadowOrderBook;
    use crate::state::TradeView;
    use protocol::PayloadOrderBookSnapshot;

    fn seeded_state() -> SimulationState<3> {
        let mut state: SimulationState<3> = SimulationState::new([1, 5, 10]);
        let mut snap = PayloadOrderBookSnapshot {
            ask_prices: [0; 10],
            ask_volumes: [0; 10],
            bid_prices: [0; 10],
            bid_volumes: [0; 10],
            sequence_number: 0,
        };
        snap.bid_prices[0] = 998;
        snap.bid_volumes[0] = 40;
        snap.ask_prices[0] = 1002;
        snap.ask_volumes[0] = 40;
        let mut shadow = ShadowOrderBook::new();
        shadow.apply_snapshot(&snap);
        state.sync_with_book(&shadow, 0.001);
        state
    }

    #[test]
    fn decisions_are_deterministic_per_seed() {
        let state = seeded_state();
        let dynamics = MarketDynamics;

        let mut a = PcgSource::new(11, 4);
        let mut b = PcgSource::new(11, 4);
        for _ in 0..200 {
            let da = dynamics.decide_insert(&state, &mut a);
            let db = dynamics.decide_insert(&state, &mut b);
            assert_eq!(da.side, db.side);
            assert_eq!(da.price, db.price);
            assert_eq!(da.quantity, db.quantity);
            assert_eq!(da.lifespan, db.lifespan);
            assert_eq!(da.archetype, db.archetype);
            assert_eq!(da.hazard_increment.to_bits(), db.hazard_increment.to_bits());
        }
    }

    #[test]
    fn decisions_stay_inside_the_price_grid() {
        let state = seeded_state();
        let dynamics = MarketDynamics;
        let mut rng = PcgSource::new(3, 9);
        for _ in 0..2_000 {
            let d = dynamics.decide_insert(&state, &mut rng);
            assert!((MINIMUM_BID..=MAXIMUM_ASK).contains(&d.price));
            assert!(d.quantity >= 1);
            assert!(d.hazard_increment >= HAZARD_INCREMENT_RANGE.0);
            assert!(d.hazard_increment <= HAZARD_INCREMENT_RANGE.1);
        }
    }

    #[test]
    fn intensities_respect_their_clamps() {
        let state = seeded_state();
        let dynamics = MarketDynamics;

        let insert = dynamics.insert_intensity(&state);
        assert!(insert >= LAMBDA_INSERT_BASE * INSERT_MULT_RANGE.0);
        assert!(insert <= LAMBDA_INSERT_BASE * INSERT_MULT_RANGE.1);

        for open in [0usize, 10, 1_000, 100_000] {
            let cancel = dynamics.cancel_intensity(&state, open);
            assert!(cancel >= LAMBDA_CANCEL_BASE * CANCEL_MULT_RANGE.0);
            assert!(cancel <= LAMBDA_CANCEL_BASE * CANCEL_MULT_RANGE.1);
        }
    }

    #[test]
    fn cancel_intensity_grows_with_open_orders() {
        let state = seeded_state();
        let dynamics = MarketDynamics;
        let low = dynamics.cancel_intensity(&state, 10);
        let high = dynamics.cancel_intensity(&state, 500);
        assert!(high > low);
    }

    #[test]
    fn heavy_sell_flow_biases_toward_buying_the_dip_less() {
        // Strong sell pressure drives flow_imbalance negative; the side draw
        // should then favour sells.
        let mut state = seeded_state();
        for t in 1..40u64 {
            state.on_trade(&TradeView {
                price: 1000,
                quantity: 50,
                taker_side: protocol::Side::Sell,
                timestamp: t * 1_000_000_000,
            });
        }
        let dynamics = MarketDynamics;
        let mut rng = PcgSource::new(21, 1);
        let mut sells = 0;
        const DRAWS: usize = 2_000;
        for _ in 0..DRAWS {
            if dynamics.decide_insert(&state, &mut rng).side == protocol::Side::Sell {
                sells += 1;
            }
        }
        assert!(sells > DRAWS / 2, "sells {sells} of {DRAWS}");
    }

    #[test]
    fn passive_orders_do_not_cross_the_touch() {
        let state = seeded_state();
        let dynamics = MarketDynamics;
        let mut rng = PcgSource::new(77, 2);
        for _ in 0..2_000 {
            let d = dynamics.decide_insert(&state, &mut rng);
            // Non-marketable placements must not cross: buys below the ask,
            // sells above the bid. Marketable ones sit exactly at the touch.
            match d.side {
                protocol::Side::Buy => assert!(d.price <= 1002),
                protocol::Side::Sell => assert!(d.price >= 998),
            }
        }
    }
}
