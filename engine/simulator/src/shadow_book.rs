//! Consumer-side view of the exchange book, rebuilt from snapshots and
//! price-level deltas. Sparse and rarely updated, so an ordered map beats
//! the exchange's dense ladder here.

use std::collections::BTreeMap;

use protocol::{PayloadOrderBookSnapshot, Price, Side, Volume};

#[derive(Default)]
pub struct ShadowOrderBook {
    bids: BTreeMap<Price, Volume>,
    asks: BTreeMap<Price, Volume>,
}

impl ShadowOrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole view with a depth-10 snapshot; zero slots are
    /// padding, not levels.
    pub fn apply_snapshot(&mut self, snapshot: &PayloadOrderBookSnapshot) {
        self.bids.clear();
        self.asks.clear();
        let ask_prices = snapshot.ask_prices;
        let ask_volumes = snapshot.ask_volumes;
        let bid_prices = snapshot.bid_prices;
        let bid_volumes = snapshot.bid_volumes;
        for i in 0..ask_prices.len() {
            if ask_prices[i] != 0 && ask_volumes[i] != 0 {
                self.asks.insert(ask_prices[i], ask_volumes[i]);
            }
            if bid_prices[i] != 0 && bid_volumes[i] != 0 {
                self.bids.insert(bid_prices[i], bid_volumes[i]);
            }
        }
    }

    pub fn apply_level_update(&mut self, side: Side, price: Price, total_volume: Volume) {
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        if total_volume == 0 {
            levels.remove(&price);
        } else {
            levels.insert(price, total_volume);
        }
    }

    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().copied()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    pub fn volume_at(&self, side: Side, price: Price) -> Volume {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels.get(&price).copied().unwrap_or(0)
    }

    pub fn bids(&self) -> impl Iterator<Item = (Price, Volume)> + '_ {
        self.bids.iter().map(|(&p, &v)| (p, v))
    }

    pub fn asks(&self) -> impl Iterator<Item = (Price, Volume)> + '_ {
        self.asks.iter().map(|(&p, &v)| (p, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        bids: &[(Price, Volume)],
        asks: &[(Price, Volume)],
    ) -> PayloadOrderBookSnapshot {
        let mut s = PayloadOrderBookSnapshot {
            ask_prices: [0; 10],
            ask_volumes: [0; 10],
            bid_prices: [0; 10],
            bid_volumes: [0; 10],
            sequence_number: 0,
        };
        for (i, &(p, v)) in bids.iter().enumerate() {
            s.bid_prices[i] = p;
            s.bid_volumes[i] = v;
        }
        for (i, &(p, v)) in asks.iter().enumerate() {
            s.ask_prices[i] = p;
            s.ask_volumes[i] = v;
        }
        s
    }

    #[test]
    fn snapshot_then_deltas_reconstruct_the_book() {
        let mut shadow = ShadowOrderBook::new();
        shadow.apply_snapshot(&snapshot(&[(101, 3), (100, 7)], &[(102, 5)]));

        assert_eq!(shadow.best_bid(), Some(101));
        assert_eq!(shadow.best_ask(), Some(102));
        assert_eq!(shadow.volume_at(Side::Buy, 100), 7);

        // Delta stream: 101 drains, a new ask appears, 102 grows.
        shadow.apply_level_update(Side::Buy, 101, 0);
        shadow.apply_level_update(Side::Sell, 103, 4);
        shadow.apply_level_update(Side::Sell, 102, 9);

        assert_eq!(shadow.best_bid(), Some(100));
        assert_eq!(shadow.best_ask(), Some(102));
        assert_eq!(shadow.volume_at(Side::Sell, 102), 9);
        assert_eq!(shadow.volume_at(Side::Sell, 103), 4);
        assert_eq!(shadow.volume_at(Side::Buy, 101), 0);
    }

    #[test]
    fn empty_sides_have_no_touch() {
        let shadow = ShadowOrderBook::new();
        assert_eq!(shadow.best_bid(), None);
        assert_eq!(shadow.best_ask(), None);
    }

    #[test]
    fn zero_padded_snapshot_slots_are_ignored() {
        let mut shadow = ShadowOrderBook::new();
        shadow.apply_snapshot(&snapshot(&[(100, 1)], &[]));
        assert_eq!(shadow.bids().count(), 1);
        assert_eq!(shadow.asks().count(), 0);
        assert_eq!(shadow.volume_at(Side::Buy, 0), 0);
    }

    #[test]
    fn resnapshot_replaces_stale_levels() {
        let mut shadow = ShadowOrderBook::new();
        shadow.apply_snapshot(&snapshot(&[(100, 1), (99, 2)], &[(105, 3)]));
        shadow.apply_snapshot(&snapshot(&[(98, 4)], &[(104, 6)]));
        assert_eq!(shadow.best_bid(), Some(98));
        assert_eq!(shadow.best_ask(), Some(104));
        assert_eq!(shadow.volume_at(Side::Buy, 100), 0);
    }
}
