//! Random-number contract used by the dynamics module, and its PCG32
//! implementation. Each agent owns a generator seeded with a (seed, stream)
//! pair so runs are reproducible given an identical feed.

use rand::Rng;
use rand_distr::{Distribution, Open01, Poisson, StandardNormal};
use rand_pcg::Pcg32;

pub trait RandomSource: Send {
    /// Uniform draw on the open interval (0, 1).
    fn standard_uniform(&mut self) -> f64;
    fn standard_normal(&mut self) -> f64;
    /// Exponential with rate `lambda` (mean `1/lambda`).
    fn exponential(&mut self, lambda: f64) -> f64;
    fn bernoulli(&mut self, p: f64) -> bool;
    /// Uniform integer in `[lower, upper]` inclusive.
    fn uniform_int(&mut self, lower: u32, upper: u32) -> u32;
    fn poisson(&mut self, mean: f64) -> u32;
    /// Index of the first cumulative probability exceeding a uniform draw.
    /// `cumulative_probs` must be non-decreasing and end at ~1.0.
    fn categorical(&mut self, cumulative_probs: &[f64]) -> usize;
    fn normal_vector(&mut self, out: &mut [f64]);
}

pub struct PcgSource {
    rng: Pcg32,
}

impl PcgSource {
    pub fn new(seed: u64, stream: u64) -> Self {
        Self { rng: Pcg32::new(seed, stream) }
    }
}

impl RandomSource for PcgSource {
    #[inline]
    fn standard_uniform(&mut self) -> f64 {
        self.rng.sample(Open01)
    }

    #[inline]
    fn standard_normal(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    #[inline]
    fn exponential(&mut self, lambda: f64) -> f64 {
        debug_assert!(lambda > 0.0);
        -self.standard_uniform().ln() / lambda
    }

    #[inline]
    fn bernoulli(&mut self, p: f64) -> bool {
        self.standard_uniform() < p
    }

    #[inline]
    fn uniform_int(&mut self, lower: u32, upper: u32) -> u32 {
        self.rng.gen_range(lower..=upper)
    }

    fn poisson(&mut self, mean: f64) -> u32 {
        if mean <= 0.0 {
            return 0;
        }
        match Poisson::new(mean) {
            Ok(dist) => {
                let draw: f64 = dist.sample(&mut self.rng);
                draw as u32
            }
            Err(_) => 0,
        }
    }

    fn categorical(&mut self, cumulative_probs: &[f64]) -> usize {
        debug_assert!(cumulative_probs.last().is_some_and(|&c| c > 0.999_999));
        let u = self.standard_uniform();
        cumulative_probs
            .iter()
            .position(|&c| u < c)
            .unwrap_or(cumulative_probs.len().saturating_sub(1))
    }

    fn normal_vector(&mut self, out: &mut [f64]) {
        for x in out.iter_mut() {
            *x = self.standard_normal();
        }
    }
}
