use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

use crate::config::LeaderboardConfig;

/// Random-walk PnL for the simulated opponents.
///
/// Each settlement moves every competitor by `(u - bias) * scale`, `u ~ U[0,1)`.
#[derive(Debug, Clone)]
pub struct CompetitorSim {
    pnl: Vec<(String, f64)>,
    drift_bias: f64,
    drift_scale: f64,
    rng: ChaCha8Rng,
}

impl CompetitorSim {
    pub fn new(config: &LeaderboardConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            pnl: config
                .competitors
                .iter()
                .map(|c| (c.id.clone(), c.initial_pnl))
                .collect(),
            drift_bias: config.drift_bias,
            drift_scale: config.drift_scale,
            rng,
        }
    }

    pub fn drift(&mut self) {
        for (_, value) in self.pnl.iter_mut() {
            let u: f64 = self.rng.gen();
            *value += (u - self.drift_bias) * self.drift_scale;
        }
    }

    pub fn get(&self, id: &str) -> Option<f64> {
        self.pnl.iter().find(|(cid, _)| cid == id).map(|(_, v)| *v)
    }

    pub fn values(&self) -> HashMap<String, f64> {
        self.pnl.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pnl.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pnl.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_is_bounded_per_step() {
        let config = LeaderboardConfig::default();
        let mut sim = CompetitorSim::new(&config, Some(11));
        assert_eq!(sim.get("alpha"), Some(8.5));
        for _ in 0..50 {
            let before = sim.values();
            sim.drift();
            for (id, after) in sim.values() {
                let delta = after - before[&id];
                assert!((-45.0..55.0).contains(&delta), "delta {} out of range", delta);
            }
        }
        assert_eq!(sim.len(), 3);
    }

    #[test]
    fn test_same_seed_same_walk() {
        let config = LeaderboardConfig::default();
        let mut a = CompetitorSim::new(&config, Some(3));
        let mut b = CompetitorSim::new(&config, Some(3));
        for _ in 0..10 {
            a.drift();
            b.drift();
        }
        assert_eq!(a.values(), b.values());
    }
}
