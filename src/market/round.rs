//! Rounds and the factory that seeds them.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::bucket::{Bucket, BucketId, BUCKET_COUNT};
use crate::config::{PoolRange, SeedPoolConfig};

/// One betting epoch.
///
/// `revealed` and `settled` always flip together, and `winning_bucket` is
/// set iff the round is settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub id: u64,
    pub revealed: bool,
    pub settled: bool,
    /// Spot price observed at settlement
    pub reference_price: Option<f64>,
    /// Percent move since the previous settlement baseline
    pub change_pct: Option<f64>,
    pub winning_bucket: Option<BucketId>,
    pub buckets: [Bucket; BUCKET_COUNT],
}

impl Round {
    pub fn bucket(&self, id: BucketId) -> &Bucket {
        &self.buckets[id.index()]
    }

    pub(crate) fn bucket_mut(&mut self, id: BucketId) -> &mut Bucket {
        &mut self.buckets[id.index()]
    }

    pub fn total_pool(&self) -> f64 {
        self.buckets.iter().map(|b| b.pool_total).sum()
    }

    /// The single bucket holding the user's stake, if any.
    pub fn user_bucket(&self) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.user_stake.is_some())
    }

    pub fn user_stake(&self) -> Option<(BucketId, f64)> {
        self.user_bucket()
            .and_then(|b| b.user_stake.map(|stake| (b.id, stake)))
    }

    /// Record the settlement outcome. A round settles exactly once.
    pub fn mark_settled(&mut self, price: f64, change_pct: f64, winner: BucketId) {
        assert!(!self.settled, "round {} settled twice", self.id);
        self.revealed = true;
        self.settled = true;
        self.reference_price = Some(price);
        self.change_pct = Some(change_pct);
        self.winning_bucket = Some(winner);
    }
}

/// Creates rounds with randomized ambient pool sizes.
#[derive(Debug, Clone)]
pub struct RoundFactory {
    pools: SeedPoolConfig,
    rng: ChaCha8Rng,
}

impl RoundFactory {
    pub fn new(pools: SeedPoolConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { pools, rng }
    }

    pub fn create_round(&mut self, id: u64) -> Round {
        let pools = self.pools;
        let buckets = BucketId::ALL.map(|bucket| {
            let range = if bucket.is_strong() {
                pools.strong
            } else {
                pools.moderate
            };
            Bucket::new(bucket, self.draw_pool(range))
        });

        Round {
            id,
            revealed: false,
            settled: false,
            reference_price: None,
            change_pct: None,
            winning_bucket: None,
            buckets,
        }
    }

    /// `n` consecutive rounds with ids `start_id..start_id + n`.
    pub fn seed_window(&mut self, start_id: u64, n: usize) -> Vec<Round> {
        (0..n as u64).map(|i| self.create_round(start_id + i)).collect()
    }

    fn draw_pool(&mut self, range: PoolRange) -> f64 {
        self.rng.gen_range(range.min..=range.max) as f64
    }
}
