//! Pari-mutuel payout.
//!
//! Winners split the whole pool (every bucket) in proportion to their share
//! of the winning bucket's pool. Stakes are added to the pool at placement
//! time, so the winning pool already contains the user's own stake.

use super::bucket::{Bucket, BucketId, BUCKET_COUNT};

/// Gross payout for `stake` on `winner` (includes the stake itself).
///
/// Panics if the winning pool cannot cover the stake: a placed stake always
/// implies `winner_pool >= stake > 0`.
pub fn compute_payout(buckets: &[Bucket; BUCKET_COUNT], winner: BucketId, stake: f64) -> f64 {
    let total_pool: f64 = buckets.iter().map(|b| b.pool_total).sum();
    let winner_pool = buckets[winner.index()].pool_total;
    assert!(
        winner_pool > 0.0 && winner_pool + 1e-9 >= stake,
        "winning pool {} cannot back stake {}",
        winner_pool,
        stake
    );
    total_pool * (stake / winner_pool)
}

/// Net result of a settled stake.
#[inline]
pub fn profit(payout: f64, stake: f64) -> f64 {
    payout - stake
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buckets(pools: [f64; 4]) -> [Bucket; 4] {
        let mut i = 0;
        BucketId::ALL.map(|id| {
            let b = Bucket::new(id, pools[i]);
            i += 1;
            b
        })
    }

    #[test]
    fn test_pool_accounting_example() {
        // 40/30/20/10 before the bet, user adds 10 on bucket 0
        let mut b = buckets([40.0, 30.0, 20.0, 10.0]);
        b[0].pool_total += 10.0;
        b[0].user_stake = Some(10.0);

        let payout = compute_payout(&b, BucketId::StrongBull, 10.0);
        assert!((payout - 22.0).abs() < 1e-9);
        assert!((profit(payout, 10.0) - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_sole_bettor_breaks_even() {
        let b = buckets([5.0, 0.0, 0.0, 0.0]);
        let payout = compute_payout(&b, BucketId::StrongBull, 5.0);
        assert!((payout - 5.0).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "cannot back stake")]
    fn test_empty_winning_pool_is_an_invariant_violation() {
        let b = buckets([10.0, 0.0, 10.0, 10.0]);
        compute_payout(&b, BucketId::Bull, 1.0);
    }
}
