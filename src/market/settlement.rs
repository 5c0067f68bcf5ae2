//! Settlement Engine
//!
//! Drives the round lifecycle off a fixed countdown. Each time the
//! countdown expires the round in the CURRENT slot is classified against
//! the move since the previous settlement, its stake (if any) is paid out,
//! and the window slides by one.
//!
//! Duplicate timer fires are absorbed: a second expiry within
//! `reveal_ms - epsilon` of the last settlement is ignored, so settlement is
//! idempotent per wall-clock window rather than per callback.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::bucket::{change_pct, classify_change, is_flat, BucketId, BUCKET_COUNT};
use super::payout::compute_payout;
use super::round::RoundFactory;
use super::window::RoundWindow;
use crate::config::ThresholdConfig;

/// Per-round countdown in whole seconds.
#[derive(Debug, Clone)]
pub struct RoundClock {
    reveal_secs: u32,
    time_left: u32,
}

impl RoundClock {
    pub fn new(reveal_secs: u32) -> Self {
        let reveal_secs = reveal_secs.max(1);
        Self {
            reveal_secs,
            time_left: reveal_secs,
        }
    }

    /// Count one second down. Returns true when the countdown expired; the
    /// clock is then already reset for the next round.
    pub fn tick_second(&mut self) -> bool {
        if self.time_left <= 1 {
            self.time_left = self.reveal_secs;
            true
        } else {
            self.time_left -= 1;
            false
        }
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    /// Elapsed fraction of the current round in [0, 1).
    pub fn progress(&self) -> f64 {
        (self.reveal_secs - self.time_left) as f64 / self.reveal_secs as f64
    }

    pub fn reset(&mut self) {
        self.time_left = self.reveal_secs;
    }
}

/// The user's side of a settled round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOutcome {
    pub bucket: BucketId,
    pub stake: f64,
    /// Gross payout, 0 when lost
    pub payout: f64,
    pub won: bool,
}

/// Emitted once per settled round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub round_id: u64,
    pub winning_bucket: BucketId,
    pub settlement_price: f64,
    pub change_pct: f64,
    /// True when the move sat in the flat band and the tie-break decided
    pub tie_break: bool,
    pub user_outcome: Option<UserOutcome>,
    pub settled_at_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementStats {
    pub rounds_settled: u64,
    pub duplicate_ticks_ignored: u64,
    pub tie_breaks: u64,
    pub stale_price_ticks: u64,
    pub wins_by_bucket: [u64; BUCKET_COUNT],
}

pub struct SettlementEngine {
    thresholds: ThresholdConfig,
    reveal_ms: i64,
    guard_epsilon_ms: i64,
    /// Spot price recorded at the previous settlement
    baseline: Option<f64>,
    /// Winning bucket of the previous settlement
    tie_bucket: Option<BucketId>,
    last_settled_at_ms: Option<i64>,
    pub stats: SettlementStats,
}

impl SettlementEngine {
    pub fn new(thresholds: ThresholdConfig, reveal_ms: i64, guard_epsilon_ms: i64) -> Self {
        Self {
            thresholds,
            reveal_ms,
            guard_epsilon_ms,
            baseline: None,
            tie_bucket: None,
            last_settled_at_ms: None,
            stats: SettlementStats::default(),
        }
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    pub fn tie_bucket(&self) -> Option<BucketId> {
        self.tie_bucket
    }

    pub fn last_settled_at_ms(&self) -> Option<i64> {
        self.last_settled_at_ms
    }

    /// Warm start from a known close. Without it the first settlement uses
    /// its own spot as baseline and reports no movement.
    pub fn seed_baseline(&mut self, price: f64) {
        if self.baseline.is_none() && price.is_finite() && price > 0.0 {
            self.baseline = Some(price);
        }
    }

    /// False while inside the duplicate-fire guard window.
    pub fn is_due(&self, now_ms: i64) -> bool {
        match self.last_settled_at_ms {
            Some(last) => now_ms - last >= self.reveal_ms - self.guard_epsilon_ms,
            None => true,
        }
    }

    /// Settle the CURRENT round and slide the window.
    ///
    /// `spot` is the latest known price; `None` or an unusable value is a
    /// feed gap and settles as "no movement" against the stale baseline.
    /// Returns `None` when the call is a duplicate fire.
    pub fn settle(
        &mut self,
        window: &mut RoundWindow,
        factory: &mut RoundFactory,
        spot: Option<f64>,
        now_ms: i64,
    ) -> Option<SettlementEvent> {
        if !self.is_due(now_ms) {
            self.stats.duplicate_ticks_ignored += 1;
            debug!(
                round_id = window.current().id,
                now_ms, "duplicate settlement tick ignored"
            );
            return None;
        }
        self.last_settled_at_ms = Some(now_ms);

        let spot = match spot.filter(|p| p.is_finite() && *p > 0.0) {
            Some(p) => p,
            None => {
                self.stats.stale_price_ticks += 1;
                self.baseline.unwrap_or(0.0)
            }
        };
        let baseline = self.baseline.unwrap_or(spot);
        let change = change_pct(spot, baseline);
        let tie_break = is_flat(change, &self.thresholds);
        let winner = classify_change(change, &self.thresholds, self.tie_bucket);

        let mut settled = window.current().clone();
        debug_assert!(!settled.settled, "round {} already settled", settled.id);
        let user_outcome = settled.user_stake().map(|(bucket, stake)| {
            let won = bucket == winner;
            let payout = if won {
                compute_payout(&settled.buckets, winner, stake)
            } else {
                0.0
            };
            UserOutcome {
                bucket,
                stake,
                payout,
                won,
            }
        });

        settled.mark_settled(spot, change, winner);
        let round_id = settled.id;
        window.advance(settled, factory);

        if spot > 0.0 {
            self.baseline = Some(spot);
        }
        self.tie_bucket = Some(winner);
        self.stats.rounds_settled += 1;
        self.stats.wins_by_bucket[winner.index()] += 1;
        if tie_break {
            self.stats.tie_breaks += 1;
        }

        info!(
            round_id,
            bucket = %winner,
            spot,
            change_pct = change,
            tie_break,
            staked = user_outcome.is_some(),
            "round settled"
        );

        Some(SettlementEvent {
            round_id,
            winning_bucket: winner,
            settlement_price: spot,
            change_pct: change,
            tie_break,
            user_outcome,
            settled_at_ms: now_ms,
        })
    }
}
