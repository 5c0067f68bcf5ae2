//! Bet Ledger
//!
//! Validates bets against the round window, accumulates stakes into bucket
//! pools, and keeps the bounded log of settled bets.
//!
//! Placement is split into `prepare` (pure validation + amount clamping)
//! and `apply` (pool/stake mutation) so an externally backed balance can be
//! debited in between without leaving partial local state behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use uuid::Uuid;

use super::bucket::BucketId;
use super::payout::{compute_payout, profit};
use super::round_cents;
use super::settlement::{SettlementEvent, UserOutcome};
use super::window::RoundWindow;

/// Why a bet was not accepted. Engine state is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetRejection {
    /// The index or id does not name a round in the window
    UnknownRound,
    /// Current or past round, or already revealed
    RoundLocked,
    /// A stake already sits on another bucket of this round
    AlreadyBetOtherBucket,
    /// Nothing left to stake after clamping
    AmountInvalid,
    /// The balance backend refused or failed the debit
    LedgerUnavailable(String),
}

impl fmt::Display for BetRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetRejection::UnknownRound => f.write_str("Round not found."),
            BetRejection::RoundLocked => f.write_str("This round is locked for betting."),
            BetRejection::AlreadyBetOtherBucket => {
                f.write_str("You already placed a bet this round.")
            }
            BetRejection::AmountInvalid => f.write_str("Bet amount is invalid."),
            BetRejection::LedgerUnavailable(msg) => write!(f, "Failed to place bet: {}", msg),
        }
    }
}

impl std::error::Error for BetRejection {}

/// A validated bet that has not touched any state yet.
#[derive(Debug, Clone, PartialEq)]
pub struct BetTicket {
    pub round_id: u64,
    pub round_index: usize,
    pub bucket: BucketId,
    /// Clamped, cent-rounded stake
    pub amount: f64,
}

/// Result of an accepted bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetReceipt {
    pub id: Uuid,
    pub round_id: u64,
    pub bucket: BucketId,
    pub amount: f64,
    /// Accumulated user stake on the bucket after this bet
    pub user_stake: f64,
    /// Bucket pool after this bet
    pub bucket_pool: f64,
    /// Balance after the debit
    pub balance: f64,
}

#[derive(Debug, Clone)]
pub struct BetLedger {
    min_bet: f64,
}

impl BetLedger {
    pub fn new(min_bet: f64) -> Self {
        Self { min_bet }
    }

    pub fn min_bet(&self) -> f64 {
        self.min_bet
    }

    /// Clamp a requested stake to `[min_bet, balance]` and round to cents.
    /// Non-finite requests fall back to `min_bet`.
    pub fn clamp_amount(&self, requested: f64, balance: f64) -> f64 {
        let wanted = if requested.is_finite() {
            requested
        } else {
            self.min_bet
        };
        let available = balance.max(0.0);
        let clamped = wanted.max(self.min_bet).min(available);
        let rounded = round_cents(clamped);
        // rounding must never push the stake past the balance
        if rounded > available {
            round_cents(rounded - 0.01)
        } else {
            rounded
        }
    }

    /// Validate a bet without mutating anything.
    pub fn prepare(
        &self,
        window: &RoundWindow,
        round_index: usize,
        bucket: BucketId,
        requested: f64,
        balance: f64,
    ) -> Result<BetTicket, BetRejection> {
        let round = window.get(round_index).ok_or(BetRejection::UnknownRound)?;

        if round_index <= window.current_index() || round.revealed || round.settled {
            return Err(BetRejection::RoundLocked);
        }

        if round
            .buckets
            .iter()
            .any(|b| b.user_stake.is_some() && b.id != bucket)
        {
            return Err(BetRejection::AlreadyBetOtherBucket);
        }

        let amount = self.clamp_amount(requested, balance);
        if !(amount > 0.0) {
            return Err(BetRejection::AmountInvalid);
        }

        Ok(BetTicket {
            round_id: round.id,
            round_index,
            bucket,
            amount,
        })
    }

    /// Add a prepared stake to its bucket's pool and the user's stake.
    /// Returns `(user_stake, bucket_pool)` after the update.
    pub fn apply(&self, window: &mut RoundWindow, ticket: &BetTicket) -> (f64, f64) {
        let round = window
            .get_mut(ticket.round_index)
            .filter(|r| r.id == ticket.round_id)
            .unwrap_or_else(|| panic!("bet ticket for round {} is stale", ticket.round_id));
        debug_assert!(!round.settled);

        let bucket = round.bucket_mut(ticket.bucket);
        let stake = round_cents(bucket.user_stake.unwrap_or(0.0) + ticket.amount);
        bucket.user_stake = Some(stake);
        bucket.pool_total += ticket.amount;
        (stake, bucket.pool_total)
    }

    /// Validate and apply in one step against a plain balance figure.
    pub fn place_bet(
        &self,
        window: &mut RoundWindow,
        round_index: usize,
        bucket: BucketId,
        requested: f64,
        balance: f64,
    ) -> Result<BetReceipt, BetRejection> {
        let ticket = self.prepare(window, round_index, bucket, requested, balance)?;
        let (user_stake, bucket_pool) = self.apply(window, &ticket);
        Ok(BetReceipt {
            id: Uuid::new_v4(),
            round_id: ticket.round_id,
            bucket: ticket.bucket,
            amount: ticket.amount,
            user_stake,
            bucket_pool,
            balance: round_cents(balance - ticket.amount),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetResult {
    Win,
    Lose,
}

/// Settled bet row. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    pub round_id: u64,
    pub bucket: BucketId,
    pub bucket_label: String,
    pub stake: f64,
    /// Gross payout, 0 when lost
    pub payout: f64,
    pub profit: f64,
    pub result: BetResult,
    pub settlement_price: f64,
    pub change_pct: f64,
    pub settled_at: DateTime<Utc>,
}

impl BetRecord {
    pub fn from_settlement(event: &SettlementEvent, outcome: &UserOutcome) -> Self {
        let payout = if outcome.won { outcome.payout } else { 0.0 };
        Self {
            round_id: event.round_id,
            bucket: outcome.bucket,
            bucket_label: outcome.bucket.label().to_string(),
            stake: outcome.stake,
            payout,
            profit: profit(payout, outcome.stake),
            result: if outcome.won {
                BetResult::Win
            } else {
                BetResult::Lose
            },
            settlement_price: event.settlement_price,
            change_pct: event.change_pct,
            settled_at: DateTime::from_timestamp_millis(event.settled_at_ms)
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Most recent settled bets, oldest evicted first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetHistory {
    rows: VecDeque<BetRecord>,
    cap: usize,
}

impl BetHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            rows: VecDeque::with_capacity(cap.min(1024)),
            cap: cap.max(1),
        }
    }

    pub fn push(&mut self, record: BetRecord) {
        if self.rows.len() >= self.cap {
            self.rows.pop_front();
        }
        self.rows.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &BetRecord> {
        self.rows.iter()
    }

    pub fn latest(&self) -> Option<&BetRecord> {
        self.rows.back()
    }

    pub fn to_vec(&self) -> Vec<BetRecord> {
        self.rows.iter().cloned().collect()
    }
}

/// Open stake view for the bet table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveBet {
    pub round_id: u64,
    pub bucket: BucketId,
    pub label: String,
    pub amount: f64,
    pub pool: f64,
    /// Payout if the staked bucket wins with the pools as they stand
    pub est_payout: f64,
}

pub fn active_bets(window: &RoundWindow) -> Vec<ActiveBet> {
    window
        .iter()
        .filter(|r| !r.settled)
        .filter_map(|r| {
            let (bucket, stake) = r.user_stake()?;
            Some(ActiveBet {
                round_id: r.id,
                bucket,
                label: bucket.label().to_string(),
                amount: stake,
                pool: r.total_pool(),
                est_payout: compute_payout(&r.buckets, bucket, stake),
            })
        })
        .collect()
}

/// Sum of user stakes in rounds that have not settled yet.
pub fn pending_stake_total(window: &RoundWindow) -> f64 {
    window
        .iter()
        .filter(|r| !r.settled)
        .filter_map(|r| r.user_stake().map(|(_, stake)| stake))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedPoolConfig;
    use crate::market::RoundFactory;

    fn window() -> RoundWindow {
        let mut f = RoundFactory::new(SeedPoolConfig::default(), Some(21));
        RoundWindow::seed(&mut f, 1, 12)
    }

    fn ledger() -> BetLedger {
        BetLedger::new(0.25)
    }

    #[test]
    fn test_current_and_past_rounds_are_locked() {
        let mut w = window();
        for idx in 0..=w.current_index() {
            let err = ledger()
                .place_bet(&mut w, idx, BucketId::Bull, 1.0, 10.0)
                .unwrap_err();
            assert_eq!(err, BetRejection::RoundLocked);
        }
        assert_eq!(
            ledger()
                .place_bet(&mut w, 12, BucketId::Bull, 1.0, 10.0)
                .unwrap_err(),
            BetRejection::UnknownRound
        );
    }

    #[test]
    fn test_same_bucket_accumulates() {
        let mut w = window();
        let idx = w.current_index() + 2;
        let pool_before = w.get(idx).unwrap().bucket(BucketId::Bull).pool_total;

        let first = ledger()
            .place_bet(&mut w, idx, BucketId::Bull, 5.0, 10.0)
            .unwrap();
        assert_eq!(first.balance, 5.0);
        let second = ledger()
            .place_bet(&mut w, idx, BucketId::Bull, 3.0, first.balance)
            .unwrap();

        assert_eq!(second.user_stake, 8.0);
        assert_eq!(second.balance, 2.0);
        let bucket = w.get(idx).unwrap().bucket(BucketId::Bull);
        assert_eq!(bucket.user_stake, Some(8.0));
        assert!((bucket.pool_total - (pool_before + 8.0)).abs() < 1e-9);
    }

    #[test]
    fn test_second_bucket_rejected_and_state_untouched() {
        let mut w = window();
        let idx = w.current_index() + 1;
        ledger()
            .place_bet(&mut w, idx, BucketId::Bear, 1.0, 10.0)
            .unwrap();
        let before = w.get(idx).unwrap().clone();

        let err = ledger()
            .place_bet(&mut w, idx, BucketId::StrongBull, 1.0, 9.0)
            .unwrap_err();
        assert_eq!(err, BetRejection::AlreadyBetOtherBucket);
        assert_eq!(w.get(idx).unwrap(), &before);
    }

    #[test]
    fn test_amount_clamped_to_balance_never_negative() {
        let mut w = window();
        let idx = w.current_index() + 1;
        let receipt = ledger()
            .place_bet(&mut w, idx, BucketId::Bull, 50.0, 3.337)
            .unwrap();
        assert!(receipt.amount <= 3.337);
        assert!(receipt.balance >= 0.0);

        // below the minimum is raised to the minimum
        let r2 = ledger()
            .place_bet(&mut w, idx + 1, BucketId::Bull, 0.01, 10.0)
            .unwrap();
        assert_eq!(r2.amount, 0.25);

        // non-finite requests use the minimum
        let r3 = ledger()
            .place_bet(&mut w, idx + 2, BucketId::Bull, f64::NAN, 10.0)
            .unwrap();
        assert_eq!(r3.amount, 0.25);
    }

    #[test]
    fn test_balance_below_min_bet_stakes_whole_balance() {
        let mut w = window();
        let idx = w.current_index() + 1;
        let receipt = ledger()
            .place_bet(&mut w, idx, BucketId::Bull, 5.0, 0.10)
            .unwrap();
        assert_eq!(receipt.amount, 0.1);
        assert_eq!(receipt.balance, 0.0);
        assert_eq!(w.get(idx).unwrap().user_stake(), Some((BucketId::Bull, 0.1)));
    }

    #[test]
    fn test_sub_cent_balance_rejected() {
        let mut w = window();
        let idx = w.current_index() + 1;
        let before = w.get(idx).unwrap().clone();
        assert_eq!(
            ledger()
                .place_bet(&mut w, idx, BucketId::Bull, 5.0, 0.004)
                .unwrap_err(),
            BetRejection::AmountInvalid
        );
        assert_eq!(w.get(idx).unwrap(), &before);
    }

    #[test]
    fn test_zero_balance_rejected() {
        let mut w = window();
        let idx = w.current_index() + 1;
        assert_eq!(
            ledger()
                .place_bet(&mut w, idx, BucketId::Bull, 1.0, 0.0)
                .unwrap_err(),
            BetRejection::AmountInvalid
        );
        assert!(w.get(idx).unwrap().user_bucket().is_none());
    }

    #[test]
    fn test_history_keeps_most_recent() {
        let mut history = BetHistory::new(100);
        for id in 0..150u64 {
            history.push(BetRecord {
                round_id: id,
                bucket: BucketId::Bull,
                bucket_label: "Bull".to_string(),
                stake: 1.0,
                payout: 0.0,
                profit: -1.0,
                result: BetResult::Lose,
                settlement_price: 1.0,
                change_pct: 0.0,
                settled_at: Utc::now(),
            });
        }
        assert_eq!(history.len(), 100);
        let ids: Vec<u64> = history.iter().map(|r| r.round_id).collect();
        assert_eq!(ids, (50..150).collect::<Vec<_>>());
    }

    #[test]
    fn test_active_bets_and_pending_total() {
        let mut w = window();
        let ci = w.current_index();
        ledger()
            .place_bet(&mut w, ci + 1, BucketId::Bull, 2.0, 10.0)
            .unwrap();
        ledger()
            .place_bet(&mut w, ci + 3, BucketId::StrongBear, 1.5, 8.0)
            .unwrap();

        let active = active_bets(&w);
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].label, "Bull");
        assert!(active[0].est_payout >= active[0].amount);
        assert!((pending_stake_total(&w) - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_record_from_losing_settlement() {
        let event = SettlementEvent {
            round_id: 42,
            winning_bucket: BucketId::Bear,
            settlement_price: 64_000.0,
            change_pct: -0.002,
            tie_break: false,
            user_outcome: None,
            settled_at_ms: 1_700_000_000_000,
        };
        let outcome = UserOutcome {
            bucket: BucketId::Bull,
            stake: 1.5,
            payout: 0.0,
            won: false,
        };
        let row = BetRecord::from_settlement(&event, &outcome);
        assert_eq!(row.result, BetResult::Lose);
        assert_eq!(row.bucket_label, "Bull");
        assert_eq!(row.payout, 0.0);
        assert_eq!(row.profit, -1.5);
        assert_eq!(row.settled_at.timestamp_millis(), 1_700_000_000_000);
    }
}
