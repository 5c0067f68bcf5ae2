use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::config::EngineConfig;
use crate::feed::Market;
use crate::leaderboard::{CompetitorSim, LeaderboardSeries, SeriesTween};
use crate::market::{
    pending_stake_total, round_cents, BetHistory, BetLedger, RoundClock, RoundFactory, RoundWindow,
    SettlementEngine,
};

/// Running totals over the user's settled bets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub wins: u64,
    pub completed: u64,
    pub total_staked: f64,
    /// Gross payouts received
    pub total_winnings: f64,
}

impl SessionStats {
    /// Percent of settled bets won; `None` before the first settled bet.
    pub fn win_rate_pct(&self) -> Option<f64> {
        (self.completed > 0).then(|| self.wins as f64 / self.completed as f64 * 100.0)
    }
}

/// Everything that belongs to one market. Replaced wholesale on a switch.
pub(crate) struct MarketState {
    pub market: Market,
    pub generation: u64,
    pub window: RoundWindow,
    pub factory: RoundFactory,
    pub settlement: SettlementEngine,
    pub clock: RoundClock,
    pub bets: BetLedger,
    pub history: BetHistory,
    pub stats: SessionStats,
    pub series: LeaderboardSeries,
    pub competitors: CompetitorSim,
    /// Display tween from the previous to the latest leaderboard sample
    pub tween: Option<SeriesTween>,
    /// Settlement prices, newest last
    pub price_history: VecDeque<f64>,
    price_history_cap: usize,
    /// Balance the user PnL is measured against
    pub pnl_baseline: f64,
    /// Last balance reported by the ledger
    pub balance: f64,
    /// Payouts/refunds the ledger has not accepted yet
    pub owed_credit: f64,
}

impl MarketState {
    pub fn fresh(config: &EngineConfig, market: Market, generation: u64, balance: f64, owed: f64) -> Self {
        let seed = config
            .rng_seed
            .map(|s| s ^ generation.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut factory = RoundFactory::new(config.seed_pools, seed);
        let window = RoundWindow::seed(&mut factory, config.start_round_id, config.visible_rounds);

        Self {
            market,
            generation,
            window,
            factory,
            settlement: SettlementEngine::new(
                config.thresholds,
                config.reveal_ms(),
                config.duplicate_guard_epsilon_ms,
            ),
            clock: RoundClock::new(config.reveal_secs),
            bets: BetLedger::new(config.min_bet),
            history: BetHistory::new(config.history_cap),
            stats: SessionStats::default(),
            series: LeaderboardSeries::from_config(&config.leaderboard, 0.0),
            competitors: CompetitorSim::new(&config.leaderboard, seed.map(|s| s.wrapping_add(1))),
            tween: None,
            price_history: VecDeque::with_capacity(config.leaderboard.points),
            price_history_cap: config.leaderboard.points,
            pnl_baseline: balance + owed,
            balance,
            owed_credit: owed,
        }
    }

    pub fn pending_stake(&self) -> f64 {
        pending_stake_total(&self.window)
    }

    /// balance + pending stakes + owed credits - baseline
    pub fn user_pnl(&self) -> f64 {
        round_cents(self.balance + self.pending_stake() + self.owed_credit - self.pnl_baseline)
    }

    pub fn push_price(&mut self, price: f64) {
        if self.price_history.len() >= self.price_history_cap {
            self.price_history.pop_front();
        }
        self.price_history.push_back(price);
    }

    /// Raw leaderboard values for this settlement.
    pub fn leaderboard_raw(&self, user_id: &str) -> HashMap<String, f64> {
        let mut raw = self.competitors.values();
        raw.insert(user_id.to_string(), self.user_pnl());
        raw
    }
}
