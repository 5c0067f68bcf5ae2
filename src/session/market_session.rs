use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::{MarketState, SessionStats};
use crate::config::EngineConfig;
use crate::feed::{Market, PriceBoard};
use crate::leaderboard::{RankEntry, SeriesSnapshot, SeriesStore, SeriesTween};
use crate::ledger::BalanceLedger;
use crate::market::{
    active_bets, round_cents, ActiveBet, BetReceipt, BetRecord, BetRejection, BucketId, Round,
    SettlementEvent, SettlementStats,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    BetPlaced {
        market: Market,
        receipt: BetReceipt,
    },
    BetRejected {
        market: Market,
        round_index: Option<usize>,
        reason: BetRejection,
    },
    RoundSettled {
        market: Market,
        event: SettlementEvent,
        balance: f64,
        pnl: f64,
    },
    LeaderboardUpdated {
        market: Market,
        rankings: Vec<RankEntry>,
    },
    MarketSwitched {
        from: Market,
        to: Market,
        refunded: f64,
    },
}

/// Read-only view of a session for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub market: Market,
    pub rounds: Vec<Round>,
    pub current_index: usize,
    pub time_left: u32,
    pub balance: f64,
    pub pending_stake: f64,
    pub owed_credit: f64,
    pub pnl: f64,
    pub active_bets: Vec<ActiveBet>,
    pub history: Vec<BetRecord>,
    pub stats: SessionStats,
    pub settlement: SettlementStats,
    pub price_history: Vec<f64>,
    pub last_price: Option<f64>,
    pub series: SeriesSnapshot,
    pub rankings: Vec<RankEntry>,
}

/// One user's view of one active market.
///
/// All per-market state sits behind a single async mutex. Bet placement
/// keeps the lock across the ledger call, so a bet lands entirely before or
/// entirely after any settlement.
pub struct MarketSession {
    pub id: Uuid,
    config: Arc<EngineConfig>,
    state: Mutex<MarketState>,
    ledger: Arc<dyn BalanceLedger>,
    prices: Arc<PriceBoard>,
    store: Option<SeriesStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl MarketSession {
    pub async fn new(
        config: EngineConfig,
        market: Market,
        ledger: Arc<dyn BalanceLedger>,
        prices: Arc<PriceBoard>,
        store: Option<SeriesStore>,
    ) -> Result<Self> {
        config.validate().context("invalid engine config")?;
        let balance = ledger
            .balance_of()
            .await
            .context("read initial balance")?;

        let mut state = MarketState::fresh(&config, market, 0, balance, 0.0);
        if let Some(store) = &store {
            restore_series(store, &mut state).await;
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let id = Uuid::new_v4();
        info!(
            session_id = %id,
            market = market.as_str(),
            ledger = ledger.kind(),
            balance,
            "market session started"
        );

        Ok(Self {
            id,
            config: Arc::new(config),
            state: Mutex::new(state),
            ledger,
            prices,
            store,
            events,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn market(&self) -> Market {
        self.state.lock().await.market
    }

    /// Bet on the round at `round_index` of the window.
    pub async fn place_bet(
        &self,
        round_index: usize,
        bucket: BucketId,
        amount: f64,
    ) -> Result<BetReceipt, BetRejection> {
        let mut guard = self.state.lock().await;
        self.place_locked(&mut guard, round_index, bucket, amount)
            .await
    }

    /// Bet on a round by id.
    pub async fn place_bet_by_id(
        &self,
        round_id: u64,
        bucket: BucketId,
        amount: f64,
    ) -> Result<BetReceipt, BetRejection> {
        let mut guard = self.state.lock().await;
        let Some(round_index) = guard.window.index_of(round_id) else {
            self.reject(&guard, None, BetRejection::UnknownRound);
            return Err(BetRejection::UnknownRound);
        };
        self.place_locked(&mut guard, round_index, bucket, amount)
            .await
    }

    async fn place_locked(
        &self,
        state: &mut MarketState,
        round_index: usize,
        bucket: BucketId,
        amount: f64,
    ) -> Result<BetReceipt, BetRejection> {
        let balance = match self.ledger.balance_of().await {
            Ok(b) => b,
            Err(e) => {
                let reason = BetRejection::LedgerUnavailable(e.to_string());
                self.reject(state, Some(round_index), reason.clone());
                return Err(reason);
            }
        };
        state.balance = balance;

        let ticket = match state
            .bets
            .prepare(&state.window, round_index, bucket, amount, balance)
        {
            Ok(t) => t,
            Err(reason) => {
                self.reject(state, Some(round_index), reason.clone());
                return Err(reason);
            }
        };

        // nothing local has changed yet; a failed debit needs no rollback
        let new_balance = match self.ledger.debit(ticket.amount).await {
            Ok(b) => b,
            Err(e) => {
                warn!(
                    round_id = ticket.round_id,
                    amount = ticket.amount,
                    ledger = self.ledger.kind(),
                    error = %e,
                    "bet debit failed"
                );
                let reason = BetRejection::LedgerUnavailable(e.to_string());
                self.reject(state, Some(round_index), reason.clone());
                return Err(reason);
            }
        };

        let (user_stake, bucket_pool) = state.bets.apply(&mut state.window, &ticket);
        state.balance = new_balance;
        state.stats.total_staked = round_cents(state.stats.total_staked + ticket.amount);

        let receipt = BetReceipt {
            id: Uuid::new_v4(),
            round_id: ticket.round_id,
            bucket: ticket.bucket,
            amount: ticket.amount,
            user_stake,
            bucket_pool,
            balance: new_balance,
        };
        info!(
            market = state.market.as_str(),
            round_id = receipt.round_id,
            bucket = %receipt.bucket,
            amount = receipt.amount,
            user_stake,
            balance = new_balance,
            "bet placed"
        );
        let _ = self.events.send(SessionEvent::BetPlaced {
            market: state.market,
            receipt: receipt.clone(),
        });
        Ok(receipt)
    }

    fn reject(&self, state: &MarketState, round_index: Option<usize>, reason: BetRejection) {
        debug!(
            market = state.market.as_str(),
            round_index,
            reason = %reason,
            "bet rejected"
        );
        let _ = self.events.send(SessionEvent::BetRejected {
            market: state.market,
            round_index,
            reason,
        });
    }

    /// One countdown second. Settles when the countdown expires.
    pub async fn on_clock_second(&self, now_ms: i64) -> Option<SettlementEvent> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        self.flush_owed(state).await;
        if !state.clock.tick_second() {
            return None;
        }
        self.settle_locked(state, now_ms).await
    }

    /// Settle the current round immediately and restart the countdown.
    /// An ignored duplicate leaves the countdown running.
    pub async fn settle_now(&self, now_ms: i64) -> Option<SettlementEvent> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let event = self.settle_locked(state, now_ms).await?;
        state.clock.reset();
        Some(event)
    }

    async fn settle_locked(&self, state: &mut MarketState, now_ms: i64) -> Option<SettlementEvent> {
        let spot = self.prices.latest_price(state.market);
        let event = state
            .settlement
            .settle(&mut state.window, &mut state.factory, spot, now_ms)?;

        state.push_price(event.settlement_price);
        if let Some(outcome) = &event.user_outcome {
            state.stats.completed += 1;
            if outcome.won {
                state.stats.wins += 1;
                state.stats.total_winnings = round_cents(state.stats.total_winnings + outcome.payout);
                state.owed_credit = round_cents(state.owed_credit + outcome.payout);
            }
            state.history.push(BetRecord::from_settlement(&event, outcome));
        }
        self.flush_owed(state).await;

        state.competitors.drift();
        let raw = state.leaderboard_raw(&self.config.leaderboard.user_id);
        let before = state.series.snapshot();
        state.series.push(&raw);
        state.tween = Some(SeriesTween::from_config(
            &before,
            &state.series.snapshot(),
            &self.config.leaderboard,
        ));
        let rankings = state.series.rankings();
        let pnl = state.user_pnl();

        if let Some(store) = &self.store {
            let key = state.market.series_key();
            if let Err(e) = store.save(&key, &state.series.snapshot(), now_ms).await {
                warn!(key = %key, error = %e, "failed to persist leaderboard series");
            }
        }

        let _ = self.events.send(SessionEvent::RoundSettled {
            market: state.market,
            event: event.clone(),
            balance: state.balance,
            pnl,
        });
        let _ = self.events.send(SessionEvent::LeaderboardUpdated {
            market: state.market,
            rankings,
        });
        Some(event)
    }

    /// Push owed payouts to the ledger; kept for the next tick on failure.
    async fn flush_owed(&self, state: &mut MarketState) {
        if !(state.owed_credit > 0.0) {
            return;
        }
        let amount = round_cents(state.owed_credit);
        match self.ledger.credit(amount).await {
            Ok(balance) => {
                state.owed_credit = 0.0;
                state.balance = balance;
                debug!(amount, balance, "credit applied");
            }
            Err(e) => {
                warn!(
                    amount,
                    ledger = self.ledger.kind(),
                    error = %e,
                    "credit failed, retrying next tick"
                );
            }
        }
    }

    /// Replace all per-market state with a fresh window for `market`.
    ///
    /// Stakes on unsettled rounds are refunded first and the PnL baseline
    /// restarts at the post-refund balance. Returns the refunded amount.
    pub async fn switch_market(&self, market: Market) -> f64 {
        let mut guard = self.state.lock().await;
        let from = guard.market;
        if from == market {
            return 0.0;
        }

        let refunded = round_cents(guard.pending_stake());
        let mut owed = round_cents(guard.owed_credit + refunded);
        let mut balance = guard.balance;
        if owed > 0.0 {
            match self.ledger.credit(owed).await {
                Ok(b) => {
                    balance = b;
                    owed = 0.0;
                }
                Err(e) => warn!(
                    amount = owed,
                    error = %e,
                    "refund credit failed, carrying it as owed"
                ),
            }
        }
        if let Ok(b) = self.ledger.balance_of().await {
            balance = b;
        }

        let mut next = MarketState::fresh(&self.config, market, guard.generation + 1, balance, owed);
        if let Some(store) = &self.store {
            restore_series(store, &mut next).await;
        }
        *guard = next;

        info!(
            from = from.as_str(),
            to = market.as_str(),
            refunded,
            balance,
            "market switched"
        );
        let _ = self.events.send(SessionEvent::MarketSwitched {
            from,
            to: market,
            refunded,
        });
        refunded
    }

    /// Leaderboard buffers to render `elapsed_ms` after the last settlement.
    /// Before the first settlement of a market this is the stored series.
    pub async fn display_series(&self, elapsed_ms: u64) -> BTreeMap<String, Vec<f64>> {
        let state = self.state.lock().await;
        match &state.tween {
            Some(tween) => tween.sample(elapsed_ms),
            None => state.series.snapshot().samples,
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            session_id: self.id,
            market: state.market,
            rounds: state.window.rounds().to_vec(),
            current_index: state.window.current_index(),
            time_left: state.clock.time_left(),
            balance: state.balance,
            pending_stake: state.pending_stake(),
            owed_credit: state.owed_credit,
            pnl: state.user_pnl(),
            active_bets: active_bets(&state.window),
            history: state.history.to_vec(),
            stats: state.stats.clone(),
            settlement: state.settlement.stats.clone(),
            price_history: state.price_history.iter().copied().collect(),
            last_price: self.prices.latest_price(state.market),
            series: state.series.snapshot(),
            rankings: state.series.rankings(),
        }
    }

    /// Drive the countdown from a background task.
    ///
    /// Every `period` counts as one countdown second; the settlement clock
    /// advances 1000 ms per tick so a shortened period speeds the whole
    /// market up instead of tripping the duplicate guard.
    pub fn spawn_clock(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            interval.tick().await;
            let mut sim_ms = Utc::now().timestamp_millis();
            loop {
                interval.tick().await;
                sim_ms += 1000;
                self.on_clock_second(sim_ms).await;
            }
        })
    }
}

async fn restore_series(store: &SeriesStore, state: &mut MarketState) {
    let key = state.market.series_key();
    match store.load(&key).await {
        Ok(Some(snapshot)) => {
            state.series.restore(&snapshot);
            info!(key = %key, "leaderboard series restored");
        }
        Ok(None) => {}
        Err(e) => warn!(key = %key, error = %e, "failed to load leaderboard series"),
    }
}
