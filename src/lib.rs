//! RoundMarket Backend Library
//!
//! Round-based pari-mutuel prediction market engine: a sliding window of
//! rounds settled against a live price, four outcome buckets per round,
//! a bet ledger over an injectable balance backend and a rolling PnL
//! leaderboard.

pub mod config;
pub mod feed;
pub mod leaderboard;
pub mod ledger;
pub mod market;
pub mod session;

pub use config::EngineConfig;
pub use session::{MarketSession, SessionEvent, SessionSnapshot};
