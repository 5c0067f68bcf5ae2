//! Market Session
//!
//! Binds the round engine to a balance ledger, the price board and the
//! leaderboard for one active market. Per settlement, in order:
//! settle the CURRENT round, record history and stats, credit the payout,
//! drift competitors, push one leaderboard sample, persist, broadcast.

pub mod market_session;
pub mod state;

pub use market_session::*;
pub use state::SessionStats;
