//! Leaderboard Series Engine
//!
//! Fixed-length PnL buffers per participant, advanced once per settlement:
//! - step participants (the user) record the raw value
//! - simulated competitors record an EMA of their random walk
//!
//! Tweening and persistence sit on top and never alter the buffers.

pub mod competitors;
pub mod series;
pub mod store;
pub mod tween;

pub use competitors::*;
pub use series::*;
pub use store::*;
pub use tween::*;
