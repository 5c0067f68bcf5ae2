//! Balance Ledger
//!
//! The engine treats the user's balance as an opaque ledger. Two backends:
//! - `LocalLedger`: in-memory, cent-exact, never fails except on overdraft
//! - `SimulatedRemoteLedger`: network-shaped stub with latency and random
//!   rejections, for exercising the rollback path
//!
//! A failed call must leave the balance exactly as it was.

pub mod local;
pub mod remote;

pub use local::*;
pub use remote::*;

use anyhow::Result;

#[async_trait::async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Remove `amount` from the balance; returns the new balance.
    async fn debit(&self, amount: f64) -> Result<f64>;
    /// Add `amount` to the balance; returns the new balance.
    async fn credit(&self, amount: f64) -> Result<f64>;
    async fn balance_of(&self) -> Result<f64>;
    /// Short backend name for logs
    fn kind(&self) -> &'static str;
}
