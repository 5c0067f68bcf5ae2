//! Round Market Core
//!
//! The round lifecycle and everything that touches pools:
//! 1. Buckets and change classification
//! 2. Round creation with seeded ambient liquidity
//! 3. The fixed-size sliding round window
//! 4. Pari-mutuel payouts
//! 5. Bet validation, stake accounting and settled-bet history
//! 6. The tick-driven settlement state machine
//!
//! Round states:
//! ```text
//! OPEN_FUTURE (index > CURRENT) ──slide──▶ LOCKED_CURRENT (index == CURRENT) ──tick──▶ SETTLED
//! ```

pub mod bet_ledger;
pub mod bucket;
pub mod payout;
pub mod round;
pub mod settlement;
pub mod window;

pub use bet_ledger::*;
pub use bucket::*;
pub use payout::*;
pub use round::*;
pub use settlement::*;
pub use window::*;

/// Whole cents for an amount in currency units.
#[inline]
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

#[inline]
pub fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Round to the smallest currency unit.
#[inline]
pub fn round_cents(amount: f64) -> f64 {
    from_cents(to_cents(amount))
}
