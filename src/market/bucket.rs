//! Outcome Buckets
//!
//! Four mutually exclusive outcome classes ordered from most bullish (0) to
//! most bearish (3), and the rule that maps a percent move onto one of them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ThresholdConfig;

pub const BUCKET_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketId {
    StrongBull,
    Bull,
    Bear,
    StrongBear,
}

impl BucketId {
    pub const ALL: [BucketId; BUCKET_COUNT] = [
        BucketId::StrongBull,
        BucketId::Bull,
        BucketId::Bear,
        BucketId::StrongBear,
    ];

    /// Rank 0..3, 0 = most bullish.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            BucketId::StrongBull => 0,
            BucketId::Bull => 1,
            BucketId::Bear => 2,
            BucketId::StrongBear => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            BucketId::StrongBull => "Strong Bull",
            BucketId::Bull => "Bull",
            BucketId::Bear => "Bear",
            BucketId::StrongBear => "Strong Bear",
        }
    }

    /// Strong buckets draw their seed liquidity from the wider range.
    pub fn is_strong(self) -> bool {
        matches!(self, BucketId::StrongBull | BucketId::StrongBear)
    }

    pub fn is_bullish(self) -> bool {
        matches!(self, BucketId::StrongBull | BucketId::Bull)
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One outcome column of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: BucketId,
    /// Seeded ambient liquidity plus every stake placed on this bucket
    pub pool_total: f64,
    /// The user's accumulated stake, if any
    pub user_stake: Option<f64>,
}

impl Bucket {
    pub fn new(id: BucketId, pool_total: f64) -> Self {
        Self {
            id,
            pool_total,
            user_stake: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.id.label()
    }
}

/// Percent move from `baseline` to `spot`; 0 when there is no usable baseline.
pub fn change_pct(spot: f64, baseline: f64) -> f64 {
    if baseline > 0.0 && spot.is_finite() {
        (spot - baseline) / baseline * 100.0
    } else {
        0.0
    }
}

/// Map a percent move onto a bucket.
///
/// Moves inside the flat band `(-weak, weak)` repeat `tie_bucket`, falling
/// back to Bull when no previous winner exists.
pub fn classify_change(
    change_pct: f64,
    thresholds: &ThresholdConfig,
    tie_bucket: Option<BucketId>,
) -> BucketId {
    if change_pct >= thresholds.strong_pct {
        BucketId::StrongBull
    } else if change_pct >= thresholds.weak_pct {
        BucketId::Bull
    } else if change_pct <= -thresholds.strong_pct {
        BucketId::StrongBear
    } else if change_pct <= -thresholds.weak_pct {
        BucketId::Bear
    } else {
        tie_bucket.unwrap_or(BucketId::Bull)
    }
}

/// True when `change_pct` falls in the flat band and the tie-break decides.
pub fn is_flat(change_pct: f64, thresholds: &ThresholdConfig) -> bool {
    change_pct > -thresholds.weak_pct && change_pct < thresholds.weak_pct
}
