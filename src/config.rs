//! Engine Configuration
//!
//! Every tunable of the round engine lives here. Values resolve in three
//! layers: built-in defaults, an optional TOML file, then `ROUNDMARKET_*`
//! environment overrides (after `.env` has been loaded).

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a market session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rounds visible in the window (past half + bettable half)
    pub visible_rounds: usize,
    /// Countdown length per round
    pub reveal_secs: u32,
    /// Slack subtracted from the reveal period when suppressing duplicate timer fires
    pub duplicate_guard_epsilon_ms: i64,
    /// Id given to the leftmost round of a freshly seeded window
    pub start_round_id: u64,

    /// Smallest stake accepted before clamping to balance
    pub min_bet: f64,
    /// Settled bet rows retained in history
    pub history_cap: usize,
    /// Balance a local ledger starts with
    pub initial_balance: f64,

    /// Classification thresholds
    pub thresholds: ThresholdConfig,
    /// Ambient liquidity seeded into every new round
    pub seed_pools: SeedPoolConfig,
    /// Leaderboard series settings
    pub leaderboard: LeaderboardConfig,

    /// Fixed RNG seed for reproducible runs; entropy when absent
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            visible_rounds: 12,
            reveal_secs: 5,
            duplicate_guard_epsilon_ms: 50,
            start_round_id: 10423,
            min_bet: 0.25,
            history_cap: 100,
            initial_balance: 10.0,
            thresholds: ThresholdConfig::default(),
            seed_pools: SeedPoolConfig::default(),
            leaderboard: LeaderboardConfig::default(),
            rng_seed: None,
        }
    }
}

/// Percent-move thresholds. `0.005` means 0.005%, not half a percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub strong_pct: f64,
    pub weak_pct: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            strong_pct: 0.005,
            weak_pct: 0.0015,
        }
    }
}

/// Inclusive integer range for a seeded pool
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedPoolConfig {
    /// Strong Bull / Strong Bear buckets
    pub strong: PoolRange,
    /// Bull / Bear buckets
    pub moderate: PoolRange,
}

impl Default for SeedPoolConfig {
    fn default() -> Self {
        Self {
            strong: PoolRange { min: 10, max: 59 },
            moderate: PoolRange { min: 10, max: 49 },
        }
    }
}

/// A simulated opponent and the PnL it starts from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorConfig {
    pub id: String,
    pub name: String,
    pub initial_pnl: f64,
}

impl CompetitorConfig {
    fn new(id: &str, name: &str, initial_pnl: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            initial_pnl,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Samples kept per participant
    pub points: usize,
    /// EMA weight on the previous smoothed value
    pub ema_alpha: f64,
    /// Participants that take raw values (no smoothing, no tween)
    pub step_ids: Vec<String>,
    /// Id of the human participant
    pub user_id: String,
    pub user_name: String,
    /// Display tween length for non-step lines
    pub tween_ms: u64,
    /// Per-settlement competitor drift: `(u - drift_bias) * drift_scale`
    pub drift_bias: f64,
    pub drift_scale: f64,
    pub competitors: Vec<CompetitorConfig>,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            points: 64,
            ema_alpha: 0.85,
            step_ids: vec!["you".to_string()],
            user_id: "you".to_string(),
            user_name: "You".to_string(),
            tween_ms: 700,
            drift_bias: 0.45,
            drift_scale: 100.0,
            competitors: vec![
                CompetitorConfig::new("alpha", "Alpha", 8.5),
                CompetitorConfig::new("blaze", "Blaze", 6.2),
                CompetitorConfig::new("nexus", "Nexus", 5.1),
            ],
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the TOML file at `path`, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parse config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("ROUNDMARKET_VISIBLE_ROUNDS") {
            self.visible_rounds = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_REVEAL_SECS") {
            self.reveal_secs = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_GUARD_EPSILON_MS") {
            self.duplicate_guard_epsilon_ms = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_START_ROUND_ID") {
            self.start_round_id = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_MIN_BET") {
            self.min_bet = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_HISTORY_CAP") {
            self.history_cap = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_INITIAL_BALANCE") {
            self.initial_balance = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_STRONG_PCT") {
            self.thresholds.strong_pct = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_WEAK_PCT") {
            self.thresholds.weak_pct = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_LB_POINTS") {
            self.leaderboard.points = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_LB_EMA") {
            self.leaderboard.ema_alpha = v;
        }
        if let Some(v) = env_parse("ROUNDMARKET_SEED") {
            self.rng_seed = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.visible_rounds < 4 || self.visible_rounds % 2 != 0 {
            return Err(anyhow!(
                "visible_rounds must be even and at least 4 (got {})",
                self.visible_rounds
            ));
        }
        if self.reveal_secs == 0 {
            return Err(anyhow!("reveal_secs must be positive"));
        }
        let reveal_ms = self.reveal_secs as i64 * 1000;
        if self.duplicate_guard_epsilon_ms < 0 || self.duplicate_guard_epsilon_ms >= reveal_ms {
            return Err(anyhow!(
                "duplicate_guard_epsilon_ms must be within [0, {})",
                reveal_ms
            ));
        }
        if !(self.min_bet.is_finite() && self.min_bet > 0.0) {
            return Err(anyhow!("min_bet must be positive"));
        }
        if self.history_cap == 0 {
            return Err(anyhow!("history_cap must be positive"));
        }
        if !(self.initial_balance.is_finite() && self.initial_balance >= 0.0) {
            return Err(anyhow!("initial_balance must be non-negative"));
        }
        let t = &self.thresholds;
        if !(t.weak_pct > 0.0 && t.weak_pct < t.strong_pct) {
            return Err(anyhow!(
                "thresholds must satisfy 0 < weak ({}) < strong ({})",
                t.weak_pct,
                t.strong_pct
            ));
        }
        for (name, range) in [
            ("strong", self.seed_pools.strong),
            ("moderate", self.seed_pools.moderate),
        ] {
            if range.min == 0 || range.min > range.max {
                return Err(anyhow!(
                    "{} seed pool range invalid: {}..={}",
                    name,
                    range.min,
                    range.max
                ));
            }
        }
        let lb = &self.leaderboard;
        if lb.points < 2 {
            return Err(anyhow!("leaderboard.points must be at least 2"));
        }
        if !(0.0..1.0).contains(&lb.ema_alpha) {
            return Err(anyhow!("leaderboard.ema_alpha must be within [0, 1)"));
        }
        if lb.competitors.iter().any(|c| c.id == lb.user_id) {
            return Err(anyhow!("competitor id collides with user id {}", lb.user_id));
        }
        Ok(())
    }

    /// Current round slot in the window
    pub fn current_index(&self) -> usize {
        self.visible_rounds / 2
    }

    pub fn reveal_ms(&self) -> i64 {
        self.reveal_secs as i64 * 1000
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        config.validate().expect("defaults are valid");
        assert_eq!(config.current_index(), 6);
        assert_eq!(config.reveal_ms(), 5000);
    }

    #[test]
    fn test_rejects_odd_window() {
        let config = EngineConfig {
            visible_rounds: 11,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = EngineConfig::default();
        config.thresholds.weak_pct = 0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
            visible_rounds = 8
            reveal_secs = 3
            rng_seed = 7

            [thresholds]
            strong_pct = 0.01

            [leaderboard]
            points = 32
        "#;
        let config = EngineConfig::from_toml_str(raw).expect("parse");
        assert_eq!(config.visible_rounds, 8);
        assert_eq!(config.reveal_secs, 3);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.thresholds.strong_pct, 0.01);
        assert_eq!(config.thresholds.weak_pct, 0.0015);
        assert_eq!(config.leaderboard.points, 32);
        assert_eq!(config.leaderboard.competitors.len(), 3);
        config.validate().expect("valid");
    }
}
