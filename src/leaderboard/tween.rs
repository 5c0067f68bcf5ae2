//! Display interpolation between two series states.
//!
//! Presentation only: the authoritative buffers in `LeaderboardSeries` are
//! never touched. Step participants always show their target buffer.

use std::collections::{BTreeMap, HashSet};

use super::series::SeriesSnapshot;
use crate::config::LeaderboardConfig;

pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Element-wise blend; `from` slots missing on the left take the target value.
pub fn lerp_series(from: &[f64], to: &[f64], t: f64) -> Vec<f64> {
    let offset = to.len().saturating_sub(from.len());
    to.iter()
        .enumerate()
        .map(|(i, &b)| {
            let a = if i >= offset {
                from.get(i - offset).copied().unwrap_or(b)
            } else {
                b
            };
            a + (b - a) * t
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SeriesTween {
    from: BTreeMap<String, Vec<f64>>,
    to: BTreeMap<String, Vec<f64>>,
    step_ids: HashSet<String>,
    duration_ms: u64,
}

impl SeriesTween {
    pub fn new(
        from: &SeriesSnapshot,
        to: &SeriesSnapshot,
        step_ids: impl IntoIterator<Item = String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            from: from.samples.clone(),
            to: to.samples.clone(),
            step_ids: step_ids.into_iter().collect(),
            duration_ms,
        }
    }

    /// Step ids and duration taken from the leaderboard config.
    pub fn from_config(from: &SeriesSnapshot, to: &SeriesSnapshot, config: &LeaderboardConfig) -> Self {
        Self::new(from, to, config.step_ids.iter().cloned(), config.tween_ms)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_finished(&self, elapsed_ms: u64) -> bool {
        elapsed_ms >= self.duration_ms
    }

    /// Buffers to display `elapsed_ms` after the settlement.
    pub fn sample(&self, elapsed_ms: u64) -> BTreeMap<String, Vec<f64>> {
        if self.duration_ms == 0 || self.is_finished(elapsed_ms) {
            return self.to.clone();
        }
        let eased = ease_out_cubic(elapsed_ms as f64 / self.duration_ms as f64);
        self.to
            .iter()
            .map(|(id, target)| {
                let shown = match self.from.get(id) {
                    Some(from) if !self.step_ids.contains(id) => lerp_series(from, target, eased),
                    _ => target.clone(),
                };
                (id.clone(), shown)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(pairs: &[(&str, Vec<f64>)]) -> SeriesSnapshot {
        SeriesSnapshot {
            buffer_length: pairs.first().map(|(_, v)| v.len()).unwrap_or(0),
            samples: pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    #[test]
    fn test_ease_out_cubic_endpoints() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert_eq!(ease_out_cubic(2.0), 1.0);
        assert!((ease_out_cubic(0.5) - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_step_ids_snap_others_blend() {
        let from = snap(&[("you", vec![0.0, 0.0]), ("alpha", vec![0.0, 0.0])]);
        let to = snap(&[("you", vec![0.0, 4.0]), ("alpha", vec![0.0, 4.0])]);
        let tween = SeriesTween::new(&from, &to, vec!["you".to_string()], 700);

        let start = tween.sample(0);
        assert_eq!(start["you"], vec![0.0, 4.0]);
        assert_eq!(start["alpha"], vec![0.0, 0.0]);

        let mid = tween.sample(350);
        assert!((mid["alpha"][1] - 3.5).abs() < 1e-9);

        assert_eq!(tween.sample(700)["alpha"], vec![0.0, 4.0]);
        assert!(tween.is_finished(701));
    }

    #[test]
    fn test_from_config_uses_tween_ms_and_step_ids() {
        let config = LeaderboardConfig {
            tween_ms: 400,
            ..LeaderboardConfig::default()
        };
        let from = snap(&[("you", vec![1.0]), ("alpha", vec![0.0])]);
        let to = snap(&[("you", vec![3.0]), ("alpha", vec![8.0])]);
        let tween = SeriesTween::from_config(&from, &to, &config);
        assert_eq!(tween.duration_ms(), 400);
        let mid = tween.sample(200);
        assert_eq!(mid["you"], vec![3.0]);
        assert!((mid["alpha"][0] - 7.0).abs() < 1e-9);
        assert!(tween.is_finished(400));
    }

    #[test]
    fn test_lerp_handles_shorter_source() {
        assert_eq!(lerp_series(&[2.0], &[1.0, 4.0], 0.5), vec![1.0, 3.0]);
    }
}
