//! Rolling per-participant PnL series.
//!
//! Every participant owns a buffer of exactly `points` samples. A push
//! shifts all buffers by one slot in lockstep, so index `i` means the same
//! number of settlements ago for everyone.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::config::LeaderboardConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    /// Value the buffer is filled with before any settlement
    pub initial_value: f64,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, initial_value: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            initial_value,
        }
    }
}

/// How each participant's next sample is derived from its raw value
#[derive(Debug, Clone)]
pub struct SeriesPolicy {
    /// Raw values, no smoothing
    pub step_ids: HashSet<String>,
    /// Weight on the previous smoothed value for everyone else
    pub ema_alpha: f64,
}

impl SeriesPolicy {
    pub fn new<I, S>(step_ids: I, ema_alpha: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            step_ids: step_ids.into_iter().map(Into::into).collect(),
            ema_alpha,
        }
    }

    pub fn is_step(&self, id: &str) -> bool {
        self.step_ids.contains(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankEntry {
    /// 1-based
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub value: f64,
}

/// Persisted form of the buffers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    pub buffer_length: usize,
    pub samples: BTreeMap<String, Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct LeaderboardSeries {
    points: usize,
    policy: SeriesPolicy,
    participants: Vec<Participant>,
    buffers: HashMap<String, VecDeque<f64>>,
    /// EMA state of non-step participants
    smoothed: HashMap<String, f64>,
    pushes: u64,
}

impl LeaderboardSeries {
    pub fn new(participants: Vec<Participant>, points: usize, policy: SeriesPolicy) -> Self {
        assert!(points > 0, "series needs at least one point");
        let mut buffers = HashMap::with_capacity(participants.len());
        let mut smoothed = HashMap::with_capacity(participants.len());
        for p in &participants {
            buffers.insert(p.id.clone(), VecDeque::from(vec![p.initial_value; points]));
            smoothed.insert(p.id.clone(), p.initial_value);
        }
        Self {
            points,
            policy,
            participants,
            buffers,
            smoothed,
            pushes: 0,
        }
    }

    /// User first, then the configured competitors.
    pub fn from_config(config: &LeaderboardConfig, user_initial: f64) -> Self {
        let mut participants = vec![Participant::new(
            config.user_id.clone(),
            config.user_name.clone(),
            user_initial,
        )];
        participants.extend(
            config
                .competitors
                .iter()
                .map(|c| Participant::new(c.id.clone(), c.name.clone(), c.initial_pnl)),
        );
        Self::new(
            participants,
            config.points,
            SeriesPolicy::new(config.step_ids.iter().cloned(), config.ema_alpha),
        )
    }

    /// Advance every buffer by one sample. Called once per settlement.
    ///
    /// A participant missing from `raw` repeats its previous smoothed value.
    pub fn push(&mut self, raw: &HashMap<String, f64>) {
        let alpha = self.policy.ema_alpha;
        for p in &self.participants {
            let Some(buf) = self.buffers.get_mut(&p.id) else {
                continue;
            };
            let prev_smooth = self
                .smoothed
                .get(&p.id)
                .copied()
                .or_else(|| buf.back().copied())
                .unwrap_or(0.0);
            let raw_value = raw.get(&p.id).copied().unwrap_or(prev_smooth);

            let next = if self.policy.is_step(&p.id) {
                raw_value
            } else {
                let v = alpha * prev_smooth + (1.0 - alpha) * raw_value;
                self.smoothed.insert(p.id.clone(), v);
                v
            };

            buf.pop_front();
            buf.push_back(next);
        }
        self.pushes += 1;
        debug!(pushes = self.pushes, "leaderboard series advanced");
    }

    pub fn points(&self) -> usize {
        self.points
    }

    pub fn pushes(&self) -> u64 {
        self.pushes
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn is_step(&self, id: &str) -> bool {
        self.policy.is_step(id)
    }

    pub fn step_ids(&self) -> Vec<String> {
        self.policy.step_ids.iter().cloned().collect()
    }

    pub fn latest(&self, id: &str) -> Option<f64> {
        self.buffers.get(id).and_then(|b| b.back().copied())
    }

    /// Oldest first
    pub fn samples(&self, id: &str) -> Option<Vec<f64>> {
        self.buffers.get(id).map(|b| b.iter().copied().collect())
    }

    /// Descending by latest sample; equal values keep participant order.
    pub fn rankings(&self) -> Vec<RankEntry> {
        let mut rows: Vec<(usize, &Participant, f64)> = self
            .participants
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p, self.latest(&p.id).unwrap_or(p.initial_value)))
            .collect();
        rows.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        rows.into_iter()
            .enumerate()
            .map(|(rank, (_, p, value))| RankEntry {
                rank: rank + 1,
                id: p.id.clone(),
                name: p.name.clone(),
                value,
            })
            .collect()
    }

    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            buffer_length: self.points,
            samples: self
                .buffers
                .iter()
                .map(|(id, buf)| (id.clone(), buf.iter().copied().collect()))
                .collect(),
        }
    }

    /// Load persisted buffers, fitting each to the current length.
    ///
    /// Short buffers are padded at the front with their oldest value, long
    /// ones keep the newest samples. Participants absent from the snapshot
    /// restart at their initial value; unknown ids in the snapshot are ignored.
    pub fn restore(&mut self, snapshot: &SeriesSnapshot) {
        if snapshot.buffer_length != self.points {
            debug!(
                stored = snapshot.buffer_length,
                points = self.points,
                "resizing restored leaderboard series"
            );
        }
        for p in &self.participants {
            let fitted = match snapshot.samples.get(&p.id) {
                Some(stored) => fit_buffer(stored, self.points, p.initial_value),
                None => vec![p.initial_value; self.points],
            };
            let last = fitted.last().copied().unwrap_or(p.initial_value);
            self.buffers.insert(p.id.clone(), VecDeque::from(fitted));
            self.smoothed.insert(p.id.clone(), last);
        }
    }
}

fn fit_buffer(stored: &[f64], points: usize, fallback: f64) -> Vec<f64> {
    let clean: Vec<f64> = stored.iter().copied().filter(|v| v.is_finite()).collect();
    if clean.len() >= points {
        return clean[clean.len() - points..].to_vec();
    }
    let pad = clean.first().copied().unwrap_or(fallback);
    let mut out = vec![pad; points - clean.len()];
    out.extend(clean);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(points: usize) -> LeaderboardSeries {
        LeaderboardSeries::new(
            vec![
                Participant::new("you", "You", 0.0),
                Participant::new("alpha", "Alpha", 8.5),
                Participant::new("blaze", "Blaze", 6.2),
            ],
            points,
            SeriesPolicy::new(["you"], 0.85),
        )
    }

    fn raw(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_step_participant_takes_raw_value() {
        let mut s = series(8);
        s.push(&raw(&[("you", 1.37), ("alpha", 20.0), ("blaze", 6.2)]));
        assert_eq!(s.latest("you"), Some(1.37));
        s.push(&raw(&[("you", -0.42)]));
        assert_eq!(s.latest("you"), Some(-0.42));
    }

    #[test]
    fn test_non_step_participant_is_smoothed() {
        let mut s = series(8);
        s.push(&raw(&[("you", 0.0), ("alpha", 20.0)]));
        let expected = 0.85 * 8.5 + 0.15 * 20.0;
        assert!((s.latest("alpha").unwrap() - expected).abs() < 1e-9);

        s.push(&raw(&[("alpha", 30.0)]));
        let expected2 = 0.85 * expected + 0.15 * 30.0;
        assert!((s.latest("alpha").unwrap() - expected2).abs() < 1e-9);

        // no raw value: stays at the smoothed value
        assert!((s.latest("blaze").unwrap() - 6.2).abs() < 1e-9);
    }

    #[test]
    fn test_buffers_stay_fixed_length_and_in_lockstep() {
        let mut s = series(4);
        for i in 0..10 {
            s.push(&raw(&[("you", i as f64)]));
        }
        for p in s.participants() {
            assert_eq!(s.samples(&p.id).unwrap().len(), 4);
        }
        assert_eq!(s.samples("you").unwrap(), vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(s.pushes(), 10);
    }

    #[test]
    fn test_rankings_descending_with_stable_ties() {
        let mut s = LeaderboardSeries::new(
            vec![
                Participant::new("you", "You", 5.0),
                Participant::new("alpha", "Alpha", 5.0),
                Participant::new("blaze", "Blaze", 9.0),
            ],
            4,
            SeriesPolicy::new(["you"], 0.85),
        );
        let ranks = s.rankings();
        let ids: Vec<&str> = ranks.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["blaze", "you", "alpha"]);
        assert_eq!(ranks[0].rank, 1);

        s.push(&raw(&[("you", 12.0)]));
        assert_eq!(s.rankings()[0].id, "you");
    }

    #[test]
    fn test_restore_pads_and_truncates() {
        let mut s = series(4);
        let mut samples = BTreeMap::new();
        samples.insert("you".to_string(), vec![1.0, 2.0]);
        samples.insert("alpha".to_string(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        samples.insert("ghost".to_string(), vec![99.0]);
        s.restore(&SeriesSnapshot {
            buffer_length: 6,
            samples,
        });

        assert_eq!(s.samples("you").unwrap(), vec![1.0, 1.0, 1.0, 2.0]);
        assert_eq!(s.samples("alpha").unwrap(), vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(s.samples("blaze").unwrap(), vec![6.2; 4]);
        assert!(s.samples("ghost").is_none());

        // EMA continues from the restored tail
        s.push(&raw(&[("alpha", 6.0)]));
        assert!((s.latest("alpha").unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_round_trip_preserves_buffers() {
        let mut s = series(4);
        s.push(&raw(&[("you", 2.0), ("alpha", 1.0)]));
        let snap = s.snapshot();
        assert_eq!(snap.buffer_length, 4);

        let mut fresh = series(4);
        fresh.restore(&snap);
        for p in s.participants() {
            assert_eq!(fresh.samples(&p.id), s.samples(&p.id));
        }
    }
}
