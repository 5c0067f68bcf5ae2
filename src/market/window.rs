//! Sliding Round Window
//!
//! Exactly N rounds with contiguous increasing ids. Index `N/2` is the
//! CURRENT slot: the locked round that settles on the next tick. Lower
//! indices are settled history, higher indices are open for betting.

use serde::{Deserialize, Serialize};

use super::round::{Round, RoundFactory};

/// Where a round sits relative to the CURRENT slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Settled,
    LockedCurrent,
    OpenFuture,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundWindow {
    rounds: Vec<Round>,
    current_index: usize,
}

impl RoundWindow {
    /// Wrap pre-built rounds. Panics unless the length is even and the ids
    /// are contiguous.
    pub fn new(rounds: Vec<Round>) -> Self {
        assert!(
            rounds.len() >= 2 && rounds.len() % 2 == 0,
            "round window length must be even and >= 2 (got {})",
            rounds.len()
        );
        let window = Self {
            current_index: rounds.len() / 2,
            rounds,
        };
        window.assert_contiguous();
        window
    }

    /// A fresh window of `n` unsettled rounds starting at `start_id`.
    pub fn seed(factory: &mut RoundFactory, start_id: u64, n: usize) -> Self {
        Self::new(factory.seed_window(start_id, n))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &Round {
        &self.rounds[self.current_index]
    }

    pub fn get(&self, index: usize) -> Option<&Round> {
        self.rounds.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Round> {
        self.rounds.get_mut(index)
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn iter(&self) -> impl Iterator<Item = &Round> {
        self.rounds.iter()
    }

    pub fn first_id(&self) -> u64 {
        self.rounds[0].id
    }

    pub fn last_id(&self) -> u64 {
        self.rounds[self.rounds.len() - 1].id
    }

    pub fn index_of(&self, round_id: u64) -> Option<usize> {
        let first = self.first_id();
        if round_id < first {
            return None;
        }
        let idx = (round_id - first) as usize;
        (idx < self.rounds.len()).then_some(idx)
    }

    pub fn phase_of(&self, index: usize) -> RoundPhase {
        if index < self.current_index {
            RoundPhase::Settled
        } else if index == self.current_index {
            RoundPhase::LockedCurrent
        } else {
            RoundPhase::OpenFuture
        }
    }

    /// Slide the window by one round.
    ///
    /// `settled` replaces the CURRENT entry, index 0 is evicted and a fresh
    /// round with `last_id + 1` is appended. The new CURRENT round is the
    /// one that previously sat at `CURRENT + 1`.
    pub fn advance(&mut self, settled: Round, factory: &mut RoundFactory) {
        assert_eq!(
            settled.id,
            self.current().id,
            "advance expects the settled CURRENT round"
        );
        debug_assert!(settled.settled && settled.revealed);

        let next_id = self.last_id() + 1;
        let ci = self.current_index;
        self.rounds[ci] = settled;
        self.rounds.remove(0);
        self.rounds.push(factory.create_round(next_id));
        self.assert_contiguous();
    }

    fn assert_contiguous(&self) {
        debug_assert!(self
            .rounds
            .windows(2)
            .all(|pair| pair[1].id == pair[0].id + 1));
    }
}
