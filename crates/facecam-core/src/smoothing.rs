//! Temporal smoothing of per-frame age and gender estimates.
//!
//! Each slot keeps a short FIFO of recent samples. Age is reported as the
//! mean of the window; gender by majority vote over the window.

use crate::types::{Expression, ExpressionScores, Gender};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Number of recent samples retained per slot.
pub const SMOOTHING_WINDOW: usize = 8;

/// Fixed-capacity history for one slot.
#[derive(Debug, Clone)]
pub struct SlotHistory {
    ages: VecDeque<f32>,
    genders: VecDeque<Gender>,
    capacity: usize,
}

impl SlotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            ages: VecDeque::with_capacity(capacity + 1),
            genders: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push_age(&mut self, age: f32) {
        push_bounded(&mut self.ages, age, self.capacity);
    }

    pub fn push_gender(&mut self, gender: Gender) {
        push_bounded(&mut self.genders, gender, self.capacity);
    }

    /// Retained age samples, oldest first.
    pub fn ages(&self) -> impl Iterator<Item = f32> + '_ {
        self.ages.iter().copied()
    }

    /// Retained gender samples, oldest first.
    pub fn genders(&self) -> impl Iterator<Item = Gender> + '_ {
        self.genders.iter().copied()
    }

    /// Arithmetic mean of the retained ages, `None` before the first sample.
    pub fn mean_age(&self) -> Option<f32> {
        if self.ages.is_empty() {
            return None;
        }
        Some(self.ages.iter().sum::<f32>() / self.ages.len() as f32)
    }

    /// Most frequent retained gender; `Gender::Unknown` before the first sample.
    pub fn majority_gender(&self) -> Gender {
        majority_vote(self.genders.iter().copied()).unwrap_or(Gender::Unknown)
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, capacity: usize) {
    queue.push_back(value);
    while queue.len() > capacity {
        queue.pop_front();
    }
}

/// Smoothed attributes for one slot after an observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothed {
    pub age: f32,
    pub gender: Gender,
}

/// Smoothing histories keyed by slot index.
///
/// Owned by the pipeline; cleared with [`reset`](Self::reset) at the start
/// of every camera session so no history leaks between sessions.
#[derive(Debug, Clone)]
pub struct SmoothingState {
    slots: HashMap<usize, SlotHistory>,
    capacity: usize,
}

impl Default for SmoothingState {
    fn default() -> Self {
        Self::new(SMOOTHING_WINDOW)
    }
}

impl SmoothingState {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record one frame's estimates for `slot` and return the smoothed values.
    ///
    /// A missing age is not recorded; a missing gender is recorded as
    /// `Gender::Unknown` so it still takes part in the vote.
    pub fn observe(&mut self, slot: usize, age: Option<f32>, gender: Option<Gender>) -> Smoothed {
        let capacity = self.capacity;
        let history = self
            .slots
            .entry(slot)
            .or_insert_with(|| SlotHistory::new(capacity));

        if let Some(age) = age {
            history.push_age(age);
        }
        history.push_gender(gender.unwrap_or(Gender::Unknown));

        Smoothed {
            age: history.mean_age().unwrap_or(0.0),
            gender: history.majority_gender(),
        }
    }

    pub fn slot(&self, slot: usize) -> Option<&SlotHistory> {
        self.slots.get(&slot)
    }

    /// Drop every slot not in `live`.
    pub fn retain_slots(&mut self, live: &[usize]) {
        self.slots.retain(|slot, _| live.contains(slot));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn reset(&mut self) {
        self.slots.clear();
    }
}

/// Most frequent item. Ties go to the smallest item by `Ord`, which for
/// `Gender` is lexical order of the label.
pub fn majority_vote<T>(items: impl IntoIterator<Item = T>) -> Option<T>
where
    T: Copy + Ord + Hash,
{
    let mut counts: HashMap<T, usize> = HashMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
        .map(|(item, _)| item)
}

/// Highest-scoring expression. Ties go to the lexically smallest name;
/// non-finite scores are ignored.
pub fn top_expression(scores: &ExpressionScores) -> Option<Expression> {
    let mut best: Option<(Expression, f32)> = None;
    // BTreeMap iterates in lexical order; only a strictly higher score replaces.
    for (&expr, &score) in scores {
        if !score.is_finite() {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((expr, score)),
        }
    }
    best.map(|(expr, _)| expr)
}
