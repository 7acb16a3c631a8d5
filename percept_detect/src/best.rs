// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Top-K selection by score.
//!
//! Candidates are ranked by descending score, ties broken by ascending index, so
//! every strategy returns the same indices in the same order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// How [`best_with`] selects.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// One pass keeping the maximum. Only meaningful for `count == 1`.
    Linear,
    /// Bounded heap of the best `count` seen so far.
    Heap,
    /// Linear-time selection of the `count`-th element, then a sort of the prefix.
    Select,
}

fn rank(scores: &[f32]) -> impl Fn(&usize, &usize) -> Ordering + '_ {
    move |&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b))
}

#[derive(Copy, Clone, Debug)]
struct Ranked {
    score: f32,
    index: usize,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    // Better candidates compare less, so a max-heap keeps the worst on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then(self.index.cmp(&other.index))
    }
}

fn eligible(scores: &[f32], min_score: f32) -> Vec<usize> {
    (0..scores.len()).filter(|&i| scores[i] >= min_score).collect()
}

fn linear(scores: &[f32], candidates: &[usize]) -> Vec<usize> {
    let order = rank(scores);
    candidates
        .iter()
        .copied()
        .min_by(|a, b| order(a, b))
        .into_iter()
        .collect()
}

fn heap(scores: &[f32], candidates: &[usize], count: usize) -> Vec<usize> {
    let mut kept = BinaryHeap::with_capacity(count + 1);
    for &index in candidates {
        let next = Ranked {
            score: scores[index],
            index,
        };
        if kept.len() < count {
            kept.push(next);
        } else if kept.peek().is_some_and(|worst| next < *worst) {
            kept.pop();
            kept.push(next);
        }
    }
    kept.into_sorted_vec().into_iter().map(|r| r.index).collect()
}

fn select(scores: &[f32], mut candidates: Vec<usize>, count: usize) -> Vec<usize> {
    let order = rank(scores);
    if candidates.len() > count {
        candidates.select_nth_unstable_by(count - 1, &order);
        candidates.truncate(count);
    }
    candidates.sort_unstable_by(&order);
    candidates
}

/// Indices of the best `count` scores at or above `min_score`, best first.
///
/// `count == 1` scans once. A small `count` against a larger candidate set uses a
/// bounded heap. Everything else selects the `count`-th element in linear time and
/// sorts only the selected prefix.
pub fn best_by_score(scores: &[f32], count: usize, min_score: f32) -> Vec<usize> {
    let strategy = match count {
        1 => Strategy::Linear,
        c if c < 10 && scores.len() > c => Strategy::Heap,
        _ => Strategy::Select,
    };
    best_with(strategy, scores, count, min_score)
}

/// [`best_by_score`] with an explicit strategy.
///
/// [`Strategy::Linear`] returns at most one index whatever `count` is.
pub fn best_with(strategy: Strategy, scores: &[f32], count: usize, min_score: f32) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }
    let candidates = eligible(scores, min_score);
    if candidates.is_empty() {
        return candidates;
    }
    match strategy {
        Strategy::Linear => linear(scores, &candidates),
        Strategy::Heap => heap(scores, &candidates, count),
        Strategy::Select => select(scores, candidates, count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_highest_first() {
        let scores = [0.1, 0.9, 0.5, 0.7, 0.3];
        assert_eq!(best_by_score(&scores, 1, 0.0), vec![1]);
        assert_eq!(best_by_score(&scores, 3, 0.0), vec![1, 3, 2]);
        assert_eq!(best_by_score(&scores, 10, 0.0), vec![1, 3, 2, 4, 0]);
    }

    #[test]
    fn min_score_excludes() {
        let scores = [0.1, 0.9, 0.5, 0.7, 0.3];
        assert_eq!(best_by_score(&scores, 4, 0.5), vec![1, 3, 2]);
        assert!(best_by_score(&scores, 4, 0.95).is_empty());
        assert!(best_by_score(&scores, 0, 0.0).is_empty());
        assert!(best_by_score(&[], 3, 0.0).is_empty());
    }

    #[test]
    fn ties_break_by_index() {
        let scores = [0.5, 0.8, 0.5, 0.8, 0.5];
        for strategy in [Strategy::Heap, Strategy::Select] {
            assert_eq!(best_with(strategy, &scores, 3, 0.0), vec![1, 3, 0]);
        }
        assert_eq!(best_with(Strategy::Linear, &scores, 1, 0.0), vec![1]);
    }

    #[test]
    fn strategies_agree_on_a_large_input() {
        let scores: Vec<f32> = (0..500_u32)
            .map(|i| ((i * 7919) % 1000) as f32 / 1000.0)
            .collect();
        for count in [2, 5, 9, 10, 64, 499, 500, 600] {
            let heap = best_with(Strategy::Heap, &scores, count, 0.25);
            let select = best_with(Strategy::Select, &scores, count, 0.25);
            assert_eq!(heap, select, "count {count}");
        }
    }
}
