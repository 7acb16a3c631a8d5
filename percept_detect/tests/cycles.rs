// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event-array invariants across random detection cycles, and best-score selection
//! against a full sort.

use std::collections::BTreeSet;

use percept_container::SensedStimulus;
use percept_detect::{
    DetectConfig, DetectDepth, DetectPool, SenseEvent, Strategy as Pick, best_by_score,
    best_with,
};
use proptest::prelude::*;

fn reference(scores: &[f32], count: usize, min_score: f32) -> Vec<usize> {
    let mut all: Vec<usize> = (0..scores.len()).filter(|&i| scores[i] >= min_score).collect();
    all.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    all.truncate(count);
    all
}

fn depth() -> impl Strategy<Value = DetectDepth> {
    prop_oneof![
        Just(DetectDepth::Current),
        Just(DetectDepth::New),
        Just(DetectDepth::Lost),
        Just(DetectDepth::Forget),
    ]
}

/// One cycle: the owners seen (with scores) and whether the update overrides.
fn cycles() -> impl Strategy<Value = Vec<(Vec<(u64, f32)>, bool)>> {
    proptest::collection::vec(
        (
            proptest::collection::vec((0_u64..24, 0.0_f32..1.0), 0..12),
            prop::bool::weighted(0.8),
        ),
        1..30,
    )
}

fn owners(pool: &DetectPool, event: SenseEvent) -> BTreeSet<u64> {
    pool.copy_of(event).iter().map(|r| r.owner).collect()
}

proptest! {
    #[test]
    fn strategies_match_full_sort(
        scores in proptest::collection::vec(-1.0_f32..1.0, 0..80),
        count in 1_usize..20,
        min_score in -1.0_f32..0.5,
    ) {
        let expected = reference(&scores, count, min_score);
        prop_assert_eq!(best_by_score(&scores, count, min_score), expected.clone());
        prop_assert_eq!(best_with(Pick::Heap, &scores, count, min_score), expected.clone());
        prop_assert_eq!(best_with(Pick::Select, &scores, count, min_score), expected.clone());
        let first = best_with(Pick::Linear, &scores, count, min_score);
        prop_assert_eq!(first.first(), expected.first());
    }

    #[test]
    fn tiers_stay_disjoint(
        depth in depth(),
        track_best in 0_usize..5,
        force in any::<bool>(),
        cycles in cycles(),
    ) {
        let mut pool = DetectPool::new(DetectConfig {
            depth,
            track_best,
            min_best_score: 0.0,
            force_by_best_score: force,
        });
        for (step, (seen, override_state)) in cycles.iter().enumerate() {
            let now = step as f64 * 0.5;
            let before = owners(&pool, SenseEvent::Current);
            for &(owner, score) in seen {
                pool.add(now, SensedStimulus::new(owner, 1).with_age(1.0).with_score(score));
            }
            if seen.is_empty() {
                pool.empty_update(*override_state, |_| true);
            } else {
                pool.new_sensed_update(*override_state);
            }
            pool.new_age_update(now, |_| true);
            prop_assert!(pool.check_sorted());

            let current = owners(&pool, SenseEvent::Current);
            let new = owners(&pool, SenseEvent::New);
            let lost = owners(&pool, SenseEvent::Lost);
            let forget = owners(&pool, SenseEvent::Forget);
            prop_assert!(current.is_disjoint(&lost));
            prop_assert!(current.is_disjoint(&forget));
            prop_assert!(lost.is_disjoint(&forget));
            if *override_state && !seen.is_empty() {
                prop_assert!(new.is_subset(&current));
                if depth >= DetectDepth::New {
                    let fresh: BTreeSet<u64> = current.difference(&before).copied().collect();
                    prop_assert_eq!(&new, &fresh);
                }
            }
            if depth < DetectDepth::Lost {
                prop_assert!(lost.is_empty());
            }
            if depth < DetectDepth::Forget {
                prop_assert!(forget.is_empty());
            }
            if force && track_best > 0 && !seen.is_empty() && *override_state {
                prop_assert!(current.len() <= track_best);
            }
            let tracked = current.len() + lost.len() + forget.len();
            prop_assert!(pool.len() >= tracked);
        }
    }
}
