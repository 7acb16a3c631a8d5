// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Algebraic laws of the sorted-array operations.

use percept_sorted::{
    Natural, difference, difference_binary, difference_linear, insert_unique, is_sorted_unique,
    merge,
};
use proptest::prelude::*;

fn sorted_set() -> impl Strategy<Value = Vec<u16>> {
    proptest::collection::btree_set(0_u16..200, 0..40).prop_map(|s| s.into_iter().collect())
}

proptest! {
    #[test]
    fn merge_is_sorted_union(a in sorted_set(), b in sorted_set()) {
        let mut ab = a.clone();
        merge(&mut ab, &b, &Natural, false);
        let mut ba = b.clone();
        merge(&mut ba, &a, &Natural, false);
        prop_assert!(is_sorted_unique(&ab, &Natural));
        prop_assert_eq!(&ab, &ba);
        let mut expected: Vec<u16> = a.iter().chain(b.iter()).copied().collect();
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(ab, expected);
    }

    #[test]
    fn merge_with_self_is_idempotent(a in sorted_set()) {
        let mut aa = a.clone();
        merge(&mut aa, &a, &Natural, true);
        prop_assert_eq!(aa, a);
    }

    #[test]
    fn difference_of_union(a in sorted_set(), b in sorted_set()) {
        let mut lhs = a.clone();
        merge(&mut lhs, &b, &Natural, false);
        difference(&mut lhs, &b, &Natural);
        let mut rhs = a.clone();
        difference(&mut rhs, &b, &Natural);
        prop_assert!(is_sorted_unique(&rhs, &Natural));
        prop_assert_eq!(lhs, rhs);
    }

    #[test]
    fn difference_strategies_agree(a in sorted_set(), b in sorted_set()) {
        let mut linear = a.clone();
        let mut binary = a.clone();
        difference_linear(&mut linear, &b, &Natural);
        difference_binary(&mut binary, &b, &Natural);
        prop_assert_eq!(&linear, &binary);
        let expected: Vec<u16> = a.into_iter().filter(|v| !b.contains(v)).collect();
        prop_assert_eq!(linear, expected);
    }

    #[test]
    fn insert_unique_never_duplicates(values in proptest::collection::vec(0_u16..50, 0..80)) {
        let mut a = Vec::new();
        for v in values {
            insert_unique(&mut a, v, &Natural, false);
            prop_assert!(is_sorted_unique(&a, &Natural));
        }
    }
}
