//! Test distribution estimates over full, partial and emptied ranges.

use std::collections::BTreeMap;

use crate::e2e_tests::helpers::{fill, memory_slice, num_pk};
use crate::slice::AcceptAll;
use crate::types::{KeyRange, StoreKey};

#[test]
fn test_distribution_covers_range_in_order() {
    let mut slice = memory_slice();
    fill(&mut slice, 1_500, 31);

    let range = KeyRange::universe();
    let response = slice.sample_distribution(&range, 2).expect("sample");
    let keys: Vec<_> = response.key_counts.keys().cloned().collect();

    assert_eq!(keys.first(), Some(&StoreKey::min()));
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    let estimated: u64 = response.key_counts.values().sum();
    assert!(estimated <= 1_500);
    assert!(estimated + keys.len() as u64 > 1_500);
}

#[test]
fn test_distribution_of_emptied_range() {
    let mut slice = memory_slice();
    fill(&mut slice, 1_500, 32);

    let range = KeyRange::half_open(num_pk(200), num_pk(1_300));
    let erased = slice.erase_range(&range, &AcceptAll).expect("erase");
    assert_eq!(erased, 1_100);

    let response = slice.sample_distribution(&range, 4).expect("sample");
    assert_eq!(response.key_counts, BTreeMap::from([(num_pk(200), 0)]));

    let outside = KeyRange::half_open(num_pk(0), num_pk(200));
    let response = slice.sample_distribution(&outside, 4).expect("sample");
    let estimated: u64 = response.key_counts.values().sum();
    assert!(estimated > 0);
    assert!(response.key_counts.keys().all(|k| outside.contains_key(k)));
}
