//! Test range erasure with different key testers.

use crate::e2e_tests::helpers::{fill, memory_slice, num_pk, stream_items, stream_scan};
use crate::slice::{AcceptAll, RangeTester, RejectAll};
use crate::storage::Storage;
use crate::types::{Document, KeyRange};

#[test]
fn test_reject_all_erases_nothing() {
    let mut slice = memory_slice();
    let docs = fill(&mut slice, 200, 41);
    let pages = slice.storage().pages_in_use();

    let erased = slice.erase_range(&KeyRange::universe(), &RejectAll).expect("erase");
    assert_eq!(erased, 0);
    assert_eq!(slice.storage().pages_in_use(), pages);
    assert_eq!(stream_items(stream_scan(&slice, KeyRange::universe())), docs);
}

#[test]
fn test_accept_all_over_sub_range() {
    let mut slice = memory_slice();
    let docs = fill(&mut slice, 200, 42);

    let range = KeyRange::half_open(num_pk(50), num_pk(150));
    let erased = slice.erase_range(&range, &AcceptAll).expect("erase");
    assert_eq!(erased, 100);

    let expected: Vec<_> = docs.into_iter().filter(|(k, _)| !range.contains_key(k)).collect();
    assert_eq!(stream_items(stream_scan(&slice, KeyRange::universe())), expected);

    let report = slice.check_integrity().expect("integrity");
    assert_eq!(report.live_entries, 100);
    assert_eq!(report.tombstones, 0);
    assert_eq!(report.leaked_pages, 0);
}

#[test]
fn test_range_tester_inside_erase_range() {
    let mut slice = memory_slice();
    fill(&mut slice, 100, 43);

    let tester = RangeTester::new(vec![
        KeyRange::half_open(num_pk(10), num_pk(20)),
        KeyRange::at_least(num_pk(90)),
    ]);
    let erased = slice
        .erase_range(&KeyRange::half_open(num_pk(15), num_pk(95)), &tester)
        .expect("erase");
    assert_eq!(erased, 10);
    assert_eq!(slice.count(&KeyRange::universe()).expect("count"), 90);
    assert_eq!(slice.get(&num_pk(14)).expect("get").data.get_field("id"), Some(&Document::from(14.0)));
    assert_eq!(slice.get(&num_pk(95)).expect("get").data.get_field("id"), Some(&Document::from(95.0)));
}

#[test]
fn test_erase_everything_then_refill() {
    let mut slice = memory_slice();
    fill(&mut slice, 150, 44);
    let erased = slice.erase_range(&KeyRange::universe(), &AcceptAll).expect("erase");
    assert_eq!(erased, 150);
    assert_eq!(slice.count(&KeyRange::universe()).expect("count"), 0);

    let docs = fill(&mut slice, 150, 45);
    assert_eq!(stream_items(stream_scan(&slice, KeyRange::universe())), docs);
    assert_eq!(slice.check_integrity().expect("integrity").leaked_pages, 0);
}
