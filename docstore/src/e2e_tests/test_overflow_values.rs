//! Test values on both sides of the inline limit, and that replacing or
//! deleting large values gives their pages back.

use crate::Slice;
use crate::e2e_tests::helpers::{memory_slice, pk};
use crate::slice::ValueRef;
use crate::slice::value::MAX_INLINE_VALUE_SIZE;
use crate::storage::{MemoryStorage, Storage};
use crate::testing::DocumentGenerator;
use crate::types::{Document, KeyRange, Recency};

fn is_overflow(slice: &Slice<MemoryStorage>, id: &str) -> bool {
    slice
        .acquire_for_read(&pk(id))
        .expect("read")
        .value()
        .is_some_and(ValueRef::is_overflow)
}

#[test]
fn test_values_round_trip_across_inline_limit() {
    let mut slice = memory_slice();
    let mut generator = DocumentGenerator::new(21);

    let sizes = [0, 10, MAX_INLINE_VALUE_SIZE - 80, MAX_INLINE_VALUE_SIZE, 4_000, 50_000];
    let mut stored = Vec::new();
    for (i, size) in sizes.into_iter().enumerate() {
        let id = format!("doc-{i}");
        let doc = generator.document(id.as_str(), size);
        slice.set(&pk(&id), &doc, false, Recency::new(1)).expect("set");
        stored.push((id, doc));
    }

    for (id, doc) in &stored {
        assert_eq!(&slice.get(&pk(id)).expect("get").data, doc);
    }
    assert!(!is_overflow(&slice, "doc-0"));
    assert!(is_overflow(&slice, "doc-3"));
    assert!(is_overflow(&slice, "doc-5"));

    let report = slice.check_integrity().expect("integrity");
    assert_eq!(report.live_entries, 6);
    assert!(report.overflow_pages >= 9);
    assert_eq!(report.leaked_pages, 0);
}

#[test]
fn test_overwrite_releases_old_overflow_chain() {
    let mut slice = memory_slice();
    let mut generator = DocumentGenerator::new(22);
    let baseline = slice.storage().pages_in_use();

    let big = generator.document("k", 30_000);
    slice.set(&pk("k"), &big, false, Recency::new(1)).expect("set");
    let with_big = slice.storage().pages_in_use();
    assert!(with_big >= baseline + 4);

    let bigger = generator.document("k", 60_000);
    slice.set(&pk("k"), &bigger, true, Recency::new(2)).expect("set");
    assert_eq!(slice.get(&pk("k")).expect("get").data, bigger);
    assert_eq!(slice.check_integrity().expect("integrity").leaked_pages, 0);

    let small: Document = serde_json::json!({"id": "k"}).into();
    slice.set(&pk("k"), &small, true, Recency::new(3)).expect("set");
    assert_eq!(slice.storage().pages_in_use(), baseline);
    assert!(!is_overflow(&slice, "k"));

    slice.delete(&pk("k"), Recency::new(4)).expect("delete");
    let report = slice.check_integrity().expect("integrity");
    assert_eq!(report.overflow_pages, 0);
    assert_eq!(report.leaked_pages, 0);
    assert_eq!(slice.count(&KeyRange::universe()).expect("count"), 0);
}

#[test]
fn test_random_workload_keeps_pages_accounted() {
    let mut slice = memory_slice();
    let mut generator = DocumentGenerator::new(23);

    for round in 0..4u64 {
        for i in 0..60 {
            let id = format!("r{i:03}");
            let doc = generator.any_document(id.as_str());
            slice.set(&pk(&id), &doc, true, Recency::new(round * 100 + 1)).expect("set");
        }
        for i in (0..60).step_by(3) {
            let id = format!("r{i:03}");
            slice.delete(&pk(&id), Recency::new(round * 100 + 2)).expect("delete");
        }
        let report = slice.check_integrity().expect("integrity");
        assert_eq!(report.live_entries, 40);
        assert_eq!(report.leaked_pages, 0);
    }
}
