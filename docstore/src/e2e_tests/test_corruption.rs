//! Test that damaged pages surface as corruption rather than bad data.

use crate::e2e_tests::helpers::{memory_slice, pk};
use crate::query::Environment;
use crate::signal::Interruptor;
use crate::slice::{ScanRequest, value};
use crate::storage::Storage;
use crate::testing::DocumentGenerator;
use crate::types::{KeyRange, Recency};

#[test]
fn test_corrupt_overflow_page_fails_reads() {
    let mut slice = memory_slice();
    let mut generator = DocumentGenerator::new(61);
    let small = generator.document("small", 20);
    let big = generator.document("big", 25_000);
    slice.set(&pk("small"), &small, false, Recency::new(1)).expect("set");
    slice.set(&pk("big"), &big, false, Recency::new(1)).expect("set");

    let pages = {
        let location = slice.acquire_for_read(&pk("big")).expect("read");
        let value_ref = location.value().expect("stored");
        value::overflow_pages(slice.storage(), value_ref).expect("chain")
    };
    assert!(pages.len() > 1);
    assert!(slice.storage_mut().corrupt_page(pages[1], 300));

    let err = slice.get(&pk("big")).err().expect("corrupt read fails");
    assert!(err.is_corruption(), "unexpected error: {err}");

    // Other keys on healthy pages still read.
    assert_eq!(slice.get(&pk("small")).expect("get").data, small);

    let err = slice
        .scan(
            &ScanRequest::new(KeyRange::universe()),
            &Environment::new(),
            &Interruptor::never(),
        )
        .err()
        .expect("scan over the corrupt value fails");
    assert!(err.is_corruption());

    let err = slice.check_integrity().err().expect("integrity check fails");
    assert!(err.is_corruption());
}

#[test]
fn test_corrupt_leaf_fails_lookup() {
    let mut slice = memory_slice();
    let doc = DocumentGenerator::new(62).document("only", 10);
    slice.set(&pk("only"), &doc, false, Recency::new(1)).expect("set");

    let root = slice.storage().superblock().index_root;
    assert!(slice.storage_mut().corrupt_page(root, 200));

    let err = slice.get(&pk("only")).err().expect("corrupt leaf fails");
    assert!(err.is_corruption());
}
