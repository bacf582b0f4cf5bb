//! Test that a file-backed slice survives close and reopen.

use crate::Slice;
use crate::e2e_tests::helpers::{file_config, fill, num_pk, pk};
use crate::slice::{AcceptAll, StoreError};
use crate::storage::{Storage, StorageError};
use crate::testing::DocumentGenerator;
use crate::types::{KeyRange, Recency};

#[test]
fn test_reopen_preserves_documents_and_pages() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = file_config(&dir);

    let (docs, pages) = {
        let mut slice = Slice::create_file(&config).expect("create");
        let docs = fill(&mut slice, 250, 51);
        slice.delete(&num_pk(7), Recency::new(1_000)).expect("delete");
        slice.sync().expect("sync");
        (docs, slice.storage().pages_in_use())
    };

    let slice = Slice::open_file(&config).expect("open");
    assert_eq!(slice.path(), config.database_path.as_path());
    assert_eq!(slice.storage().pages_in_use(), pages);
    assert_eq!(slice.count(&KeyRange::universe()).expect("count"), 249);
    for (key, doc) in &docs {
        let data = slice.get(key).expect("get").data;
        if *key == num_pk(7) {
            assert!(data.is_null());
        } else {
            assert_eq!(&data, doc);
        }
    }
    assert_eq!(slice.check_integrity().expect("integrity").leaked_pages, 0);
}

#[test]
fn test_writes_after_reopen_reuse_free_pages() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = file_config(&dir);
    let mut generator = DocumentGenerator::new(52);

    {
        let mut slice = Slice::create_file(&config).expect("create");
        fill(&mut slice, 120, 53);
        slice.erase_range(&KeyRange::half_open(num_pk(0), num_pk(60)), &AcceptAll).expect("erase");
        slice.sync().expect("sync");
    }

    let mut slice = Slice::open_file(&config).expect("open");
    let before = slice.count(&KeyRange::universe()).expect("count");
    assert_eq!(before, 60);

    let big = generator.document("late", 40_000);
    slice.set(&pk("late"), &big, false, Recency::new(500)).expect("set");
    slice.sync().expect("sync");
    drop(slice);

    let slice = Slice::open_file(&config).expect("reopen");
    assert_eq!(slice.get(&pk("late")).expect("get").data, big);
    assert_eq!(slice.count(&KeyRange::universe()).expect("count"), 61);
    let report = slice.check_integrity().expect("integrity");
    assert_eq!(report.live_entries, 61);
    assert_eq!(report.leaked_pages, 0);
}

#[test]
fn test_create_refuses_existing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = file_config(&dir);
    Slice::create_file(&config).expect("create");

    let err = Slice::create_file(&config).err().expect("second create fails");
    assert!(matches!(err, StoreError::Storage(StorageError::AlreadyExists(_))));
}
