//! Test set, overwrite and delete on single keys.

use serde_json::json;

use crate::e2e_tests::helpers::{memory_slice, num_pk, pk};
use crate::slice::{PointDeleteResult, PointWriteResult};
use crate::types::{Document, KeyRange, Recency};

#[test]
fn test_duplicate_set_keeps_first_value() {
    let mut slice = memory_slice();
    let first: Document = json!({"id": "alice", "age": 30}).into();
    let second: Document = json!({"id": "alice", "age": 31}).into();

    let result = slice.set(&pk("alice"), &first, false, Recency::new(1)).expect("set");
    assert_eq!(result, PointWriteResult::Stored);
    let result = slice.set(&pk("alice"), &second, false, Recency::new(2)).expect("set");
    assert_eq!(result, PointWriteResult::Duplicate);

    assert_eq!(slice.get(&pk("alice")).expect("get").data, first);
    let location = slice.acquire_for_read(&pk("alice")).expect("read");
    assert_eq!(location.recency(), Some(Recency::new(1)));
}

#[test]
fn test_overwrite_replaces_value_and_recency() {
    let mut slice = memory_slice();
    let first: Document = json!({"id": "bob", "v": "old"}).into();
    let second: Document = json!({"id": "bob", "v": "new"}).into();

    slice.set(&pk("bob"), &first, false, Recency::new(1)).expect("set");
    let result = slice.set(&pk("bob"), &second, true, Recency::new(5)).expect("set");
    assert_eq!(result, PointWriteResult::Stored);

    assert_eq!(slice.get(&pk("bob")).expect("get").data, second);
    let location = slice.acquire_for_read(&pk("bob")).expect("read");
    assert_eq!(location.recency(), Some(Recency::new(5)));
}

#[test]
fn test_delete_then_get_is_null() {
    let mut slice = memory_slice();
    let doc: Document = json!({"id": "carol"}).into();
    slice.set(&pk("carol"), &doc, false, Recency::new(1)).expect("set");
    assert_eq!(slice.count(&KeyRange::universe()).expect("count"), 1);

    let result = slice.delete(&pk("carol"), Recency::new(2)).expect("delete");
    assert_eq!(result, PointDeleteResult::Deleted);
    let result = slice.delete(&pk("carol"), Recency::new(3)).expect("delete");
    assert_eq!(result, PointDeleteResult::Missing);

    assert_eq!(slice.get(&pk("carol")).expect("get").data, Document::Null);
    assert_eq!(slice.count(&KeyRange::universe()).expect("count"), 0);

    // A deleted key accepts a fresh set without overwrite.
    let result = slice.set(&pk("carol"), &doc, false, Recency::new(4)).expect("set");
    assert_eq!(result, PointWriteResult::Stored);
}

#[test]
fn test_numeric_and_string_keys_do_not_collide() {
    let mut slice = memory_slice();
    let by_number: Document = json!({"id": 1}).into();
    let by_string: Document = json!({"id": "1"}).into();
    let number_key = num_pk(1);

    slice.set(&number_key, &by_number, false, Recency::new(1)).expect("set");
    slice.set(&pk("1"), &by_string, false, Recency::new(1)).expect("set");

    assert_eq!(slice.get(&number_key).expect("get").data, by_number);
    assert_eq!(slice.get(&pk("1")).expect("get").data, by_string);
    assert_eq!(slice.count(&KeyRange::universe()).expect("count"), 2);
}
