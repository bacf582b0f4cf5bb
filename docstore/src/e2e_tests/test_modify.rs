//! Test atomic modify against stored rows, including rejected primary key
//! changes that must leave the store untouched.

use serde_json::json;

use crate::e2e_tests::helpers::{memory_slice, pk};
use crate::query::{Environment, Expr, Mapping, ModifyOp};
use crate::slice::{ModifyRequest, ModifyResult};
use crate::storage::Storage;
use crate::types::{Document, KeyRange, Recency};

fn counter_bump() -> ModifyRequest {
    ModifyRequest::new(
        ModifyOp::Update,
        "id",
        Mapping::new(
            "row",
            Expr::object([("hits", Expr::var("row").get_attr("hits").add(Expr::lit(1.0)))]),
        ),
    )
}

#[test]
fn test_repeated_updates_accumulate() {
    let mut slice = memory_slice();
    let env = Environment::new();
    let row: Document = json!({"id": "page", "hits": 0}).into();
    slice.set(&pk("page"), &row, false, Recency::new(1)).expect("set");

    for ts in 2..12 {
        let response = slice
            .modify(&pk("page"), &counter_bump(), &env, Recency::new(ts))
            .expect("modify");
        assert_eq!(response.result, ModifyResult::Modified);
    }

    assert_eq!(
        slice.get(&pk("page")).expect("get").data,
        json!({"id": "page", "hits": 10}).into()
    );
    let location = slice.acquire_for_read(&pk("page")).expect("read");
    assert_eq!(location.recency(), Some(Recency::new(11)));
}

#[test]
fn test_primary_key_change_is_rejected() {
    let mut slice = memory_slice();
    let env = Environment::new();
    let row: Document = json!({"id": "a", "name": "first"}).into();
    slice.set(&pk("a"), &row, false, Recency::new(1)).expect("set");
    let pages = slice.storage().pages_in_use();

    let rename = ModifyRequest::new(
        ModifyOp::Replace,
        "id",
        Mapping::new("row", Expr::var("row").merge(Expr::object([("id", Expr::lit("b"))]))),
    );
    let response = slice
        .modify(&pk("a"), &rename, &env, Recency::new(2))
        .expect("modify");

    let ModifyResult::Error(error) = response.result else {
        panic!("expected an error, got {:?}", response.result);
    };
    assert!(error.message.starts_with("mutate can't change the primary key (id)"));
    assert_eq!(error.backtrace.frames().first().map(String::as_str), Some("modify"));

    assert_eq!(slice.get(&pk("a")).expect("get").data, row);
    assert_eq!(slice.get(&pk("b")).expect("get").data, Document::Null);
    assert_eq!(slice.storage().pages_in_use(), pages);
    let location = slice.acquire_for_read(&pk("a")).expect("read");
    assert_eq!(location.recency(), Some(Recency::new(1)));
}

#[test]
fn test_insert_under_wrong_key_is_rejected() {
    let mut slice = memory_slice();
    let env = Environment::new().with_global("incoming", json!({"id": "x", "v": 1}).into());
    let insert = ModifyRequest::new(ModifyOp::Replace, "id", Mapping::new("row", Expr::var("incoming")));

    let response = slice
        .modify(&pk("y"), &insert, &env, Recency::new(1))
        .expect("modify");
    assert!(matches!(response.result, ModifyResult::Error(_)));
    assert_eq!(slice.count(&KeyRange::universe()).expect("count"), 0);

    let response = slice
        .modify(&pk("x"), &insert, &env, Recency::new(2))
        .expect("modify");
    assert_eq!(response.result, ModifyResult::Inserted);
    assert_eq!(
        slice.get(&pk("x")).expect("get").data,
        json!({"id": "x", "v": 1}).into()
    );
}

#[test]
fn test_modify_outcomes_on_missing_and_present_rows() {
    let mut slice = memory_slice();
    let env = Environment::new();
    let delete = ModifyRequest::new(ModifyOp::Replace, "id", Mapping::new("row", Expr::lit(Document::Null)));
    let identity = ModifyRequest::new(ModifyOp::Replace, "id", Mapping::identity());

    let response = slice.modify(&pk("m"), &counter_bump(), &env, Recency::new(1)).expect("modify");
    assert_eq!(response.result, ModifyResult::Skipped);
    let response = slice.modify(&pk("m"), &delete, &env, Recency::new(2)).expect("modify");
    assert_eq!(response.result, ModifyResult::Nop);

    let row: Document = json!({"id": "m", "hits": 3}).into();
    slice.set(&pk("m"), &row, false, Recency::new(3)).expect("set");
    let response = slice.modify(&pk("m"), &identity, &env, Recency::new(4)).expect("modify");
    assert_eq!(response.result, ModifyResult::Nop);
    let response = slice.modify(&pk("m"), &delete, &env, Recency::new(5)).expect("modify");
    assert_eq!(response.result, ModifyResult::Deleted);
    assert_eq!(slice.get(&pk("m")).expect("get").data, Document::Null);
}
