//! Test that a write failing partway through leaves the slice as it was
//! before that write: earlier documents readable, nothing half-stored and no
//! pages lost.

use crate::e2e_tests::helpers::{memory_slice, pk};
use crate::testing::DocumentGenerator;
use crate::types::{Document, KeyRange, Recency};

#[test]
fn test_failed_set_keeps_earlier_documents() {
    for budget in 0..160 {
        let mut slice = memory_slice();
        let mut generator = DocumentGenerator::new(budget);
        slice.storage_mut().fail_writes_after(Some(budget));

        let mut stored: Vec<(String, Document)> = Vec::new();
        let (failed_id, failed_doc) = loop {
            let id = format!("doc-{:04}", stored.len());
            let doc = generator.any_document(id.as_str());
            match slice.set(&pk(&id), &doc, false, Recency::new(1)) {
                Ok(_) => stored.push((id, doc)),
                Err(e) => {
                    assert!(!e.is_corruption(), "budget {budget}: {e}");
                    break (id, doc);
                }
            }
        };

        for (id, doc) in &stored {
            assert_eq!(
                &slice.get(&pk(id)).expect("get").data,
                doc,
                "budget {budget}: {id} lost"
            );
        }
        assert_eq!(slice.get(&pk(&failed_id)).expect("get").data, Document::Null);
        assert_eq!(
            slice.count(&KeyRange::universe()).expect("count"),
            u64::try_from(stored.len()).expect("count fits")
        );
        let report = slice.check_integrity().expect("integrity");
        assert_eq!(report.leaked_pages, 0, "budget {budget}");

        slice.storage_mut().fail_writes_after(None);
        slice
            .set(&pk(&failed_id), &failed_doc, false, Recency::new(2))
            .expect("retry");
        assert_eq!(slice.get(&pk(&failed_id)).expect("get").data, failed_doc);
    }
}

#[test]
fn test_failed_overwrite_keeps_old_value() {
    let mut slice = memory_slice();
    let mut generator = DocumentGenerator::new(7);
    let old = generator.document("k", 12_000);
    slice.set(&pk("k"), &old, false, Recency::new(1)).expect("set");
    let before = slice.check_integrity().expect("integrity");

    for budget in 0..4 {
        slice.storage_mut().fail_writes_after(Some(budget));
        let new = generator.document("k", 20_000);
        slice
            .set(&pk("k"), &new, true, Recency::new(2))
            .expect_err("write should fail");
        slice.storage_mut().fail_writes_after(None);

        assert_eq!(slice.get(&pk("k")).expect("get").data, old);
        assert_eq!(slice.check_integrity().expect("integrity"), before);
    }
}
