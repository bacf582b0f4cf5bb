//! Test that resuming truncated scans visits every document exactly once.

use crate::e2e_tests::helpers::{fill, memory_slice, num_pk, stream_items, stream_scan};
use crate::query::{Environment, Expr, Mapping, TransformStep};
use crate::signal::Interruptor;
use crate::slice::{FixedSizeEstimator, ScanRequest};
use crate::types::{Document, KeyRange};

#[test]
fn test_chunked_scan_matches_full_scan() {
    let chunk = FixedSizeEstimator::DEFAULT_DOCUMENT_SIZE * 10;
    let mut slice = memory_slice().with_scan_chunk_size(chunk);
    let expected = fill(&mut slice, 300, 7);

    let mut collected = Vec::new();
    let mut range = KeyRange::universe();
    let mut chunks = 0;
    loop {
        let response = stream_scan(&slice, range.clone());
        chunks += 1;
        let truncated = response.truncated;
        let last = response.last_considered_key.clone();
        let items = stream_items(response);
        if truncated {
            assert_eq!(items.len(), 10);
            assert_eq!(items.last().map(|(k, _)| k), Some(&last));
        }
        collected.extend(items);

        if !truncated {
            break;
        }
        let Some(next) = last.successor() else {
            break;
        };
        range = KeyRange::at_least(next);
    }

    assert_eq!(chunks, 31);
    assert_eq!(collected, expected);
}

#[test]
fn test_chunked_filtered_scan() {
    let chunk = FixedSizeEstimator::DEFAULT_DOCUMENT_SIZE * 4;
    let mut slice = memory_slice().with_scan_chunk_size(chunk);
    let all = fill(&mut slice, 120, 11);
    let expected: Vec<_> = all
        .into_iter()
        .filter(|(_, doc)| doc.get_field("flag") == Some(&Document::Bool(true)))
        .collect();

    let filter = TransformStep::filter(Mapping::new("row", Expr::var("row").get_attr("flag")));
    let mut collected = Vec::new();
    let mut range = KeyRange::universe();
    loop {
        let request = ScanRequest::new(range.clone()).with_transform(filter.clone());
        let response = slice
            .scan(&request, &Environment::new(), &Interruptor::never())
            .expect("scan");
        let truncated = response.truncated;
        let last = response.last_considered_key.clone();
        let items = stream_items(response);
        assert!(items.iter().all(|(k, _)| range.contains_key(k)));
        collected.extend(items);

        match last.successor() {
            Some(next) if truncated => range = KeyRange::at_least(next),
            _ => break,
        }
    }

    assert_eq!(collected, expected);
}

#[test]
fn test_empty_range_considers_left_bound() {
    let mut slice = memory_slice();
    fill(&mut slice, 10, 3);

    let range = KeyRange::half_open(num_pk(50), num_pk(60));
    let response = stream_scan(&slice, range.clone());
    assert!(!response.truncated);
    assert_eq!(response.last_considered_key, range.left);
    assert!(stream_items(response).is_empty());
}
