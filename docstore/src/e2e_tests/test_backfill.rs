//! Test backfill replay: full copies, incremental catch-up and
//! interruption part way through.

use crate::e2e_tests::helpers::{CollectingCallback, fill, memory_slice, num_pk};
use crate::signal::Interruptor;
use crate::types::{KeyRange, Recency};

#[test]
fn test_full_backfill_reproduces_range() {
    let mut slice = memory_slice();
    let docs = fill(&mut slice, 300, 71);

    let range = KeyRange::half_open(num_pk(100), num_pk(200));
    let mut callback = CollectingCallback::default();
    slice
        .backfill(&range, Recency::DISTANT_PAST, &mut callback, &Interruptor::never())
        .expect("backfill");

    let replayed: Vec<_> = callback
        .atoms
        .iter()
        .map(|atom| (atom.key.clone(), atom.value.clone()))
        .collect();
    assert_eq!(replayed, docs[100..200].to_vec());
    assert!(callback.atoms.iter().all(|atom| range.contains_key(&atom.key)));
    assert!(callback.deletions.is_empty());
}

#[test]
fn test_backfill_since_recency() {
    let mut slice = memory_slice();
    fill(&mut slice, 200, 72);
    slice.delete(&num_pk(3), Recency::new(400)).expect("delete");
    slice.delete(&num_pk(150), Recency::new(401)).expect("delete");

    let mut callback = CollectingCallback::default();
    slice
        .backfill(
            &KeyRange::universe(),
            Recency::new(101),
            &mut callback,
            &Interruptor::never(),
        )
        .expect("backfill");

    // Documents carry recency id + 1, so ids 100 and up qualify.
    let ids: Vec<_> = callback.atoms.iter().map(|atom| atom.key.clone()).collect();
    let expected: Vec<_> = (100..200).filter(|&id| id != 150).map(num_pk).collect();
    assert_eq!(ids, expected);
    assert!(callback.atoms.iter().all(|atom| atom.recency >= Recency::new(101)));
    assert_eq!(
        callback.deletions,
        vec![(num_pk(3), Recency::new(400)), (num_pk(150), Recency::new(401))]
    );
}

#[test]
fn test_interrupt_during_backfill() {
    let mut slice = memory_slice();
    fill(&mut slice, 200, 73);

    let mut callback = CollectingCallback {
        pulse_after: Some(25),
        ..CollectingCallback::default()
    };
    let interruptor = callback.source.interruptor();
    let err = slice
        .backfill(&KeyRange::universe(), Recency::DISTANT_PAST, &mut callback, &interruptor)
        .err()
        .expect("interrupted");

    assert!(err.is_interrupted());
    assert_eq!(callback.atoms.len(), 25);
    let keys: Vec<_> = callback.atoms.iter().map(|atom| atom.key.clone()).collect();
    assert_eq!(keys, (0..25).map(num_pk).collect::<Vec<_>>());
}
