//! Property-based tests for observable arrays.
//!
//! 1. A splice on a patched array behaves exactly like a native splice:
//!    same removed elements, same resulting sequence.
//! 2. The change records of any single mutation replay the old sequence
//!    into the new one.
//! 3. Diffing arbitrary sequences yields a replayable edit script with
//!    in-range indices.

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;

use lattice_props::diff::{compare, replay};
use lattice_props::{ArrayRef, ArraySignal, ChangeRecord, ChangeStatus, Event, Payload, ReactiveCell, Value};

// ── Helpers ──────────────────────────────────────────────────────────

fn values(items: &[i32]) -> Vec<Value> {
    items.iter().map(|&n| Value::from(n)).collect()
}

/// Native splice semantics, written out independently of the crate.
fn model_splice(
    items: &mut Vec<i32>,
    start: Option<i64>,
    delete_count: Option<i64>,
    insert: &[i32],
) -> Vec<i32> {
    let len = items.len() as i64;
    let start_idx = match start {
        None => 0,
        Some(s) if s < 0 => (len + s).max(0),
        Some(s) => s.min(len),
    };
    let delete = match (start, delete_count) {
        (None, None) => 0,
        (_, None) => len - start_idx,
        (_, Some(d)) => d.max(0).min(len - start_idx),
    };
    let (s, d) = (start_idx as usize, delete as usize);
    items.splice(s..s + d, insert.iter().copied()).collect()
}

fn observed(items: &[i32]) -> (ArraySignal, Arc<Mutex<Vec<Vec<ChangeRecord>>>>) {
    let signal = ArraySignal::with_array("list", ArrayRef::from_vec(values(items)), false)
        .expect("plain array attaches");
    let batches = Arc::new(Mutex::new(Vec::new()));
    let b = batches.clone();
    signal
        .subscribe(
            Event::ArrayChange,
            Arc::new(move |p: &Payload<'_>| {
                if let Some(changes) = p.changes() {
                    b.lock().push(changes.to_vec());
                }
            }),
        )
        .expect("array cells accept arrayChange");
    (signal, batches)
}

fn arb_items() -> impl Strategy<Value = Vec<i32>> {
    // A small alphabet makes repeated elements, and so real LCS matches, likely.
    proptest::collection::vec(0i32..5, 0..=20)
}

// ═════════════════════════════════════════════════════════════════════════
// 1 + 2. Splice equivalence and replay, through the raw patched array
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn splice_matches_native(
        items in arb_items(),
        start in proptest::option::of(-25i64..25),
        delete_count in proptest::option::of(-5i64..25),
        insert in proptest::collection::vec(0i32..5, 0..=5),
    ) {
        let (signal, batches) = observed(&items);
        let raw = signal.array();

        let mut expected = items.clone();
        let expected_removed = model_splice(&mut expected, start, delete_count, &insert);

        let removed = raw.splice(start, delete_count, values(&insert)).unwrap();
        prop_assert_eq!(removed, values(&expected_removed));
        prop_assert_eq!(signal.to_vec(), values(&expected));

        let batches = batches.lock();
        prop_assert!(batches.len() <= 1);
        let changes = batches.first().cloned().unwrap_or_default();
        prop_assert_eq!(batches.is_empty(), items == expected);
        prop_assert_eq!(replay(&values(&items), &changes), values(&expected));
    }
}

proptest! {
    #[test]
    fn every_mutator_replays(items in arb_items(), op in 0u8..6, arg in 0i32..5) {
        let (signal, batches) = observed(&items);
        let raw = signal.array();
        match op {
            0 => { raw.push(Value::from(arg)).unwrap(); }
            1 => { raw.pop(); }
            2 => { raw.shift(); }
            3 => { raw.unshift(Value::from(arg)).unwrap(); }
            4 => raw.reverse(),
            _ => raw.sort(),
        }

        let after = signal.to_vec();
        let changes = batches.lock().first().cloned().unwrap_or_default();
        prop_assert_eq!(replay(&values(&items), &changes), after);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Diff properties
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn diff_is_replayable(old in arb_items(), new in arb_items()) {
        let (old, new) = (values(&old), values(&new));
        let changes = compare(&old, &new);

        prop_assert_eq!(replay(&old, &changes), new.clone());
        for change in &changes {
            match change.status {
                ChangeStatus::Deleted => {
                    prop_assert!(change.index < old.len());
                    prop_assert_eq!(&old[change.index], &change.value);
                }
                ChangeStatus::Added => {
                    prop_assert!(change.index < new.len());
                    prop_assert_eq!(&new[change.index], &change.value);
                }
            }
        }
    }

    #[test]
    fn diff_of_identical_sequences_is_empty(items in arb_items()) {
        let items = values(&items);
        prop_assert!(compare(&items, &items).is_empty());
    }
}
