//! Array Change Records
//!
//! Every mutation of an observable array is reported as an ordered list of
//! [`ChangeRecord`]s computed by diffing the array before and after the
//! mutation.
//!
//! # Record Semantics
//!
//! - A `Deleted` record's index refers to the array *before* the mutation.
//! - An `Added` record's index refers to the array *after* the mutation.
//! - All deletions come before all additions of the same run of edits, so
//!   replaying deletions (by pre-index) and then additions (by post-index)
//!   rebuilds the new array exactly. See [`replay`].
//!
//! # Algorithm
//!
//! Common prefix and suffix are stripped first, which makes `push`, `pop`,
//! `shift`, `unshift` and small splices O(n). The remaining window is diffed
//! with a longest-common-subsequence table. Windows whose table would exceed
//! [`MAX_LCS_CELLS`] are reported as delete-all then add-all, which is still a
//! valid (if not minimal) edit script.

use serde::Serialize;
use smallvec::SmallVec;
use tracing::trace;

use crate::value::Value;

/// Largest LCS table the diff will allocate.
pub const MAX_LCS_CELLS: usize = 4_000_000;

/// Whether an element was added or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Deleted,
}

/// One granular array edit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub status: ChangeStatus,
    pub value: Value,
    pub index: usize,
}

impl ChangeRecord {
    pub fn added(value: Value, index: usize) -> Self {
        Self { status: ChangeStatus::Added, value, index }
    }

    pub fn deleted(value: Value, index: usize) -> Self {
        Self { status: ChangeStatus::Deleted, value, index }
    }
}

/// Records produced by one mutation. Most mutations touch a handful of
/// elements, so they stay inline.
pub type ChangeSet = SmallVec<[ChangeRecord; 4]>;

/// Compute the edit script turning `old` into `new`.
pub fn compare(old: &[Value], new: &[Value]) -> ChangeSet {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let old_rest = &old[prefix..];
    let new_rest = &new[prefix..];
    let suffix = old_rest
        .iter()
        .rev()
        .zip(new_rest.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old_rest[..old_rest.len() - suffix];
    let new_mid = &new_rest[..new_rest.len() - suffix];

    let mut changes = ChangeSet::new();
    if old_mid.is_empty() && new_mid.is_empty() {
        return changes;
    }

    if old_mid.is_empty() || new_mid.is_empty() || old_mid.len() * new_mid.len() > MAX_LCS_CELLS {
        for (i, v) in old_mid.iter().enumerate() {
            changes.push(ChangeRecord::deleted(v.clone(), prefix + i));
        }
        for (j, v) in new_mid.iter().enumerate() {
            changes.push(ChangeRecord::added(v.clone(), prefix + j));
        }
    } else {
        lcs_script(old_mid, new_mid, prefix, &mut changes);
    }

    trace!(
        prefix,
        suffix,
        records = changes.len(),
        "array diff computed"
    );
    changes
}

/// Edit script of two non-empty windows via a suffix LCS table.
///
/// Runs of edits between two retained elements are emitted deletions first,
/// then additions.
fn lcs_script(old: &[Value], new: &[Value], offset: usize, out: &mut ChangeSet) {
    let (n, m) = (old.len(), new.len());
    let width = m + 1;
    // table[i * width + j] = LCS length of old[i..] and new[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if old[i] == new[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut added: SmallVec<[ChangeRecord; 4]> = SmallVec::new();
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && old[i] == new[j] {
            out.extend(added.drain(..));
            i += 1;
            j += 1;
        } else if j >= m || (i < n && table[(i + 1) * width + j] >= table[i * width + j + 1]) {
            out.push(ChangeRecord::deleted(old[i].clone(), offset + i));
            i += 1;
        } else {
            added.push(ChangeRecord::added(new[j].clone(), offset + j));
            j += 1;
        }
    }
    out.extend(added);
}

/// Apply `changes` to `old`: deletions by pre-index, then additions by
/// post-index.
pub fn replay(old: &[Value], changes: &[ChangeRecord]) -> Vec<Value> {
    let mut deleted: Vec<usize> = changes
        .iter()
        .filter(|c| c.status == ChangeStatus::Deleted)
        .map(|c| c.index)
        .collect();
    deleted.sort_unstable();

    let mut result: Vec<Value> = old
        .iter()
        .enumerate()
        .filter(|(i, _)| deleted.binary_search(i).is_err())
        .map(|(_, v)| v.clone())
        .collect();

    let mut added: Vec<&ChangeRecord> = changes
        .iter()
        .filter(|c| c.status == ChangeStatus::Added)
        .collect();
    added.sort_by_key(|c| c.index);
    for change in added {
        result.insert(change.index.min(result.len()), change.value.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(items: &[i32]) -> Vec<Value> {
        items.iter().map(|&n| Value::from(n)).collect()
    }

    #[test]
    fn identical_arrays_have_no_changes() {
        assert!(compare(&nums(&[1, 2, 3]), &nums(&[1, 2, 3])).is_empty());
    }

    #[test]
    fn replacement_is_delete_then_add() {
        let changes = compare(&nums(&[1, 2, 3]), &nums(&[1, 4, 3]));
        assert_eq!(
            changes.as_slice(),
            &[
                ChangeRecord::deleted(Value::from(2), 1),
                ChangeRecord::added(Value::from(4), 1),
            ]
        );
    }

    #[test]
    fn push_is_a_single_addition() {
        let changes = compare(&nums(&[1, 2]), &nums(&[1, 2, 3]));
        assert_eq!(changes.as_slice(), &[ChangeRecord::added(Value::from(3), 2)]);
    }

    #[test]
    fn shift_is_a_single_deletion() {
        let changes = compare(&nums(&[1, 2, 3]), &nums(&[2, 3]));
        assert_eq!(changes.as_slice(), &[ChangeRecord::deleted(Value::from(1), 0)]);
    }

    #[test]
    fn reverse_replays_exactly() {
        let old = nums(&[1, 2, 3, 4, 5]);
        let new = nums(&[5, 4, 3, 2, 1]);
        let changes = compare(&old, &new);
        assert_eq!(replay(&old, &changes), new);
    }

    #[test]
    fn interleaved_edits_replay_exactly() {
        let old = nums(&[1, 2, 3, 4, 5, 6]);
        let new = nums(&[0, 2, 7, 4, 6, 8]);
        let changes = compare(&old, &new);
        assert_eq!(replay(&old, &changes), new);
    }

    #[test]
    fn records_serialize_with_lowercase_status() {
        let json = serde_json::to_value(ChangeRecord::added(Value::from(4), 1)).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "added", "value": 4, "index": 1 }));
    }
}
