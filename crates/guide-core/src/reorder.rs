//! Reordering Persister helpers.
//!
//! The session applies the move optimistically, sends the full id sequence
//! and reloads the list from the remote store if that fails.

use crate::model::Guide;

/// Move the element at `from` to `to`. Returns false when nothing moved.
pub fn move_item<T>(list: &mut Vec<T>, from: usize, to: usize) -> bool {
    if from == to || from >= list.len() || to >= list.len() {
        return false;
    }
    let item = list.remove(from);
    list.insert(to, item);
    true
}

/// Id sequence sent to the remote store.
pub fn ordered_ids(list: &[Guide]) -> Vec<String> {
    list.iter().map(|g| g.id.clone()).collect()
}
