//! Per-view dirty flags.
//!
//! Every `mark_dirty` stamps the entry with a fresh sequence number. The
//! commit coordinator captures those stamps when a pass starts and clears a
//! flag only when its stamp is unchanged, so a view edited while its own
//! commit was in flight stays dirty for the next pass.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tokio::sync::watch;

/// Sentinel id that clears every flag at once.
pub const ALL_VIEWS: &str = "all";

/// A view's dirty stamp, captured at the start of a commit pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyMark {
    pub view_id: String,
    pub mark: u64,
}

#[derive(Debug, Clone, Copy)]
struct DirtyEntry {
    dirty: bool,
    mark: u64,
}

#[derive(Default)]
struct TrackerState {
    entries: IndexMap<String, DirtyEntry>,
    dirty_count: usize,
    sequence: u64,
}

/// Shared handle to the dirty flags of every view.
#[derive(Clone)]
pub struct DirtyTracker {
    state: Rc<RefCell<TrackerState>>,
    unsaved: Rc<watch::Sender<bool>>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        let (unsaved, _) = watch::channel(false);
        Self {
            state: Rc::new(RefCell::new(TrackerState::default())),
            unsaved: Rc::new(unsaved),
        }
    }

    /// Sets or clears the flag of `view_id`.
    ///
    /// Passing [`ALL_VIEWS`] clears every flag, whatever `dirty` is.
    pub fn set_dirty(&self, view_id: &str, dirty: bool) {
        if view_id == ALL_VIEWS {
            self.clear_all();
            return;
        }

        {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            if dirty {
                state.sequence += 1;
                let mark = state.sequence;
                let entry = state
                    .entries
                    .entry(view_id.to_string())
                    .or_insert(DirtyEntry { dirty: false, mark });
                if !entry.dirty {
                    state.dirty_count += 1;
                }
                *entry = DirtyEntry { dirty: true, mark };
            } else if let Some(entry) = state.entries.get_mut(view_id) {
                if entry.dirty {
                    entry.dirty = false;
                    state.dirty_count -= 1;
                }
            }
        }
        self.publish();
    }

    pub fn mark_dirty(&self, view_id: &str) {
        self.set_dirty(view_id, true);
    }

    pub fn mark_clean(&self, view_id: &str) {
        self.set_dirty(view_id, false);
    }

    /// True iff at least one view is dirty.
    pub fn has_unsaved_changes(&self) -> bool {
        self.state.borrow().dirty_count > 0
    }

    pub fn is_dirty(&self, view_id: &str) -> bool {
        self.state
            .borrow()
            .entries
            .get(view_id)
            .map(|e| e.dirty)
            .unwrap_or(false)
    }

    /// Number of views with an entry, dirty or not.
    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dirty view ids in the order they were first marked.
    pub fn dirty_ids(&self) -> Vec<String> {
        self.state
            .borrow()
            .entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Stamps of every dirty view.
    pub fn marks(&self) -> Vec<DirtyMark> {
        self.state
            .borrow()
            .entries
            .iter()
            .filter(|(_, e)| e.dirty)
            .map(|(id, e)| DirtyMark {
                view_id: id.clone(),
                mark: e.mark,
            })
            .collect()
    }

    /// Clears the flag only if the view was not re-marked since `mark` was
    /// captured. Returns whether it cleared.
    pub fn clear_if_unchanged(&self, mark: &DirtyMark) -> bool {
        let cleared = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            match state.entries.get_mut(&mark.view_id) {
                Some(entry) if entry.dirty && entry.mark == mark.mark => {
                    entry.dirty = false;
                    state.dirty_count -= 1;
                    true
                }
                _ => false,
            }
        };
        if cleared {
            self.publish();
        }
        cleared
    }

    /// Clears every flag in `marks` that was not re-marked since. Returns
    /// how many were cleared.
    pub fn clear_marks(&self, marks: &[DirtyMark]) -> usize {
        let cleared = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            let mut cleared = 0;
            for mark in marks {
                if let Some(entry) = state.entries.get_mut(&mark.view_id) {
                    if entry.dirty && entry.mark == mark.mark {
                        entry.dirty = false;
                        cleared += 1;
                    }
                }
            }
            state.dirty_count -= cleared;
            cleared
        };
        if cleared > 0 {
            self.publish();
        }
        cleared
    }

    /// Clears every flag.
    pub fn clear_all(&self) {
        {
            let mut state = self.state.borrow_mut();
            for entry in state.entries.values_mut() {
                entry.dirty = false;
            }
            state.dirty_count = 0;
        }
        self.publish();
    }

    /// Drops the entry for `view_id` entirely.
    pub fn forget(&self, view_id: &str) {
        {
            let mut state = self.state.borrow_mut();
            if let Some(entry) = state.entries.shift_remove(view_id) {
                if entry.dirty {
                    state.dirty_count -= 1;
                }
            }
        }
        self.publish();
    }

    /// Receiver following [`has_unsaved_changes`](Self::has_unsaved_changes).
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.unsaved.subscribe()
    }

    fn publish(&self) {
        let unsaved = self.has_unsaved_changes();
        self.unsaved.send_if_modified(|current| {
            if *current != unsaved {
                *current = unsaved;
                true
            } else {
                false
            }
        });
    }
}

impl Default for DirtyTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_unsaved_changes_follows_latest_call() {
        let tracker = DirtyTracker::new();
        assert!(!tracker.has_unsaved_changes());

        tracker.set_dirty("general", true);
        assert!(tracker.has_unsaved_changes());

        tracker.set_dirty("general", false);
        assert!(!tracker.has_unsaved_changes());
    }

    #[test]
    fn test_mark_twice_counts_once() {
        let tracker = DirtyTracker::new();
        tracker.mark_dirty("a");
        tracker.mark_dirty("a");
        tracker.mark_clean("a");
        assert!(!tracker.has_unsaved_changes());
    }

    #[test]
    fn test_all_sentinel_clears_everything() {
        let tracker = DirtyTracker::new();
        tracker.mark_dirty("a");
        tracker.mark_dirty("b");
        tracker.set_dirty(ALL_VIEWS, false);
        assert!(!tracker.has_unsaved_changes());
        assert!(tracker.dirty_ids().is_empty());

        tracker.mark_dirty("c");
        tracker.set_dirty(ALL_VIEWS, true);
        assert!(!tracker.has_unsaved_changes());
        assert!(!tracker.is_dirty("c"));
    }

    #[test]
    fn test_dirty_ids_keep_first_mark_order() {
        let tracker = DirtyTracker::new();
        tracker.mark_dirty("c");
        tracker.mark_dirty("a");
        tracker.mark_dirty("b");
        tracker.mark_clean("a");
        tracker.mark_dirty("c");
        assert_eq!(tracker.dirty_ids(), vec!["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_clear_if_unchanged() {
        let tracker = DirtyTracker::new();
        tracker.mark_dirty("a");
        tracker.mark_dirty("b");
        let marks = tracker.marks();

        // "a" is edited again after the marks were captured.
        tracker.mark_dirty("a");

        assert!(!tracker.clear_if_unchanged(&marks[0]));
        assert!(tracker.clear_if_unchanged(&marks[1]));
        assert!(tracker.is_dirty("a"));
        assert!(!tracker.is_dirty("b"));
        assert!(tracker.has_unsaved_changes());
    }

    #[test]
    fn test_clear_marks_spares_remarked_views() {
        let tracker = DirtyTracker::new();
        tracker.mark_dirty("a");
        tracker.mark_dirty("b");
        let marks = tracker.marks();

        tracker.mark_dirty("b");
        tracker.mark_dirty("c");

        assert_eq!(tracker.clear_marks(&marks), 1);
        assert!(!tracker.is_dirty("a"));
        assert!(tracker.is_dirty("b"));
        assert!(tracker.is_dirty("c"));
        assert_eq!(tracker.dirty_ids(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_forget_removes_flag() {
        let tracker = DirtyTracker::new();
        tracker.mark_dirty("a");
        tracker.forget("a");
        assert!(!tracker.has_unsaved_changes());
        assert!(!tracker.is_dirty("a"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_subscribe_sees_transitions() {
        let tracker = DirtyTracker::new();
        let mut rx = tracker.subscribe();
        assert!(!*rx.borrow());

        tracker.mark_dirty("a");
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        tracker.mark_dirty("b");
        assert!(!rx.has_changed().unwrap());

        tracker.clear_all();
        assert!(!*rx.borrow_and_update());
    }
}
