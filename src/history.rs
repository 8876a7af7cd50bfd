//! Snapshot based undo/redo

use std::collections::VecDeque;

use crate::timeline::Timeline;

/// Undoable steps kept by default
pub const DEFAULT_CAPACITY: usize = 50;

/// A bounded list of timeline snapshots plus a cursor.
///
/// The snapshot at the cursor is the live state. Besides `capacity` undoable
/// steps the state before the oldest of them is kept, so every retained step
/// can be undone. Snapshots are cheap: [`Timeline`] shares tracks by `Arc`.
#[derive(Clone, Debug)]
pub struct History {
    snapshots: VecDeque<Timeline>,
    cursor: usize,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize, baseline: Timeline) -> Self {
        let capacity = capacity.max(1);
        let mut snapshots = VecDeque::with_capacity(capacity + 1);
        snapshots.push_back(baseline);
        Self { snapshots, cursor: 0, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored snapshots (baseline included)
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Record a new state, discarding the redo branch and the oldest step on overflow
    pub fn push(&mut self, snapshot: Timeline) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.capacity + 1 {
            self.snapshots.pop_front();
        }
        self.cursor = self.snapshots.len() - 1;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    /// Step back; `None` at the oldest snapshot
    pub fn undo(&mut self) -> Option<&Timeline> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.snapshots.get(self.cursor)
    }

    /// Step forward; `None` at the newest snapshot
    pub fn redo(&mut self) -> Option<&Timeline> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.snapshots.get(self.cursor)
    }

    pub fn current(&self) -> Option<&Timeline> {
        self.snapshots.get(self.cursor)
    }

    /// Apply a derived-field update to every snapshot
    pub fn patch_all(&mut self, mut f: impl FnMut(&mut Timeline)) {
        self.snapshots.iter_mut().for_each(|snapshot| f(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Track, TrackId};

    fn with_tracks(n: u64) -> Timeline {
        let mut timeline = Timeline::new();
        for id in 0..n {
            timeline.add_track(Track::new(TrackId(id), format!("Track {id}"), "#fff"));
        }
        timeline
    }

    #[test]
    fn undo_redo_walk_the_snapshots() {
        let mut history = History::new(50, Timeline::new());
        for n in 1..=3 {
            history.push(with_tracks(n));
        }

        assert_eq!(history.undo().map(Timeline::len), Some(2));
        assert_eq!(history.undo().map(Timeline::len), Some(1));
        assert_eq!(history.redo().map(Timeline::len), Some(2));
        assert!(history.can_redo());
    }

    #[test]
    fn bounds_are_no_ops() {
        let mut history = History::new(50, Timeline::new());
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        history.push(with_tracks(1));
        assert!(history.redo().is_none());
    }

    #[test]
    fn push_discards_the_redo_branch() {
        let mut history = History::new(50, Timeline::new());
        history.push(with_tracks(1));
        history.push(with_tracks(2));
        history.undo();
        history.push(with_tracks(5));

        assert!(!history.can_redo());
        assert_eq!(history.undo().map(Timeline::len), Some(1));
    }

    #[test]
    fn capacity_keeps_exactly_that_many_undos() {
        let mut history = History::new(50, Timeline::new());
        for n in 1..=60 {
            history.push(with_tracks(n));
        }
        assert_eq!(history.len(), 51);

        let mut undos = 0;
        while history.undo().is_some() {
            undos += 1;
        }
        assert_eq!(undos, 50);
        assert_eq!(history.current().map(Timeline::len), Some(10));
    }
}
