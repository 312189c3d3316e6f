use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Active set of the sweep, ordered by primary-axis position with the item id as tie-break.
#[derive(Debug, Default)]
pub(super) struct ScanLine {
    set: BTreeSet<Entry>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    position: f64,
    id: usize,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position
            .total_cmp(&other.position)
            .then(self.id.cmp(&other.id))
    }
}

impl ScanLine {
    pub(super) fn insert(&mut self, position: f64, id: usize) {
        self.set.insert(Entry { position, id });
    }

    pub(super) fn remove(&mut self, position: f64, id: usize) -> bool {
        self.set.remove(&Entry { position, id })
    }

    pub(super) fn len(&self) -> usize {
        self.set.len()
    }

    /// Next entry to the left of `(position, id)`, as `(position, id)`.
    pub(super) fn next_left(&self, position: f64, id: usize) -> Option<(f64, usize)> {
        self.set
            .range(..Entry { position, id })
            .next_back()
            .map(|e| (e.position, e.id))
    }

    pub(super) fn next_right(&self, position: f64, id: usize) -> Option<(f64, usize)> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.set
            .range((Excluded(Entry { position, id }), Unbounded))
            .next()
            .map(|e| (e.position, e.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum EventKind {
    Close,
    Open,
    /// Close of an item with no perpendicular extent; sorts after opens at the same coordinate
    /// so that the item is opened first.
    CloseDegenerate,
}

#[derive(Debug, Clone, Copy)]
pub(super) struct Event {
    pub(super) coord: f64,
    pub(super) kind: EventKind,
    pub(super) item: usize,
}

impl Event {
    pub(super) fn is_open(&self) -> bool {
        self.kind == EventKind::Open
    }
}

pub(super) fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.coord
            .total_cmp(&b.coord)
            .then(a.kind.cmp(&b.kind))
            .then(a.item.cmp(&b.item))
    });
}
