//! Search markers: a bounded ring of `(Item*, index, timestamp)` triples
//! attached to sequence/text types, used to skip re-walking the item list
//! from the head on every index-based lookup.

use crate::block::ItemPtr;
use std::cell::Cell;

const MARKER_RING_SIZE: usize = 8;
/// How many index lookups a marker may serve before it's considered stale
/// enough to be evicted in favor of a fresher one at the same slot.
const MAX_MARKER_HITS: u64 = 10_000;

struct Marker {
    ptr: ItemPtr,
    index: u64,
    /// monotonically increasing per-ring access counter, used as an LRU clock
    timestamp: Cell<u64>,
}

impl Marker {
    fn new(ptr: ItemPtr, index: u64, timestamp: u64) -> Self {
        Marker {
            ptr,
            index,
            timestamp: Cell::new(timestamp),
        }
    }
}

/// Owned by a `Branch` representing a sequence/text type. Not `Send`/`Sync`
/// by itself (it holds raw `ItemPtr`s) — consistent with the rest of the
/// item graph, which is only ever touched from behind a `TransactionMut`.
#[derive(Default)]
pub(crate) struct SearchMarkers {
    markers: Vec<Marker>,
    clock: u64,
}

impl SearchMarkers {
    /// Returns the nearest marker at-or-before `index`, refreshing its
    /// timestamp on a hit.
    pub fn find(&mut self, index: u64) -> Option<(ItemPtr, u64)> {
        let mut best: Option<usize> = None;
        let mut best_dist = u64::MAX;
        for (i, m) in self.markers.iter().enumerate() {
            let dist = if m.index <= index { index - m.index } else { continue };
            if dist < best_dist {
                best_dist = dist;
                best = Some(i);
            }
        }
        let i = best?;
        self.clock += 1;
        self.markers[i].timestamp.set(self.clock);
        let m = &self.markers[i];
        Some((m.ptr, m.index))
    }

    /// Every insertion/deletion that crosses a marker must call this so
    /// indices downstream of the edit stay correct.
    pub fn adjust(&mut self, at_index: u64, delta: i64) {
        self.markers.retain_mut(|m| {
            if m.index > at_index {
                let new_index = m.index as i64 + delta;
                if new_index < 0 {
                    return false;
                }
                m.index = new_index as u64;
            }
            true
        });
    }

    /// Invalidates markers pointing at an item that was just deleted or
    /// split out from under them.
    pub fn invalidate(&mut self, ptr: ItemPtr) {
        self.markers.retain(|m| m.ptr != ptr);
    }

    /// Records a fresh marker, overwriting the least-recently-used slot once
    /// the ring is full.
    pub fn update(&mut self, ptr: ItemPtr, index: u64) {
        self.clock += 1;
        if let Some(existing) = self.markers.iter_mut().find(|m| m.ptr == ptr) {
            existing.index = index;
            existing.timestamp.set(self.clock);
            return;
        }
        if self.markers.len() < MARKER_RING_SIZE {
            self.markers.push(Marker::new(ptr, index, self.clock));
            return;
        }
        let lru = self
            .markers
            .iter()
            .enumerate()
            .min_by_key(|(_, m)| m.timestamp.get())
            .map(|(i, _)| i)
            .unwrap();
        self.markers[lru] = Marker::new(ptr, index, self.clock);
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::{Item, ItemContent};
    use crate::id::ID;
    use crate::types::TypePtr;

    fn leaked_item(clock: u64) -> ItemPtr {
        let item = Box::new(Item::new(
            ID::new(1, clock),
            None,
            None,
            None,
            None,
            TypePtr::Unknown,
            None,
            ItemContent::String("x".into()),
        ));
        ItemPtr::new(Box::leak(item))
    }

    #[test]
    fn ring_evicts_least_recently_used_slot_once_full() {
        let mut markers = SearchMarkers::default();
        let mut ptrs = Vec::new();
        for i in 0..MARKER_RING_SIZE as u64 {
            let ptr = leaked_item(i);
            markers.update(ptr, i);
            ptrs.push(ptr);
        }
        assert_eq!(markers.len(), MARKER_RING_SIZE);
        // touch every marker except the first, then insert a fresh one
        for ptr in ptrs.iter().skip(1) {
            markers.find(markers.markers.iter().find(|m| m.ptr == *ptr).unwrap().index);
        }
        let newcomer = leaked_item(100);
        markers.update(newcomer, 100);
        assert_eq!(markers.len(), MARKER_RING_SIZE);
        assert!(markers.markers.iter().all(|m| m.ptr != ptrs[0]));
    }

    #[test]
    fn adjust_shifts_markers_after_edit_point() {
        let mut markers = SearchMarkers::default();
        let ptr = leaked_item(0);
        markers.update(ptr, 10);
        markers.adjust(5, 3);
        assert_eq!(markers.markers[0].index, 13);
    }
}
