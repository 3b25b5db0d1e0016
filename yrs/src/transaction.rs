//! The transaction/commit pipeline: `new`, `apply_delete`'s split-then-mark
//! logic, and `apply_update`'s pending/retry handling, built on this crate's
//! `ItemPtr`/`BlockStore` types and the nine-variant content model.

use crate::block::{ClockRange, Item, ItemContent, ItemPtr};
use crate::block_store::StateVector;
use crate::id::{ClientID, Clock, ID};
use crate::id_set::DeleteSet;
use crate::store::Store;
use crate::types::{BranchPtr, Change, Delta, EntryChange, Event, TypePtr, TypeRef, Value};
use crate::update::{PendingUpdate, Update, UpdateBlock};
use atomic_refcell::{AtomicRef, AtomicRefCell, AtomicRefMut};
use lib0::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Caller-supplied tag distinguishing transactions from each other (used for
/// local-vs-remote and undo-manager scoping). Opaque beyond equality.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct Origin(pub Option<Arc<[u8]>>);

/// A read-only view over the store — what `Doc::transact()` returns.
pub struct Transaction {
    store: Arc<AtomicRefCell<Store>>,
}

impl Transaction {
    pub(crate) fn new(store: Arc<AtomicRefCell<Store>>) -> Self {
        Transaction { store }
    }

    pub fn store(&self) -> AtomicRef<Store> {
        self.store.borrow()
    }

    pub fn state_vector(&self) -> StateVector {
        self.store.borrow().blocks.state_vector()
    }
}

/// A read-write transaction. All mutation happens through this; committing
/// (on `Drop`) runs the after-transaction hooks and fires update observers
///.
pub struct TransactionMut {
    store: Arc<AtomicRefCell<Store>>,
    pub origin: Origin,
    /// clocks as of transaction start, used to tell "created in this txn"
    /// items apart from pre-existing ones for merge/GC purposes
    before_state: StateVector,
    /// newly deleted ranges accumulated during this transaction
    delete_set: DeleteSet,
    /// branches touched during this transaction, for after-commit event
    /// dispatch — every distinct key/sub-slot touched, not just the first
    /// (a single transaction commonly edits more than one map key).
    changed: HashMap<BranchPtr, HashSet<Option<Arc<str>>>>,
    committed: bool,
}

impl TransactionMut {
    pub(crate) fn new(store: Arc<AtomicRefCell<Store>>) -> Self {
        let before_state = store.borrow().blocks.state_vector();
        TransactionMut {
            store,
            origin: Origin::default(),
            before_state,
            delete_set: DeleteSet::new(),
            changed: HashMap::new(),
            committed: false,
        }
    }

    pub(crate) fn with_origin(store: Arc<AtomicRefCell<Store>>, origin: Origin) -> Self {
        let mut txn = Self::new(store);
        txn.origin = origin;
        txn
    }

    pub(crate) fn store(&self) -> AtomicRef<Store> {
        self.store.borrow()
    }

    pub(crate) fn store_mut(&mut self) -> AtomicRefMut<Store> {
        self.store.borrow_mut()
    }

    pub fn state_vector(&self) -> StateVector {
        self.store.borrow().blocks.state_vector()
    }

    pub(crate) fn add_changed_type(&mut self, branch: BranchPtr, key: Option<Arc<str>>) {
        self.changed.entry(branch).or_default().insert(key);
    }

    /// State vector as of transaction start — the boundary `UndoManager`
    /// uses to tell items this transaction created apart from pre-existing
    /// ones (same test `compute_sequence_delta` uses).
    pub(crate) fn before_state(&self) -> &StateVector {
        &self.before_state
    }

    /// Ranges newly tombstoned during this transaction specifically (as
    /// opposed to `Store::delete_set`, the all-time union).
    pub(crate) fn new_deletions(&self) -> &DeleteSet {
        &self.delete_set
    }

    /// Next free local clock, used when minting ids for newly-created items.
    fn next_clock(&self, client: ClientID) -> Clock {
        self.store
            .borrow()
            .blocks
            .get_client_blocks(&client)
            .map(|b| b.next_clock())
            .unwrap_or(0)
    }

    /// Appends a locally-created item at the end of its client's block list
    /// and runs it through YATA integration.
    pub(crate) fn create_item(
        &mut self,
        parent: TypePtr,
        left: Option<ItemPtr>,
        right: Option<ItemPtr>,
        parent_sub: Option<Arc<str>>,
        content: ItemContent,
    ) -> ItemPtr {
        let client = self.store.borrow().options.client_id;
        let clock = self.next_clock(client);
        let origin = left.map(|l| l.last_id());
        let right_origin = right.map(|r| *r.id());
        let id = ID::new(client, clock);
        let boxed = Box::new(Item::new(id, left, origin, right, right_origin, parent, parent_sub, content));
        let item_ref = ItemPtr::new(boxed.as_ref());
        self.store
            .borrow_mut()
            .blocks
            .push(client, crate::block::BlockCell::Item(boxed));
        Item::integrate(item_ref, self, 0);
        item_ref
    }

    /// Marks `item` and everything it logically covers as deleted,
    /// splitting first if `item` is wider than the range actually requested
    /// — mirrors the historical `apply_delete` split-then-mark sequence.
    pub fn delete(&mut self, mut item: ItemPtr) {
        if item.mark_as_deleted() {
            self.delete_set.insert(*item.id(), item.len);
            if let TypePtr::Branch(mut parent) = item.parent.clone() {
                if item.is_countable() {
                    parent.block_len = parent.block_len.saturating_sub(item.len as u64);
                    parent.content_len = parent.content_len.saturating_sub(item.content_len() as u64);
                }
                self.add_changed_type(parent, item.parent_sub.clone());
            }
        }
    }

    /// Reverses `delete`: un-tombstones `item`, restoring its contribution
    /// to its parent's length counters.
    /// Does not attempt to relink a restored map-slot item ahead of
    /// whatever currently occupies that key.
    pub(crate) fn restore(&mut self, mut item: ItemPtr) {
        if item.restore() {
            if let TypePtr::Branch(mut parent) = item.parent.clone() {
                if item.is_countable() {
                    parent.block_len += item.len as u64;
                    parent.content_len += item.content_len() as u64;
                }
                self.add_changed_type(parent, item.parent_sub.clone());
            }
        }
    }

    /// Finds the left/right neighbours a new item inserted at sequence-local
    /// `index` within `branch` should be linked between. When `index` falls inside an existing item's span rather
    /// than on a boundary, that item is split in place first so the new
    /// item's neighbours are exact — the insert counterpart to
    /// `delete_range`'s boundary splitting. Consults `branch.markers` for a
    /// walk-skipping starting point and leaves a fresh marker behind at the
    /// boundary it lands on.
    pub(crate) fn find_sequence_neighbors(
        &mut self,
        mut branch: BranchPtr,
        index: u32,
    ) -> (Option<ItemPtr>, Option<ItemPtr>) {
        if index == 0 {
            return (None, branch.start);
        }
        let (mut pos, mut cursor) = match branch.markers.find(index as u64) {
            Some((ptr, marker_index)) => (marker_index as u32, Some(ptr)),
            None => (0u32, branch.start),
        };
        while let Some(item) = cursor {
            if item.is_deleted() || !item.is_countable() {
                cursor = item.right;
                continue;
            }
            let next = pos + item.len;
            if next == index {
                branch.markers.update(item, pos);
                return (Some(item), item.right);
            }
            if next > index {
                // index falls strictly inside this item: split at the
                // local offset so the new item lands between the halves.
                let local_offset = index - pos;
                let id = *item.id();
                let client = id.client;
                let split_clock = id.clock + local_offset as Clock;
                let mut store = self.store.borrow_mut();
                let blocks = store.blocks.get_client_blocks_mut(&client);
                blocks.split_at(split_clock);
                drop(store);
                let left = self.store.borrow().blocks.get_item(&ID::new(client, split_clock - 1));
                let right = self.store.borrow().blocks.get_item(&ID::new(client, split_clock));
                branch.markers.invalidate(item);
                if let Some(left) = left {
                    branch.markers.update(left, pos);
                }
                return (left, right);
            }
            pos = next;
            cursor = item.right;
        }
        (None, None)
    }

    /// Deletes `len` countable units starting at sequence-local `index`
    /// within `branch`, walking from the head (seeded from `branch.markers`
    /// when possible). Sequence/text wrappers call this after translating
    /// their public index into an item-graph walk. Markers pointing at a
    /// deleted item are dropped; everything downstream of the removed span
    /// is shifted back by the number of units actually taken out.
    pub fn delete_range(&mut self, mut branch: BranchPtr, index: u32, len: u32) {
        let mut remaining = len;
        let (mut pos, mut cursor) = match branch.markers.find(index as u64) {
            Some((ptr, marker_index)) if marker_index <= index as u64 => (marker_index as u32, Some(ptr)),
            _ => (0u32, branch.start),
        };
        while remaining > 0 {
            let Some(item) = cursor else { break };
            cursor = item.right;
            if item.is_deleted() || !item.is_countable() {
                continue;
            }
            let item_len = item.len;
            if pos + item_len <= index {
                pos += item_len;
                continue;
            }
            let local_start = index.saturating_sub(pos);
            let id = *item.id();
            let client = id.client;
            let item = if local_start > 0 {
                let split_clock = id.clock + local_start as Clock;
                let mut store = self.store.borrow_mut();
                let blocks = store.blocks.get_client_blocks_mut(&client);
                blocks.split_at(split_clock);
                drop(store);
                pos += local_start;
                self.store.borrow().blocks.get_item(&ID::new(client, split_clock)).unwrap()
            } else {
                item
            };
            let take = remaining.min(item.len);
            if take < item.len {
                let mut store = self.store.borrow_mut();
                let blocks = store.blocks.get_client_blocks_mut(&client);
                blocks.split_at(item.id().clock + take as Clock);
            }
            branch.markers.invalidate(item);
            self.delete(item);
            remaining -= take;
            pos += take;
        }
        let taken = len - remaining;
        if taken > 0 {
            branch.markers.adjust(index as u64, -(taken as i64));
        }
    }

    /// Applies a decoded remote update: items whose `origin`
    /// isn't yet known are buffered into `Store::pending` and retried once
    /// their dependency integrates, rather than erroring.
    pub fn apply_update(&mut self, update: Update) {
        let mut remaining = Some(update);
        loop {
            let current = remaining.take().unwrap();
            let (integrated_any, missing) = self.try_integrate(current);
            if let Some(pending) = missing {
                let mut store = self.store.borrow_mut();
                store.pending = Some(match store.pending.take() {
                    Some(existing) => existing.merge(pending),
                    None => pending,
                });
                break;
            } else if integrated_any {
                let retry = self.store.borrow_mut().pending.take();
                match retry {
                    Some(p) => remaining = Some(p.update),
                    None => break,
                }
            } else {
                break;
            }
        }
    }

    fn try_integrate(&mut self, update: Update) -> (bool, Option<PendingUpdate>) {
        let mut integrated_any = false;
        let mut missing_blocks = update.blocks;
        let mut progressed = true;
        while progressed && !missing_blocks.is_empty() {
            progressed = false;
            let mut still_missing = Vec::new();
            for block in missing_blocks.drain(..) {
                let id = block.id();
                let next_clock = self
                    .store
                    .borrow()
                    .blocks
                    .get_client_blocks(&id.client)
                    .map(|b| b.next_clock())
                    .unwrap_or(0);
                match block {
                    UpdateBlock::Skip { id, len } => {
                        // a gap bridge: if we already have that range, it's
                        // moot; otherwise this update can't advance past it
                        // until something else fills it in.
                        if next_clock >= id.clock + len as Clock {
                            progressed = true;
                        } else {
                            still_missing.push(UpdateBlock::Skip { id, len });
                        }
                    }
                    UpdateBlock::GC { id, len } => {
                        if next_clock >= id.clock {
                            self.store
                                .borrow_mut()
                                .blocks
                                .push(id.client, crate::block::BlockCell::GC(ClockRange { id, len }));
                            integrated_any = true;
                            progressed = true;
                        } else {
                            still_missing.push(UpdateBlock::GC { id, len });
                        }
                    }
                    UpdateBlock::Item(rec) => {
                        let have_dependency = rec
                            .origin
                            .map(|oid| self.store.borrow().blocks.get_item(&oid).is_some())
                            .unwrap_or(true)
                            && next_clock >= rec.id.clock;
                        if have_dependency {
                            let client = rec.id.client;
                            let boxed = Box::new(Item::new(
                                rec.id,
                                None,
                                rec.origin,
                                None,
                                rec.right_origin,
                                rec.parent,
                                rec.parent_sub,
                                rec.content,
                            ));
                            let item_ref = ItemPtr::new(boxed.as_ref());
                            self.store
                                .borrow_mut()
                                .blocks
                                .push(client, crate::block::BlockCell::Item(boxed));
                            Item::integrate(item_ref, self, 0);
                            integrated_any = true;
                            progressed = true;
                        } else {
                            still_missing.push(UpdateBlock::Item(rec));
                        }
                    }
                }
            }
            missing_blocks = still_missing;
        }
        self.store.borrow_mut().merge_delete_set(&update.delete_set);
        if missing_blocks.is_empty() {
            (integrated_any, None)
        } else {
            (
                integrated_any,
                Some(PendingUpdate {
                    update: Update {
                        blocks: missing_blocks,
                        delete_set: update.delete_set,
                    },
                    missing_state: self.store.borrow().blocks.state_vector(),
                }),
            )
        }
    }

    /// Builds the sequence delta shared by `Array`/`Xml` children: a forward
    /// walk classifying each item as newly inserted this transaction, newly
    /// deleted this transaction, or untouched, coalescing consecutive items
    /// of the same kind into one run.
    fn compute_sequence_delta(&self, branch: BranchPtr) -> Vec<Change> {
        let mut changes = Vec::new();
        let mut retain_run = 0u32;
        let mut cursor = branch.start;
        while let Some(item) = cursor {
            cursor = item.right;
            if !item.is_countable() {
                continue;
            }
            let created_here = item.id.clock >= self.before_state.get(&item.id.client);
            let deleted_here = item.is_deleted() && self.delete_set.is_deleted(item.id());
            if created_here && !item.is_deleted() {
                if retain_run > 0 {
                    changes.push(Change::Retain(retain_run));
                    retain_run = 0;
                }
                let values = item.content.get_content();
                match changes.last_mut() {
                    Some(Change::Added(v)) => v.extend(values),
                    _ => changes.push(Change::Added(values)),
                }
            } else if deleted_here {
                if retain_run > 0 {
                    changes.push(Change::Retain(retain_run));
                    retain_run = 0;
                }
                match changes.last_mut() {
                    Some(Change::Removed(n)) => *n += item.len,
                    _ => changes.push(Change::Removed(item.len)),
                }
            } else if !item.is_deleted() {
                retain_run += item.len;
            }
            // already-tombstoned-before-this-txn items stay invisible
        }
        if retain_run > 0 {
            changes.push(Change::Retain(retain_run));
        }
        changes
    }

    /// `Text`'s refinement of `compute_sequence_delta`: format markers carry
    /// no length and are reported separately, not yet part of
    /// this delta.
    fn compute_text_delta(&self, branch: BranchPtr) -> Vec<Delta> {
        let mut result = Vec::new();
        let mut retain_run = 0u32;
        let mut cursor = branch.start;
        while let Some(item) = cursor {
            cursor = item.right;
            if !item.is_countable() {
                continue;
            }
            let created_here = item.id.clock >= self.before_state.get(&item.id.client);
            let deleted_here = item.is_deleted() && self.delete_set.is_deleted(item.id());
            if created_here && !item.is_deleted() {
                if retain_run > 0 {
                    result.push(Delta::Retain(retain_run, None));
                    retain_run = 0;
                }
                let value = item.content.get_last().unwrap_or(Value::Any(Any::Undefined));
                result.push(Delta::Inserted(value, None));
            } else if deleted_here {
                if retain_run > 0 {
                    result.push(Delta::Retain(retain_run, None));
                    retain_run = 0;
                }
                match result.last_mut() {
                    Some(Delta::Deleted(n)) => *n += item.len,
                    _ => result.push(Delta::Deleted(item.len)),
                }
            } else if !item.is_deleted() {
                retain_run += item.len;
            }
        }
        if retain_run > 0 {
            result.push(Delta::Retain(retain_run, None));
        }
        result
    }

    /// Map/Xml-attribute key changes: classifies each touched key by
    /// comparing against the item it displaced.
    fn compute_key_changes(&self, branch: BranchPtr, keys: &HashSet<Option<Arc<str>>>) -> HashMap<Arc<str>, EntryChange> {
        let mut out = HashMap::new();
        for key in keys.iter().flatten() {
            let Some(item) = branch.map.get(key.as_ref()).copied() else { continue };
            if item.is_deleted() {
                let old_value = item.content.get_last().unwrap_or(Value::Any(Any::Undefined));
                out.insert(key.clone(), EntryChange::Removed(old_value));
            } else if item.id.clock >= self.before_state.get(&item.id.client) {
                let new_value = item.content.get_last().unwrap_or(Value::Any(Any::Undefined));
                let change = match item.right {
                    Some(old) if old.is_deleted() && old.parent_sub.as_deref() == Some(key.as_ref()) => {
                        let old_value = old.content.get_last().unwrap_or(Value::Any(Any::Undefined));
                        EntryChange::Updated(old_value, new_value)
                    }
                    _ => EntryChange::Inserted(new_value),
                };
                out.insert(key.clone(), change);
            }
        }
        out
    }

    fn fire_events(&mut self) {
        let changed: Vec<_> = self.changed.drain().collect();
        for (branch, keys) in changed {
            let event = match branch.type_ref {
                TypeRef::Map => Event::Map { target: branch, keys: self.compute_key_changes(branch, &keys) },
                TypeRef::Text => Event::Text { target: branch, delta: self.compute_text_delta(branch) },
                TypeRef::XmlElement | TypeRef::XmlFragment => Event::Xml {
                    target: branch,
                    delta: self.compute_sequence_delta(branch),
                    keys: self.compute_key_changes(branch, &keys),
                },
                TypeRef::XmlText => Event::Text { target: branch, delta: self.compute_text_delta(branch) },
                TypeRef::Array | TypeRef::Undefined => {
                    Event::Array { target: branch, delta: self.compute_sequence_delta(branch) }
                }
            };
            branch.trigger(self, &event);
        }

        let callbacks = self
            .store
            .borrow()
            .events
            .as_ref()
            .and_then(|e| e.after_transaction_events.callbacks());
        if let Some(callbacks) = callbacks {
            for cb in callbacks {
                (cb)(self, &mut ());
            }
        }
    }

    pub fn commit(mut self) {
        self.committed = true;
        self.fire_events();
    }
}

impl Drop for TransactionMut {
    fn drop(&mut self) {
        if !self.committed {
            self.fire_events();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::doc::Doc;

    #[test]
    fn deleting_an_item_is_idempotent() {
        let doc = Doc::new();
        let array = doc.get_or_insert_array("a");
        let mut txn = doc.transact_mut();
        array.insert(&mut txn, 0, lib0::any::Any::from(1i32));
        let item = array.as_ref().start.unwrap();
        txn.delete(item);
        let was_already_deleted = !item.mark_as_deleted();
        assert!(was_already_deleted);
    }
}
