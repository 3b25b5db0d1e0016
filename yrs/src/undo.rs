//! Multi-step undo/redo scoped to a set of shared types. Built on the same
//! after-the-fact diffing `transaction.rs` already
//! does for change events: each commit is inspected for what it inserted or
//! deleted within scope, and folded onto an undo stack; `undo`/`redo` play
//! that record back by deleting what was inserted or un-tombstoning what was
//! deleted, pushing the mirror image onto the opposite stack.

use crate::block::ItemPtr;
use crate::doc::Doc;
use crate::id::{ClientID, ID};
use crate::id_set::DeleteSet;
use crate::transaction::{Origin, TransactionMut};
use crate::types::BranchPtr;
use crate::utils::Subscription;
use lib0::any::Any;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Consecutive captures from the same scope within this many milliseconds
/// of each other are folded into a single undo step.
pub const DEFAULT_CAPTURE_TIMEOUT_MILLIS: u64 = 500;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One entry on an undo or redo stack: everything a captured transaction (or
/// run of merged transactions) inserted or deleted within the manager's
/// scope, plus caller-attached metadata.
#[derive(Debug, Clone, Default)]
pub struct StackItem {
    pub insertions: DeleteSet,
    pub deletions: DeleteSet,
    pub meta: HashMap<Arc<str>, Any>,
}

struct Shared {
    scope: Vec<BranchPtr>,
    tracked_origins: std::collections::HashSet<Origin>,
    undo_stack: Vec<StackItem>,
    redo_stack: Vec<StackItem>,
    capture_timeout_millis: u64,
    last_capture: Option<u64>,
    /// Set for the duration of `undo`/`redo`'s own transaction, so the
    /// after-transaction hook doesn't capture the manager's own replay as a
    /// fresh, independent step.
    applying: bool,
}

/// Tracks insertions/deletions made to a set of shared types and lets the
/// caller walk them back. Scope is fixed at construction;
/// `expand_scope`/`add_tracked_origin` can widen it afterwards.
pub struct UndoManager {
    doc: Doc,
    origin: Origin,
    shared: Arc<RwLock<Shared>>,
    _subscription: Subscription,
}

impl UndoManager {
    pub fn new(doc: &Doc, scope: &[BranchPtr]) -> Self {
        Self::with_capture_timeout(doc, scope, DEFAULT_CAPTURE_TIMEOUT_MILLIS)
    }

    pub fn with_capture_timeout(doc: &Doc, scope: &[BranchPtr], capture_timeout_millis: u64) -> Self {
        let shared = Arc::new(RwLock::new(Shared {
            scope: scope.to_vec(),
            tracked_origins: std::collections::HashSet::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            capture_timeout_millis,
            last_capture: None,
            applying: false,
        }));

        let observed = shared.clone();
        let subscription = {
            let store = doc.store();
            let mut store = store.borrow_mut();
            store.observe_after_transaction(move |txn, _| {
                capture(&observed, txn);
            })
        };

        let bytes: [u8; 16] = rand::thread_rng().gen();
        UndoManager {
            doc: doc.clone(),
            origin: Origin(Some(Arc::from(bytes.to_vec().into_boxed_slice()))),
            shared,
            _subscription: subscription,
        }
    }

    pub fn expand_scope(&self, branch: BranchPtr) {
        let mut shared = self.shared.write().unwrap();
        if !shared.scope.contains(&branch) {
            shared.scope.push(branch);
        }
    }

    /// Transactions carrying one of these origins are captured in addition
    /// to ones with no origin at all (which are always tracked).
    pub fn add_tracked_origin(&self, origin: Origin) {
        self.shared.write().unwrap().tracked_origins.insert(origin);
    }

    pub fn can_undo(&self) -> bool {
        !self.shared.read().unwrap().undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.shared.read().unwrap().redo_stack.is_empty()
    }

    /// Forces the next captured change onto a new stack entry instead of
    /// merging with the previous one, regardless of how recently it fired.
    pub fn stop_capturing(&self) {
        self.shared.write().unwrap().last_capture = None;
    }

    pub fn clear(&self) {
        let mut shared = self.shared.write().unwrap();
        shared.undo_stack.clear();
        shared.redo_stack.clear();
        shared.last_capture = None;
    }

    /// Reverses the most recent undo step, if any. Returns `false` if the
    /// undo stack is empty.
    pub fn undo(&self) -> bool {
        self.apply_stack_item(true)
    }

    /// Reverses the most recent `undo()` call, if any. A fresh capture
    /// clears the redo stack, matching the `capture` function below.
    pub fn redo(&self) -> bool {
        self.apply_stack_item(false)
    }

    fn apply_stack_item(&self, is_undo: bool) -> bool {
        let item = {
            let mut shared = self.shared.write().unwrap();
            let stack = if is_undo { &mut shared.undo_stack } else { &mut shared.redo_stack };
            match stack.pop() {
                Some(item) => item,
                None => return false,
            }
        };

        self.shared.write().unwrap().applying = true;

        {
            let mut txn = self.doc.transact_mut();
            txn.origin = self.origin.clone();

            for (client, ranges) in item.insertions.iter() {
                for range in ranges {
                    delete_range(&mut txn, *client, range.clock, range.len);
                }
            }
            for (client, ranges) in item.deletions.iter() {
                for range in ranges {
                    restore_range(&mut txn, *client, range.clock, range.len);
                }
            }
        }

        // The mirror image of what was just replayed: what we deleted here
        // becomes an insertion from the opposite stack's point of view, and
        // what we restored becomes a deletion.
        let opposite = StackItem {
            insertions: item.deletions,
            deletions: item.insertions,
            meta: item.meta,
        };
        {
            let mut shared = self.shared.write().unwrap();
            if is_undo {
                shared.redo_stack.push(opposite);
            } else {
                shared.undo_stack.push(opposite);
            }
            shared.applying = false;
        }
        true
    }
}

fn delete_range(txn: &mut TransactionMut, client: ClientID, clock: crate::id::Clock, len: u32) {
    let mut remaining = clock..(clock + len as crate::id::Clock);
    while remaining.start < remaining.end {
        let found = txn.store().blocks.get_item(&ID::new(client, remaining.start));
        let Some(item) = found else { break };
        let item_len = item.len as crate::id::Clock;
        if !item.is_deleted() {
            txn.delete(item);
        }
        remaining.start += item_len;
    }
}

fn restore_range(txn: &mut TransactionMut, client: ClientID, clock: crate::id::Clock, len: u32) {
    let mut remaining = clock..(clock + len as crate::id::Clock);
    while remaining.start < remaining.end {
        let found = txn.store().blocks.get_item(&ID::new(client, remaining.start));
        let Some(item) = found else { break };
        let item_len = item.len as crate::id::Clock;
        txn.restore(item);
        remaining.start += item_len;
    }
}

/// The after-transaction hook every `UndoManager` installs: looks at what
/// the just-committed transaction changed within scope and either folds it
/// into the top of the undo stack or starts a new entry.
fn capture(shared: &Arc<RwLock<Shared>>, txn: &TransactionMut) {
    let mut state = shared.write().unwrap();
    if state.applying {
        return;
    }
    let tracked = txn.origin == Origin::default() || state.tracked_origins.contains(&txn.origin);
    if !tracked {
        return;
    }

    let mut insertions = DeleteSet::new();
    let mut deletions = DeleteSet::new();
    let scope = state.scope.clone();
    for branch in scope {
        let mut cursor: Option<ItemPtr> = branch.start;
        while let Some(item) = cursor {
            let created_here = item.id.clock >= txn.before_state().get(&item.id.client);
            if created_here {
                if !item.is_deleted() {
                    insertions.insert(item.id, item.len);
                }
                // created and deleted in the same transaction nets to
                // nothing on either stack
            } else if item.is_deleted() && txn.new_deletions().is_deleted(&item.id) {
                deletions.insert(item.id, item.len);
            }
            cursor = item.right;
        }
    }

    if insertions.is_empty() && deletions.is_empty() {
        return;
    }

    let now = now_millis();
    let merge = state.last_capture.is_some_and(|t| now.saturating_sub(t) < state.capture_timeout_millis)
        && !state.undo_stack.is_empty();
    if merge {
        let top = state.undo_stack.last_mut().unwrap();
        top.insertions.merge(&insertions);
        top.deletions.merge(&deletions);
    } else {
        state.undo_stack.push(StackItem { insertions, deletions, meta: HashMap::new() });
    }
    state.last_capture = Some(now);
    state.redo_stack.clear();
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::SharedRef;

    #[test]
    fn undo_reverses_a_single_insert() {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("t");
        let mgr = UndoManager::new(&doc, &[text.as_ref()]);

        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "hello");
        }
        assert_eq!(text.to_string(), "hello");

        assert!(mgr.undo());
        assert_eq!(text.to_string(), "");
    }

    #[test]
    fn redo_replays_an_undone_insert() {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("t");
        let mgr = UndoManager::new(&doc, &[text.as_ref()]);

        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "hello");
        }
        mgr.undo();
        assert_eq!(text.to_string(), "");

        assert!(mgr.redo());
        assert_eq!(text.to_string(), "hello");
    }

    #[test]
    fn undo_restores_deleted_content() {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("t");
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "hello");
        }

        let mgr = UndoManager::new(&doc, &[text.as_ref()]);
        mgr.stop_capturing();
        {
            let mut txn = doc.transact_mut();
            text.remove_range(&mut txn, 0, 5);
        }
        assert_eq!(text.to_string(), "");

        assert!(mgr.undo());
        assert_eq!(text.to_string(), "hello");
    }

    #[test]
    fn rapid_consecutive_edits_merge_into_one_undo_step() {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("t");
        let mgr = UndoManager::new(&doc, &[text.as_ref()]);

        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "a");
        }
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 1, "b");
        }
        assert_eq!(text.to_string(), "ab");

        assert!(mgr.undo());
        assert_eq!(text.to_string(), "");
        assert!(!mgr.can_undo());
    }

    #[test]
    fn stop_capturing_forces_a_new_step() {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("t");
        let mgr = UndoManager::new(&doc, &[text.as_ref()]);

        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "a");
        }
        mgr.stop_capturing();
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 1, "b");
        }

        assert!(mgr.undo());
        assert_eq!(text.to_string(), "a");
        assert!(mgr.undo());
        assert_eq!(text.to_string(), "");
    }

    #[test]
    fn edits_outside_scope_are_not_captured() {
        let doc = Doc::new();
        let tracked = doc.get_or_insert_text("tracked");
        let untracked = doc.get_or_insert_text("untracked");
        let mgr = UndoManager::new(&doc, &[tracked.as_ref()]);

        {
            let mut txn = doc.transact_mut();
            untracked.insert(&mut txn, 0, "nope");
        }
        assert!(!mgr.can_undo());
    }
}
