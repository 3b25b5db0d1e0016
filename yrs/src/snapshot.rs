//! Point-in-time reads. A `Snapshot` pins exactly
//! what a [`Doc`] looked like at the moment it was taken — which structs
//! existed and which were already deleted — so a caller can later ask
//! `document_from_snapshot` to rebuild that exact state, even though the
//! live document has since moved on.

use crate::block_store::StateVector;
use crate::doc::{Doc, Options};
use crate::id_set::DeleteSet;
use crate::store::Store;
use crate::update::Update;
use crate::Error;

/// A snapshot of a document's structure at a point in time: how far each
/// client's history had been integrated (`state_vector`), and what had
/// already been deleted as of then (`delete_set`). Unlike GC, a snapshot
/// never discards data itself — it's a coordinate into history, not a
/// storage strategy.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Snapshot {
    pub state_vector: StateVector,
    pub delete_set: DeleteSet,
}

impl Snapshot {
    pub fn new(state_vector: StateVector, delete_set: DeleteSet) -> Self {
        Snapshot { state_vector, delete_set }
    }

    /// Captures the given store's current structure. Taking a snapshot
    /// never requires GC to be disabled — only *restoring* from one does,
    /// since GC may have since discarded the content the snapshot points at.
    pub(crate) fn from_store(store: &Store) -> Self {
        Snapshot {
            state_vector: store.blocks.state_vector(),
            delete_set: store.delete_set.clone(),
        }
    }

    /// Whether `id` was already visible (created and not yet deleted) at
    /// the time this snapshot was taken.
    pub fn is_visible(&self, id: &crate::id::ID) -> bool {
        id.clock < self.state_vector.get(&id.client) && !self.delete_set.is_deleted(id)
    }

    pub fn encode_v1(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.state_vector.encode(&mut buf);
        self.delete_set.encode(&mut buf);
        buf
    }

    pub fn decode_v1(bytes: &[u8]) -> Result<Snapshot, lib0::Error> {
        let mut cursor = lib0::decoding::Cursor::new(bytes);
        let state_vector = StateVector::decode(&mut cursor)?;
        let delete_set = DeleteSet::decode(&mut cursor)?;
        Ok(Snapshot { state_vector, delete_set })
    }
}

/// Snapshots the document as it stands right now.
pub fn snapshot(doc: &Doc) -> Snapshot {
    let txn = doc.transact();
    Snapshot::from_store(&txn.store())
}

/// Rebuilds a fresh, independent [`Doc`] containing exactly the content
/// `snap` describes: every struct with `clock < snap.state_vector[client]`,
/// re-tombstoned according to `snap.delete_set`.
///
/// Fails with [`Error::UnsupportedGc`] if `source` has garbage collection
/// enabled — a GC'd document may have already discarded content the
/// snapshot needs, and there's no way to tell the difference between "never
/// existed" and "collected" once it's gone.
pub fn document_from_snapshot(source: &Doc, snap: &Snapshot) -> Result<Doc, Error> {
    let store = source.store();
    let store = store.borrow();
    if store.options().gc {
        return Err(Error::UnsupportedGc);
    }

    let full = Update::from_store(&store);
    let mut restricted = full.until(&snap.state_vector);
    // `until` carries over the source's *current* delete set verbatim (same
    // as `diff`), which includes deletions that happened after `snap` was
    // taken. Those don't belong in a point-in-time restore — `snap`'s own
    // delete set, merged in below, is the authority on what was deleted as
    // of that point.
    restricted.delete_set = DeleteSet::new();
    drop(store);

    let restored = Doc::with_options(Options {
        gc: false,
        ..Options::default()
    });
    restored.transact_mut().apply_update(restricted);

    {
        let store = restored.store();
        let mut store = store.borrow_mut();
        store.merge_delete_set(&snap.delete_set);
    }

    Ok(restored)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::doc::Options;

    fn doc_without_gc() -> Doc {
        Doc::with_options(Options {
            gc: false,
            ..Options::default()
        })
    }

    #[test]
    fn snapshot_freezes_content_added_after_it_was_taken() {
        let doc = doc_without_gc();
        let text = doc.get_or_insert_text("t");
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "hello");
        }

        let snap = snapshot(&doc);

        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 5, " world");
        }
        assert_eq!(text.to_string(), "hello world");

        let restored = document_from_snapshot(&doc, &snap).unwrap();
        let restored_text = restored.get_or_insert_text("t");
        assert_eq!(restored_text.to_string(), "hello");
    }

    #[test]
    fn snapshot_preserves_deletions_that_happened_before_it() {
        let doc = doc_without_gc();
        let text = doc.get_or_insert_text("t");
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "hello");
            text.remove_range(&mut txn, 0, 5);
            text.insert(&mut txn, 0, "bye");
        }

        let snap = snapshot(&doc);
        let restored = document_from_snapshot(&doc, &snap).unwrap();
        let restored_text = restored.get_or_insert_text("t");
        assert_eq!(restored_text.to_string(), "bye");
    }

    #[test]
    fn restoring_from_a_gc_enabled_document_is_rejected() {
        let doc = Doc::new(); // default Options has gc: true
        let snap = snapshot(&doc);
        assert!(matches!(document_from_snapshot(&doc, &snap), Err(Error::UnsupportedGc)));
    }

    #[test]
    fn wire_roundtrip_preserves_state_vector_and_delete_set() {
        let doc = doc_without_gc();
        let text = doc.get_or_insert_text("t");
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "abc");
            text.remove_range(&mut txn, 0, 1);
        }
        let snap = snapshot(&doc);
        let bytes = snap.encode_v1();
        let decoded = Snapshot::decode_v1(&bytes).unwrap();
        assert_eq!(decoded, snap);
    }
}
