//! The document's core state: root types, the block store, pending updates
//! awaiting missing dependencies, and the event registry.
//!
//! Sub-document (`subdocs`) and weak
//! reference (`linked_by`) bookkeeping are dropped here — this crate's
//! closed content model has no weak-ref variant, and nested `Doc`s
//! are represented only as an opaque `ItemContent::Doc` reference,
//! not as live child stores.

use crate::block_store::BlockStore;
use crate::doc::Options;
use crate::id_set::DeleteSet;
use crate::types::{Branch, BranchPtr, TypeRef};
use crate::update::PendingUpdate;
use crate::utils::{Observer, ObserverMut};
use std::collections::HashMap;
use std::sync::Arc;

/// Update payload handed to `observe_update_v1`/`v2` subscribers: the raw
/// encoded bytes of everything a just-committed transaction produced.
pub struct UpdateEvent {
    pub update: Vec<u8>,
}

pub struct Store {
    pub(crate) options: Options,

    /// Root (top-level) types, looked up by the name they were created
    /// under.
    pub(crate) types: HashMap<Arc<str>, Box<Branch>>,

    pub(crate) blocks: BlockStore,

    /// Union of every deletion this replica has ever learned about, local
    /// or remote. Individual items also carry their own
    /// tombstone flag; this is the form that gets encoded onto the wire.
    pub(crate) delete_set: DeleteSet,

    /// Update bytes that couldn't be integrated yet because they depend on
    /// content this store hasn't seen.
    pub(crate) pending: Option<PendingUpdate>,
    pub(crate) pending_ds: Option<DeleteSet>,

    pub(crate) events: Option<Box<StoreEvents>>,
}

impl Store {
    pub(crate) fn new(options: Options) -> Self {
        Store {
            options,
            types: HashMap::default(),
            blocks: BlockStore::default(),
            delete_set: DeleteSet::new(),
            pending: None,
            pending_ds: None,
            events: None,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Looks up an existing root type, or creates it as `kind` if absent.
    /// Errors if it already exists under an incompatible kind.
    pub fn get_or_create_type(&mut self, name: Arc<str>, kind: TypeRef) -> BranchPtr {
        let branch = self.types.entry(name.clone()).or_insert_with(|| {
            let mut b = Branch::new(kind);
            b.name = Some(name.clone());
            b
        });
        BranchPtr::from(branch.as_ref())
    }

    pub fn get_type(&self, name: &str) -> Option<BranchPtr> {
        self.types.get(name).map(|b| BranchPtr::from(b.as_ref()))
    }

    /// Folds a (typically remote) delete set into this store's own,
    /// tombstoning any items it already knows about; ranges pointing at
    /// content this store hasn't integrated yet are kept verbatim in the
    /// union so a later `get_or_create_type`/integration pass still honors
    /// them.
    pub(crate) fn merge_delete_set(&mut self, other: &DeleteSet) {
        for (client, ranges) in other.iter() {
            for r in ranges {
                self.delete_set.insert(crate::id::ID::new(*client, r.clock), r.len);
                if let Some(blocks) = self.blocks.get_client_blocks_mut_opt(client) {
                    let mut clock = r.clock;
                    let end = r.end();
                    while clock < end {
                        if let Some(idx) = blocks.split_at(clock) {
                            if let Some(item) = blocks.get_mut_at(idx).and_then(|c| c.as_item_mut()) {
                                let len = item.len as u64;
                                item.mark_as_deleted();
                                clock += len;
                                continue;
                            }
                        }
                        break;
                    }
                }
            }
        }
    }

    fn events_mut(&mut self) -> &mut StoreEvents {
        self.events.get_or_insert_with(|| Box::new(StoreEvents::default()))
    }

    pub fn observe_update_v1<F>(&mut self, f: F) -> crate::utils::Subscription
    where
        F: Fn(&crate::transaction::TransactionMut, &mut UpdateEvent) + 'static,
    {
        self.events_mut().update_v1_events.subscribe_mut(f)
    }

    pub fn observe_after_transaction<F>(&mut self, f: F) -> crate::utils::Subscription
    where
        F: Fn(&crate::transaction::TransactionMut, &mut ()) + 'static,
    {
        self.events_mut().after_transaction_events.subscribe_mut(f)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("client_id", &self.options.client_id)
            .field("root_types", &self.types.len())
            .finish()
    }
}

#[derive(Default)]
pub struct StoreEvents {
    pub(crate) update_v1_events: ObserverMut<UpdateEvent>,
    pub(crate) after_transaction_events: ObserverMut<()>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::doc::Options;

    #[test]
    fn get_or_create_type_is_idempotent() {
        let mut store = Store::new(Options::default());
        let a = store.get_or_create_type("root".into(), TypeRef::Map);
        let b = store.get_or_create_type("root".into(), TypeRef::Map);
        assert_eq!(a, b);
    }
}
