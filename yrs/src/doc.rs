//! The document handle applications hold: configuration, the owned
//! store, and constructors for the four root shared-type kinds.

use crate::block_store::StateVector;
use crate::store::Store;
use crate::transaction::{Transaction, TransactionMut};
use crate::types::array::Array;
use crate::types::map::Map;
use crate::types::text::Text;
use crate::types::xml::{XmlElement, XmlFragment, XmlText};
use crate::types::TypeRef;
use crate::update::Update;
use atomic_refcell::AtomicRefCell;
use lib0::encoding::Write;
use rand::Rng;
use std::sync::Arc;

/// How sequence/text indices are counted. The wire format and Yjs
/// interoperability both assume UTF-16 code units; `Bytes`/`CodePoints` are
/// offered for Rust-native callers who don't need that compatibility — see
/// the design notes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OffsetKind {
    Bytes,
    Utf16,
    Utf32,
}

impl Default for OffsetKind {
    fn default() -> Self {
        OffsetKind::Utf16
    }
}

/// Per-document configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Randomly chosen at construction; can be pinned for deterministic tests.
    pub client_id: crate::id::ClientID,
    pub guid: Arc<str>,
    pub collection_id: Option<Arc<str>>,
    /// When true, tombstoned content is discarded once no longer needed for
    /// conflict resolution; disables snapshot restore.
    pub gc: bool,
    pub offset_kind: OffsetKind,
    pub skip_gc: bool,
    pub auto_load: bool,
    pub should_load: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            client_id: rand::thread_rng().gen(),
            guid: uuid_v4(),
            collection_id: None,
            gc: true,
            offset_kind: OffsetKind::Utf16,
            skip_gc: false,
            auto_load: false,
            should_load: true,
        }
    }
}

fn uuid_v4() -> Arc<str> {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    let mut s = String::with_capacity(36);
    for (i, b) in bytes.iter().enumerate() {
        if i == 4 || i == 6 || i == 8 || i == 10 {
            s.push('-');
        }
        s.push_str(&format!("{:02x}", b));
    }
    s.into()
}

/// A single replica of a collaboratively-edited document.
pub struct Doc {
    store: Arc<AtomicRefCell<Store>>,
}

impl Doc {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_client_id(client_id: crate::id::ClientID) -> Self {
        Self::with_options(Options {
            client_id,
            ..Options::default()
        })
    }

    pub fn with_options(options: Options) -> Self {
        Doc {
            store: Arc::new(AtomicRefCell::new(Store::new(options))),
        }
    }

    pub fn client_id(&self) -> crate::id::ClientID {
        self.store.borrow().options().client_id
    }

    pub fn guid(&self) -> Arc<str> {
        self.store.borrow().options().guid.clone()
    }

    pub fn transact(&self) -> Transaction {
        Transaction::new(self.store.clone())
    }

    pub fn transact_mut(&self) -> TransactionMut {
        TransactionMut::new(self.store.clone())
    }

    pub fn get_or_insert_array(&self, name: &str) -> Array {
        let mut txn = self.transact_mut();
        let branch = txn.store_mut().get_or_create_type(name.into(), TypeRef::Array);
        Array::from(branch)
    }

    pub fn get_or_insert_map(&self, name: &str) -> Map {
        let mut txn = self.transact_mut();
        let branch = txn.store_mut().get_or_create_type(name.into(), TypeRef::Map);
        Map::from(branch)
    }

    pub fn get_or_insert_text(&self, name: &str) -> Text {
        let mut txn = self.transact_mut();
        let branch = txn.store_mut().get_or_create_type(name.into(), TypeRef::Text);
        Text::from(branch)
    }

    pub fn get_or_insert_xml_element(&self, name: &str) -> XmlElement {
        let mut txn = self.transact_mut();
        let branch = txn
            .store_mut()
            .get_or_create_type(name.into(), TypeRef::XmlElement);
        XmlElement::from(branch)
    }

    pub fn get_or_insert_xml_fragment(&self, name: &str) -> XmlFragment {
        let mut txn = self.transact_mut();
        let branch = txn
            .store_mut()
            .get_or_create_type(name.into(), TypeRef::XmlFragment);
        XmlFragment::from(branch)
    }

    pub fn get_or_insert_xml_text(&self, name: &str) -> XmlText {
        let mut txn = self.transact_mut();
        let branch = txn
            .store_mut()
            .get_or_create_type(name.into(), TypeRef::XmlText);
        XmlText::from(branch)
    }

    /// Current state vector, in its wire encoding (descending
    /// client-ID order, `varUint(n_clients) || { varUint(client), varUint(clock) }*`).
    pub fn encode_state_vector(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.transact().state_vector().encode(&mut buf);
        buf
    }

    /// The minimal update needed to bring a peer with state vector `sv` up
    /// to date with this replica:
    /// the full store contents, diffed down to what `sv` hasn't seen.
    pub fn encode_state_as_update(&self, sv: &StateVector) -> Update {
        let store = self.store.borrow();
        Update::from_store(&store).diff(sv)
    }

    pub fn encode_state_as_update_v1(&self, sv: &StateVector) -> Vec<u8> {
        self.encode_state_as_update(sv).encode_v1()
    }

    pub fn encode_state_as_update_v2(&self, sv: &StateVector) -> Vec<u8> {
        self.encode_state_as_update(sv).encode_v2()
    }

    /// Integrates a v1-encoded update. Missing
    /// dependencies are buffered internally, not surfaced as an error —
    /// decoding failures are the only fatal case here.
    pub fn apply_update_v1(&self, bytes: &[u8]) -> crate::Result<()> {
        let update = Update::decode_v1(bytes)?;
        self.transact_mut().apply_update(update);
        Ok(())
    }

    pub fn apply_update_v2(&self, bytes: &[u8]) -> crate::Result<()> {
        let update = Update::decode_v2(bytes)?;
        self.transact_mut().apply_update(update);
        Ok(())
    }

    pub(crate) fn store(&self) -> Arc<AtomicRefCell<Store>> {
        self.store.clone()
    }
}

impl Default for Doc {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Doc {
    fn clone(&self) -> Self {
        Doc { store: self.store.clone() }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::SharedRef;

    #[test]
    fn two_docs_get_distinct_random_client_ids() {
        let a = Doc::new();
        let b = Doc::new();
        assert_ne!(a.client_id(), b.client_id());
    }

    #[test]
    fn get_or_insert_is_idempotent_across_calls() {
        let doc = Doc::new();
        let a = doc.get_or_insert_array("list");
        let b = doc.get_or_insert_array("list");
        assert_eq!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn replica_catches_up_via_encode_state_as_update() {
        let a = Doc::with_client_id(1);
        let text_a = a.get_or_insert_text("t");
        {
            let mut txn = a.transact_mut();
            text_a.insert(&mut txn, 0, "hello");
        }

        let b = Doc::with_client_id(2);
        let remote_sv = StateVector::new();
        let update = a.encode_state_as_update_v1(&remote_sv);
        b.apply_update_v1(&update).unwrap();

        let text_b = b.get_or_insert_text("t");
        assert_eq!(text_b.to_string(), "hello");
        assert_eq!(a.encode_state_vector(), b.encode_state_vector());
    }
}
