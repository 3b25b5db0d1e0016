//! The last-writer-wins map type.

use crate::block::Prelim;
use crate::transaction::TransactionMut;
use crate::types::{BranchPtr, DeepObservable, Observable, SharedRef, ToJson, TypePtr, Value};
use lib0::any::Any;
use std::sync::Arc;

/// A string-keyed map where concurrent writes to the same key resolve by
/// the causal/ID-based ordering described in the design (the write that
/// integrates last — by (origin-less) arrival order, tie-broken by client
/// id — wins; no merge of values).
#[derive(Clone)]
pub struct Map(BranchPtr);

impl From<BranchPtr> for Map {
    fn from(branch: BranchPtr) -> Self {
        Map(branch)
    }
}

impl SharedRef for Map {
    fn as_ref(&self) -> BranchPtr {
        self.0
    }
}

impl Observable for Map {}
impl DeepObservable for Map {}

impl Map {
    pub fn len(&self) -> u32 {
        self.0.entries().count() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Value)> {
        self.0.entries()
    }

    /// Sets `key` to `value`. Overriding an existing slot
    /// deletes (tombstones) the item that previously occupied it rather
    /// than mutating content in place, preserving every intermediate
    /// version for YATA/GC purposes.
    pub fn insert<V: Prelim>(&self, txn: &mut TransactionMut, key: impl Into<Arc<str>>, value: V) {
        let key = key.into();
        let left = self.0.map.get(&key).copied();
        txn.create_item(TypePtr::Branch(self.0), left, None, Some(key), value.into_content());
    }

    pub fn remove(&self, txn: &mut TransactionMut, key: &str) -> bool {
        if let Some(item) = self.0.map.get(key).copied() {
            if !item.is_deleted() {
                txn.delete(item);
                return true;
            }
        }
        false
    }

    pub fn to_json(&self) -> Any {
        ToJson::to_json(&Value::YMap(self.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::doc::Doc;

    #[test]
    fn overwriting_a_key_tombstones_the_previous_value() {
        let doc = Doc::new();
        let map = doc.get_or_insert_map("m");
        let mut txn = doc.transact_mut();
        map.insert(&mut txn, "k", Any::from(1i32));
        let first = map.0.map.get("k").copied().unwrap();
        map.insert(&mut txn, "k", Any::from(2i32));
        assert!(first.is_deleted());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn remove_on_missing_key_is_a_no_op() {
        let doc = Doc::new();
        let map = doc.get_or_insert_map("m");
        let mut txn = doc.transact_mut();
        assert!(!map.remove(&mut txn, "missing"));
    }
}
