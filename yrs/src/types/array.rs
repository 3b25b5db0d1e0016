//! The ordered sequence type.

use crate::block::{ItemContent, Prelim};
use crate::transaction::TransactionMut;
use crate::types::{BranchPtr, DeepObservable, Observable, SharedRef, ToJson, TypePtr, Value};
use lib0::any::Any;

/// An insertion-ordered sequence of arbitrary values or nested shared types.
#[derive(Clone)]
pub struct Array(BranchPtr);

impl From<BranchPtr> for Array {
    fn from(branch: BranchPtr) -> Self {
        Array(branch)
    }
}

impl SharedRef for Array {
    fn as_ref(&self) -> BranchPtr {
        self.0
    }
}

impl Observable for Array {}
impl DeepObservable for Array {}

impl Array {
    pub fn len(&self) -> u32 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materializes every visible element in order.
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.values()
    }

    pub fn get(&self, index: u32) -> Option<Value> {
        self.0
            .iter()
            .filter(|i| !i.is_deleted())
            .flat_map(|i| i.content.get_content())
            .nth(index as usize)
    }

    /// Inserts `value` so it becomes element `index`. Walks from
    /// the head to find the left/right neighbours; production code would
    /// consult search markers first (see `utils::search_marker`) before
    /// falling back to a full walk.
    pub fn insert<V: Prelim>(&self, txn: &mut TransactionMut, index: u32, value: V) {
        let (left, right) = txn.find_sequence_neighbors(self.0, index);
        txn.create_item(
            TypePtr::Branch(self.0),
            left,
            right,
            None,
            value.into_content(),
        );
    }

    pub fn push_back<V: Prelim>(&self, txn: &mut TransactionMut, value: V) {
        let len = self.len();
        self.insert(txn, len, value);
    }

    pub fn remove(&self, txn: &mut TransactionMut, index: u32) {
        self.remove_range(txn, index, 1);
    }

    pub fn remove_range(&self, txn: &mut TransactionMut, index: u32, len: u32) {
        txn.delete_range(self.0, index, len);
    }

}

impl ToJson for Array {
    fn to_json(&self) -> Any {
        Any::Array(self.to_vec().iter().map(ToJson::to_json).collect())
    }
}

impl Prelim for Vec<Any> {
    fn into_content(self) -> ItemContent {
        ItemContent::Any(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::doc::Doc;

    #[test]
    fn insert_and_read_back_in_order() {
        let doc = Doc::new();
        let array = doc.get_or_insert_array("a");
        let mut txn = doc.transact_mut();
        array.insert(&mut txn, 0, Any::from(1i32));
        array.insert(&mut txn, 1, Any::from(2i32));
        array.insert(&mut txn, 1, Any::from(3i32));
        let values = array.to_vec();
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn remove_range_shrinks_length() {
        let doc = Doc::new();
        let array = doc.get_or_insert_array("a");
        let mut txn = doc.transact_mut();
        array.insert(&mut txn, 0, Any::from(1i32));
        array.insert(&mut txn, 1, Any::from(2i32));
        array.remove(&mut txn, 0);
        assert_eq!(array.len(), 1);
    }
}
