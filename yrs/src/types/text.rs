//! The rich text type: a UTF-16-indexed character sequence interleaved
//! with zero-width formatting markers.

use crate::block::ItemContent;
use crate::transaction::TransactionMut;
use crate::types::{BranchPtr, DeepObservable, Delta, Observable, SharedRef, TypePtr, Value};
use lib0::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct Text(BranchPtr);

impl From<BranchPtr> for Text {
    fn from(branch: BranchPtr) -> Self {
        Text(branch)
    }
}

impl SharedRef for Text {
    fn as_ref(&self) -> BranchPtr {
        self.0
    }
}

impl Observable for Text {}
impl DeepObservable for Text {}

impl Text {
    /// Length in UTF-16 code units — the unit the index space uses
    ///.
    pub fn len(&self) -> u32 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenates every visible character run, skipping formatting
    /// markers.
    pub fn to_string(&self) -> String {
        let mut s = String::new();
        let mut cursor = self.0.start;
        while let Some(item) = cursor {
            if !item.is_deleted() {
                if let ItemContent::String(str_content) = &item.content {
                    s.push_str(str_content);
                }
            }
            cursor = item.right;
        }
        s
    }

    pub fn insert(&self, txn: &mut TransactionMut, index: u32, chunk: &str) {
        let (left, right) = txn.find_sequence_neighbors(self.0, index);
        txn.create_item(
            TypePtr::Branch(self.0),
            left,
            right,
            None,
            ItemContent::String(chunk.into()),
        );
    }

    pub fn remove_range(&self, txn: &mut TransactionMut, index: u32, len: u32) {
        txn.delete_range(self.0, index, len);
    }

    /// Applies a zero-width attribute marker over `[index, index+len)` — a
    /// pair of `Format` items bracketing the run, following the
    /// "format as boundary markers" rich-text model. The closing marker resets the key to `Any::Null`,
    /// so a reader walking the run sees the attribute active only between
    /// the two markers.
    pub fn format(&self, txn: &mut TransactionMut, index: u32, len: u32, attrs: HashMap<String, Any>) {
        if len == 0 {
            return;
        }
        for (key, value) in attrs {
            let key: Arc<str> = Arc::from(key.as_str());
            let (left, right) = txn.find_sequence_neighbors(self.0, index);
            txn.create_item(
                TypePtr::Branch(self.0),
                left,
                right,
                None,
                ItemContent::Format(key.clone(), Box::new(value)),
            );
            let (left, right) = txn.find_sequence_neighbors(self.0, index + len);
            txn.create_item(
                TypePtr::Branch(self.0),
                left,
                right,
                None,
                ItemContent::Format(key, Box::new(Any::Null)),
            );
        }
    }

    /// Applies a delta (insert/retain/delete, each optionally carrying
    /// attributes) in one pass — the editor-facing counterpart to
    /// `to_string`/`insert`/`format`.
    pub fn apply_delta(&self, txn: &mut TransactionMut, delta: Vec<Delta>) {
        let mut index = 0u32;
        for d in delta {
            match d {
                Delta::Retain(len, attrs) => {
                    if let Some(attrs) = attrs {
                        self.format(txn, index, len, attrs);
                    }
                    index += len;
                }
                Delta::Inserted(value, attrs) => {
                    let len = match &value {
                        Value::Any(Any::String(s)) => s.encode_utf16().count() as u32,
                        _ => 1,
                    };
                    match value {
                        Value::Any(Any::String(s)) => self.insert(txn, index, &s),
                        Value::Any(any) => {
                            let (left, right) = txn.find_sequence_neighbors(self.0, index);
                            txn.create_item(TypePtr::Branch(self.0), left, right, None, ItemContent::Embed(any));
                        }
                        // nested shared-type embeds aren't constructible through this surface
                        _ => continue,
                    }
                    if let Some(attrs) = attrs {
                        self.format(txn, index, len, attrs);
                    }
                    index += len;
                }
                Delta::Deleted(len) => self.remove_range(txn, index, len),
            }
        }
    }

}

#[cfg(test)]
mod test {
    use super::*;
    use crate::doc::Doc;

    #[test]
    fn insert_builds_up_a_string() {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, "hello");
        text.insert(&mut txn, 5, " world");
        assert_eq!(text.to_string(), "hello world");
    }

    #[test]
    fn remove_range_deletes_requested_span() {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, "hello world");
        text.remove_range(&mut txn, 5, 6);
        assert_eq!(text.to_string(), "hello");
    }
}
