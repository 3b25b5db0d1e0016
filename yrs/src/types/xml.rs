//! XML tree types: element/fragment nodes with ordered children
//! (sequence-shaped) and attributes (map-shaped), built out of the same item
//! graph as `Array`/`Map`. `XmlText` reuses the `Text` rich-text model for text nodes inside
//! the tree; `XmlHook` is a map-only node carrying no children, matching the
//! placement of these as thin `Branch` wrappers rather than a
//! distinct wire format.

use crate::block::{ItemContent, Prelim};
use crate::transaction::TransactionMut;
use crate::types::{BranchPtr, DeepObservable, Delta, Observable, SharedRef, TypePtr, Value};
use lib0::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct XmlElement(BranchPtr);

impl From<BranchPtr> for XmlElement {
    fn from(branch: BranchPtr) -> Self {
        XmlElement(branch)
    }
}

impl SharedRef for XmlElement {
    fn as_ref(&self) -> BranchPtr {
        self.0
    }
}

impl Observable for XmlElement {}
impl DeepObservable for XmlElement {}

impl XmlElement {
    pub fn tag(&self) -> Option<Arc<str>> {
        self.0.name.clone()
    }

    pub fn get_attribute(&self, name: &str) -> Option<Value> {
        self.0.get(name)
    }

    pub fn set_attribute(&self, txn: &mut TransactionMut, name: impl Into<Arc<str>>, value: Any) {
        let name = name.into();
        let left = self.0.map.get(&name).copied();
        txn.create_item(TypePtr::Branch(self.0), left, None, Some(name), value.into_content());
    }

    pub fn remove_attribute(&self, txn: &mut TransactionMut, name: &str) {
        if let Some(item) = self.0.map.get(name).copied() {
            if !item.is_deleted() {
                txn.delete(item);
            }
        }
    }

    pub fn children(&self) -> Vec<Value> {
        self.0.values()
    }

    pub fn push_child<V: Prelim>(&self, txn: &mut TransactionMut, value: V) {
        let last = self.0.iter().filter(|i| !i.is_deleted()).last();
        txn.create_item(TypePtr::Branch(self.0), last, None, None, value.into_content());
    }

    pub fn remove_range(&self, txn: &mut TransactionMut, index: u32, len: u32) {
        txn.delete_range(self.0, index, len);
    }
}

/// A root-shaped (tag-less) container for a top-level run of XML siblings
///. Children-only: attributes don't apply to a fragment.
#[derive(Clone)]
pub struct XmlFragment(BranchPtr);

impl From<BranchPtr> for XmlFragment {
    fn from(branch: BranchPtr) -> Self {
        XmlFragment(branch)
    }
}

impl SharedRef for XmlFragment {
    fn as_ref(&self) -> BranchPtr {
        self.0
    }
}

impl Observable for XmlFragment {}
impl DeepObservable for XmlFragment {}

impl XmlFragment {
    pub fn len(&self) -> u32 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self) -> Vec<Value> {
        self.0.values()
    }

    pub fn get(&self, index: u32) -> Option<Value> {
        self.0
            .iter()
            .filter(|i| !i.is_deleted())
            .flat_map(|i| i.content.get_content())
            .nth(index as usize)
    }

    pub fn insert<V: Prelim>(&self, txn: &mut TransactionMut, index: u32, value: V) {
        let (left, right) = txn.find_sequence_neighbors(self.0, index);
        txn.create_item(TypePtr::Branch(self.0), left, right, None, value.into_content());
    }

    pub fn push_child<V: Prelim>(&self, txn: &mut TransactionMut, value: V) {
        let len = self.len();
        self.insert(txn, len, value);
    }

    pub fn remove_range(&self, txn: &mut TransactionMut, index: u32, len: u32) {
        txn.delete_range(self.0, index, len);
    }
}

/// A text run living inside an XML tree — the same UTF-16-indexed character
/// sequence and format-marker model as `Text`, just parked
/// under a different `TypeRef` so `XmlElement`/`XmlFragment` children can
/// tell text nodes apart from element nodes.
#[derive(Clone)]
pub struct XmlText(BranchPtr);

impl From<BranchPtr> for XmlText {
    fn from(branch: BranchPtr) -> Self {
        XmlText(branch)
    }
}

impl SharedRef for XmlText {
    fn as_ref(&self) -> BranchPtr {
        self.0
    }
}

impl Observable for XmlText {}
impl DeepObservable for XmlText {}

impl XmlText {
    pub fn len(&self) -> u32 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

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
        txn.create_item(TypePtr::Branch(self.0), left, right, None, ItemContent::String(chunk.into()));
    }

    pub fn remove_range(&self, txn: &mut TransactionMut, index: u32, len: u32) {
        txn.delete_range(self.0, index, len);
    }

    pub fn format(&self, txn: &mut TransactionMut, index: u32, len: u32, attrs: HashMap<String, Any>) {
        if len == 0 {
            return;
        }
        for (key, value) in attrs {
            let key: Arc<str> = Arc::from(key.as_str());
            let (left, right) = txn.find_sequence_neighbors(self.0, index);
            txn.create_item(TypePtr::Branch(self.0), left, right, None, ItemContent::Format(key.clone(), Box::new(value)));
            let (left, right) = txn.find_sequence_neighbors(self.0, index + len);
            txn.create_item(TypePtr::Branch(self.0), left, right, None, ItemContent::Format(key, Box::new(Any::Null)));
        }
    }

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
                Delta::Inserted(Value::Any(Any::String(s)), attrs) => {
                    let len = s.encode_utf16().count() as u32;
                    self.insert(txn, index, &s);
                    if let Some(attrs) = attrs {
                        self.format(txn, index, len, attrs);
                    }
                    index += len;
                }
                Delta::Inserted(_, _) => continue,
                Delta::Deleted(len) => self.remove_range(txn, index, len),
            }
        }
    }
}

/// A map-only tree node carrying no children — the DOM-hook equivalent of
/// Yjs's `YXmlHook`, which is a `YMap` subtype distinguished only by the
/// node name it was constructed with.
#[derive(Clone)]
pub struct XmlHook(BranchPtr);

impl From<BranchPtr> for XmlHook {
    fn from(branch: BranchPtr) -> Self {
        XmlHook(branch)
    }
}

impl SharedRef for XmlHook {
    fn as_ref(&self) -> BranchPtr {
        self.0
    }
}

impl Observable for XmlHook {}
impl DeepObservable for XmlHook {}

impl XmlHook {
    pub fn name(&self) -> Option<Arc<str>> {
        self.0.name.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key)
    }

    pub fn insert(&self, txn: &mut TransactionMut, key: impl Into<Arc<str>>, value: Any) {
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
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::doc::Doc;

    #[test]
    fn attribute_roundtrips() {
        let doc = Doc::new();
        let el = doc.get_or_insert_xml_element("root");
        let mut txn = doc.transact_mut();
        el.set_attribute(&mut txn, "class", Any::from("bold".to_string()));
        match el.get_attribute("class") {
            Some(Value::Any(Any::String(s))) => assert_eq!(s.as_ref(), "bold"),
            _ => panic!("expected string attribute"),
        }
    }

    #[test]
    fn fragment_holds_ordered_children() {
        let doc = Doc::new();
        let frag = doc.get_or_insert_xml_fragment("frag");
        let mut txn = doc.transact_mut();
        frag.push_child(&mut txn, Any::from(1i32));
        frag.push_child(&mut txn, Any::from(2i32));
        assert_eq!(frag.len(), 2);
        assert_eq!(frag.children().len(), 2);
    }

    #[test]
    fn xml_text_inserts_and_formats_like_text() {
        let doc = Doc::new();
        let t = doc.get_or_insert_xml_text("t");
        let mut txn = doc.transact_mut();
        t.insert(&mut txn, 0, "hello");
        assert_eq!(t.to_string(), "hello");
        let mut attrs = HashMap::new();
        attrs.insert("bold".to_string(), Any::Bool(true));
        t.format(&mut txn, 0, 5, attrs);
        assert_eq!(t.to_string(), "hello");
    }

    #[test]
    fn hook_exposes_attributes_without_children() {
        let doc = Doc::new();
        let m = doc.get_or_insert_map("hook");
        let hook = XmlHook::from(m.as_ref());
        let mut txn = doc.transact_mut();
        hook.insert(&mut txn, "href", Any::from("https://example.com".to_string()));
        match hook.get("href") {
            Some(Value::Any(Any::String(s))) => assert_eq!(s.as_ref(), "https://example.com"),
            _ => panic!("expected string attribute"),
        }
    }
}
