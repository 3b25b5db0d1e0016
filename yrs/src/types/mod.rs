//! Shared-type plumbing: the `Branch` node every `Array`/`Map`/`Text`/`XmlElement`
//! wraps, plus the `Value`/`Event`/`Change` vocabulary observers see.
//!
//! Move/weak-reference machinery has no counterpart in this crate's closed,
//! nine-variant content model and is not implemented here.

pub mod array;
pub mod map;
pub mod text;
pub mod xml;

use crate::block::ItemPtr;
use crate::transaction::TransactionMut;
use crate::utils::search_marker::SearchMarkers;
use crate::utils::observer::{ObserverRef, Subscription};
use lib0::any::Any;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

/// Tag values identifying which shared-type kind a `Branch` backs — carried
/// over the wire inside `ItemContent::Type`'s encoding.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TypeRef {
    Array,
    Map,
    Text,
    XmlElement,
    XmlText,
    XmlFragment,
    Undefined,
}

/// How an item finds its parent before that parent has necessarily been
/// integrated yet.
#[derive(Clone, Eq, PartialEq)]
pub enum TypePtr {
    /// A root-level type, addressed by name within the document.
    Named(Arc<str>),
    /// An already-resolved pointer to the owning branch.
    Branch(BranchPtr),
    /// A nested type whose owning item hasn't been looked up yet.
    ID(crate::id::ID),
    Unknown,
}

/// The node backing every shared type instance: either a root type (looked
/// up by name in `Store::types`) or nested inside an `ItemContent::Type`.
pub struct Branch {
    pub type_ref: TypeRef,
    /// head of this type's item linked-list (sequence types)
    pub start: Option<ItemPtr>,
    /// last-observed-value per key (map types)
    pub map: HashMap<Arc<str>, ItemPtr>,
    /// the item that owns this branch, if it's nested rather than a root
    pub item: Option<ItemPtr>,
    /// name this branch is registered under, if it's a root type
    pub name: Option<Arc<str>>,
    /// number of countable, non-deleted units of content
    pub block_len: u64,
    pub content_len: u64,
    pub(crate) markers: SearchMarkers,
    update_observers: ObserverRef<Event>,
    deep_observers: ObserverRef<[Event]>,
}

impl Branch {
    pub fn new(type_ref: TypeRef) -> Box<Self> {
        Box::new(Branch {
            type_ref,
            start: None,
            map: HashMap::new(),
            item: None,
            name: None,
            block_len: 0,
            content_len: 0,
            markers: SearchMarkers::default(),
            update_observers: ObserverRef::default(),
            deep_observers: ObserverRef::default(),
        })
    }

    pub fn len(&self) -> u32 {
        self.block_len as u32
    }

    /// Iterates visible (non-deleted) items in list order.
    pub fn iter(&self) -> BranchIter {
        BranchIter(self.start)
    }

    /// Materializes every visible value in sequence order.
    pub fn values(&self) -> Vec<Value> {
        self.iter()
            .filter(|i| !i.is_deleted())
            .flat_map(|i| i.content.get_content())
            .collect()
    }

    /// Map read: only the most recently integrated, non-deleted value for `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let item = self.map.get(key)?;
        if item.is_deleted() {
            None
        } else {
            item.content.get_last()
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, Value)> {
        self.map.iter().filter_map(|(k, v)| {
            if v.is_deleted() {
                None
            } else {
                v.content.get_last().map(|val| (k.as_ref(), val))
            }
        })
    }

    pub fn observe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TransactionMut, &Event) + 'static,
    {
        self.update_observers.subscribe_ref(f)
    }

    pub fn observe_deep<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TransactionMut, &[Event]) + 'static,
    {
        self.deep_observers.subscribe_ref(f)
    }

    pub(crate) fn trigger(&self, txn: &TransactionMut, event: &Event) {
        if let Some(callbacks) = self.update_observers.callbacks() {
            for cb in callbacks {
                (cb)(txn, event);
            }
        }
    }

    pub(crate) fn trigger_deep(&self, txn: &TransactionMut, events: &[Event]) {
        if let Some(callbacks) = self.deep_observers.callbacks() {
            for cb in callbacks {
                (cb)(txn, events);
            }
        }
    }
}

pub struct BranchIter(Option<ItemPtr>);

impl Iterator for BranchIter {
    type Item = ItemPtr;
    fn next(&mut self) -> Option<ItemPtr> {
        let current = self.0?;
        self.0 = current.right;
        Some(current)
    }
}

/// Non-owning, `Copy`able handle to a `Branch`. Shared types are always
/// accessed through this, never through `&Branch`/`&mut Branch` directly,
/// mirroring the `ItemPtr` pattern in `block.rs`.
#[derive(Clone, Copy)]
pub struct BranchPtr(NonNull<Branch>);

impl From<&Branch> for BranchPtr {
    fn from(branch: &Branch) -> Self {
        BranchPtr(unsafe { NonNull::new_unchecked(branch as *const Branch as *mut Branch) })
    }
}

impl Deref for BranchPtr {
    type Target = Branch;
    fn deref(&self) -> &Branch {
        unsafe { self.0.as_ref() }
    }
}

impl DerefMut for BranchPtr {
    fn deref_mut(&mut self) -> &mut Branch {
        unsafe { self.0.as_mut() }
    }
}

impl Eq for BranchPtr {}
impl PartialEq for BranchPtr {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0.as_ptr(), other.0.as_ptr())
    }
}

impl std::hash::Hash for BranchPtr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.0.as_ptr() as usize).hash(state)
    }
}

impl std::fmt::Debug for BranchPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Branch({:?}, len={})", self.type_ref, self.block_len)
    }
}

/// Anything that can be read back out of a shared type: either a scalar
/// `Any` or a nested shared-type handle.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Any(Any),
    YArray(BranchPtr),
    YMap(BranchPtr),
    YText(BranchPtr),
    YXmlElement(BranchPtr),
}

impl From<BranchPtr> for Value {
    fn from(branch: BranchPtr) -> Self {
        match branch.type_ref {
            TypeRef::Array => Value::YArray(branch),
            TypeRef::Map => Value::YMap(branch),
            TypeRef::Text => Value::YText(branch),
            _ => Value::YXmlElement(branch),
        }
    }
}

impl From<Any> for Value {
    fn from(any: Any) -> Self {
        Value::Any(any)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Any(Any::String(s.into()))
    }
}

pub trait ToJson {
    fn to_json(&self) -> Any;
}

impl ToJson for Value {
    fn to_json(&self) -> Any {
        match self {
            Value::Any(any) => any.clone(),
            Value::YArray(b) => Any::Array(b.values().iter().map(ToJson::to_json).collect()),
            Value::YMap(b) => Any::Map(Arc::new(
                b.entries().map(|(k, v)| (k.to_string(), v.to_json())).collect(),
            )),
            Value::YText(b) => Any::String(crate::types::text::Text::from(*b).to_string().into()),
            Value::YXmlElement(_) => Any::Undefined,
        }
    }
}

/// One observed change to a sequence-shaped type: an inserted run or a
/// deleted run, in edit order.
pub enum Change {
    Added(Vec<Value>),
    Removed(u32),
    Retain(u32),
}

/// One observed change to a key in a map-shaped type.
pub enum EntryChange {
    Inserted(Value),
    Updated(Value, Value),
    Removed(Value),
}

/// A rich-text delta entry (insert/delete/retain with optional attributes),
/// the `Text`-specific refinement of `Change`.
pub enum Delta {
    Inserted(Value, Option<HashMap<String, Any>>),
    Deleted(u32),
    Retain(u32, Option<HashMap<String, Any>>),
}

/// Emitted to `observe`/`observe_deep` subscribers after a transaction
/// commits.
pub enum Event {
    Array { target: BranchPtr, delta: Vec<Change> },
    Map { target: BranchPtr, keys: HashMap<Arc<str>, EntryChange> },
    Text { target: BranchPtr, delta: Vec<Delta> },
    Xml { target: BranchPtr, delta: Vec<Change>, keys: HashMap<Arc<str>, EntryChange> },
}

impl Event {
    pub fn target(&self) -> BranchPtr {
        match self {
            Event::Array { target, .. }
            | Event::Map { target, .. }
            | Event::Text { target, .. }
            | Event::Xml { target, .. } => *target,
        }
    }
}

/// Every concrete shared type (`Array`, `Map`, `Text`, `XmlElement`)
/// implements this to expose its backing branch generically.
pub trait SharedRef {
    fn as_ref(&self) -> BranchPtr;
}

pub trait Observable: SharedRef {
    fn observe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TransactionMut, &Event) + 'static,
    {
        SharedRef::as_ref(self).observe(f)
    }
}

pub trait DeepObservable: SharedRef {
    fn observe_deep<F>(&self, f: F) -> Subscription
    where
        F: Fn(&TransactionMut, &[Event]) + 'static,
    {
        SharedRef::as_ref(self).observe_deep(f)
    }
}

pub trait GetString {
    fn get_string(&self) -> String;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn branch_len_reflects_countable_content_only() {
        let mut branch = Branch::new(TypeRef::Array);
        branch.block_len = 3;
        assert_eq!(branch.len(), 3);
    }
}
