//! Item graph & content variants, plus the YATA conflict-resolution rule.
//!
//! Uses an `ItemPtr`/`Prelim` split: items are owned by the
//! [`crate::block_store::BlockStore`] in per-client, clock-sorted vectors,
//! and referenced elsewhere only through non-owning [`ItemPtr`] handles.

use crate::id::{ClientID, Clock, ID};
use crate::transaction::TransactionMut;
use crate::types::{Branch, BranchPtr, TypePtr};
use lib0::any::Any;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

pub use crate::id::ClientID as BlockClientID;

const FLAG_DELETED: u8 = 0b0001;
const FLAG_KEEP: u8 = 0b0010;
const FLAG_COUNTABLE: u8 = 0b0100;
const FLAG_MARKER: u8 = 0b1000;

/// One of the three struct kinds the store holds.
pub enum BlockCell {
    /// Carries content and linked-list pointers; may be tombstoned. Boxed so
    /// its heap address stays stable even when the owning
    /// `Vec<BlockCell>` reallocates — every long-lived `ItemPtr` elsewhere
    /// in the graph depends on that.
    Item(Box<Item>),
    /// A length-only placeholder left behind by garbage collection.
    GC(ClockRange),
    /// An on-the-wire-only gap marker; never integrated into a live store.
    Skip(ClockRange),
}

/// A bare `(id, len)` pair — what's left of a struct once its content has
/// been discarded (GC) or when it only describes a missing range (Skip).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ClockRange {
    pub id: ID,
    pub len: u32,
}

impl BlockCell {
    pub fn id(&self) -> ID {
        match self {
            BlockCell::Item(i) => i.id,
            BlockCell::GC(r) | BlockCell::Skip(r) => r.id,
        }
    }

    pub fn len(&self) -> u32 {
        match self {
            BlockCell::Item(i) => i.len,
            BlockCell::GC(r) | BlockCell::Skip(r) => r.len,
        }
    }

    pub fn clock_start(&self) -> Clock {
        self.id().clock
    }

    pub fn clock_end(&self) -> Clock {
        self.id().clock + self.len() as Clock
    }

    pub fn as_item(&self) -> Option<&Item> {
        match self {
            BlockCell::Item(i) => Some(i.as_ref()),
            _ => None,
        }
    }

    pub fn as_item_mut(&mut self) -> Option<&mut Item> {
        match self {
            BlockCell::Item(i) => Some(i.as_mut()),
            _ => None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, BlockCell::Item(i) if i.is_deleted())
    }
}

/// Non-owning, pointer-identity handle to an [`Item`] living inside the
/// block store. Valid for as long as the owning per-client `Vec<BlockCell>`
/// entry is not reallocated out from under it — splits only ever *insert*
/// after the current position, so existing
/// `ItemPtr`s remain valid across a split.
#[derive(Clone, Copy)]
pub struct ItemPtr(NonNull<Item>);

impl ItemPtr {
    pub(crate) fn new(item: &Item) -> Self {
        ItemPtr(unsafe { NonNull::new_unchecked(item as *const Item as *mut Item) })
    }

    pub fn id(&self) -> &ID {
        &self.deref().id
    }

    pub fn last_id(&self) -> ID {
        let item = self.deref();
        ID::new(item.id.client, item.id.clock + item.len as Clock - 1)
    }
}

impl Deref for ItemPtr {
    type Target = Item;
    fn deref(&self) -> &Item {
        unsafe { self.0.as_ref() }
    }
}

impl DerefMut for ItemPtr {
    fn deref_mut(&mut self) -> &mut Item {
        unsafe { self.0.as_mut() }
    }
}

impl Eq for ItemPtr {}
impl PartialEq for ItemPtr {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0.as_ptr(), other.0.as_ptr())
    }
}

impl std::hash::Hash for ItemPtr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.0.as_ptr() as usize).hash(state)
    }
}

impl std::fmt::Debug for ItemPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.deref())
    }
}

impl std::fmt::Display for ItemPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self.deref(), f)
    }
}

/// An item carrying content and linked-list neighbours.
pub struct Item {
    pub id: ID,
    pub len: u32,
    /// current left neighbour, resolved after integration
    pub left: Option<ItemPtr>,
    /// current right neighbour, resolved after integration
    pub right: Option<ItemPtr>,
    /// id of the item immediately to the left at creation time
    pub origin: Option<ID>,
    /// id of the item immediately to the right at creation time
    pub right_origin: Option<ID>,
    pub parent: TypePtr,
    pub parent_sub: Option<Arc<str>>,
    /// undo/redo bookkeeping: id of the item that redoes this one
    pub redone: Option<ID>,
    info: u8,
    pub content: ItemContent,
}

impl Item {
    pub fn new(
        id: ID,
        left: Option<ItemPtr>,
        origin: Option<ID>,
        right: Option<ItemPtr>,
        right_origin: Option<ID>,
        parent: TypePtr,
        parent_sub: Option<Arc<str>>,
        content: ItemContent,
    ) -> Self {
        let len = content.len();
        let mut info = 0u8;
        if content.is_countable() {
            info |= FLAG_COUNTABLE;
        }
        Item {
            id,
            len,
            left,
            right,
            origin,
            right_origin,
            parent,
            parent_sub,
            redone: None,
            info,
            content,
        }
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.info & FLAG_DELETED != 0
    }

    #[inline]
    pub fn is_countable(&self) -> bool {
        self.info & FLAG_COUNTABLE != 0
    }

    #[inline]
    pub fn is_keep(&self) -> bool {
        self.info & FLAG_KEEP != 0
    }

    #[inline]
    pub fn is_marker(&self) -> bool {
        self.info & FLAG_MARKER != 0
    }

    pub fn set_marker(&mut self, value: bool) {
        if value {
            self.info |= FLAG_MARKER;
        } else {
            self.info &= !FLAG_MARKER;
        }
    }

    pub fn set_keep(&mut self, value: bool) {
        if value {
            self.info |= FLAG_KEEP;
        } else {
            self.info &= !FLAG_KEEP;
        }
    }

    /// Invariant 4 (deletion idempotence): marks this item's tombstone flag.
    /// Does not touch the [`crate::id_set::DeleteSet`] — the caller (the
    /// transaction) is responsible for recording the range there too.
    pub(crate) fn mark_as_deleted(&mut self) -> bool {
        if self.is_deleted() {
            false
        } else {
            self.info |= FLAG_DELETED;
            true
        }
    }

    /// Reverses `mark_as_deleted` for content that's still physically
    /// present.
    pub(crate) fn restore(&mut self) -> bool {
        if self.is_deleted() {
            self.info &= !FLAG_DELETED;
            true
        } else {
            false
        }
    }

    pub fn last_id(&self) -> ID {
        ID::new(self.id.client, self.id.clock + self.len as Clock - 1)
    }

    /// Invariant 6 (merge safety): two adjacent same-client structs may be
    /// fused into one when content, deletion state, and linkage all line up.
    pub fn try_squash(&mut self, other: &Item) -> bool {
        if self.id.client == other.id.client
            && self.id.clock + self.len as Clock == other.id.clock
            && self.is_deleted() == other.is_deleted()
            && self.parent == other.parent
            && self.parent_sub == other.parent_sub
            && self.content.merge_with(&other.content)
        {
            self.len += other.len;
            true
        } else {
            false
        }
    }

    /// Splits this item at `offset` (0 < offset < len), mutating `self` into
    /// the left half and returning the new right half. Both halves keep the
    /// invariants: the right half inherits `right`,
    /// `right_origin`, `parent`, `parent_sub`, deletion state, and an
    /// appropriately shifted `redone`, while its `origin` becomes the left
    /// half's new last id.
    pub fn split(&mut self, offset: u32) -> Item {
        debug_assert!(offset > 0 && offset < self.len);
        let right_content = self.content.split(offset);
        let right_id = ID::new(self.id.client, self.id.clock + offset as Clock);
        let mut right = Item::new(
            right_id,
            None,
            Some(self.last_id()),
            self.right,
            self.right_origin,
            self.parent.clone(),
            self.parent_sub.clone(),
            right_content,
        );
        right.redone = self.redone.map(|id| ID::new(id.client, id.clock + offset as Clock));
        if self.is_deleted() {
            right.info |= FLAG_DELETED;
        }
        self.len = offset;
        self.right_origin = Some(right_id);
        right
    }

    /// Length contribution toward `parent._length`:
    /// zero for non-countable or tombstoned items.
    pub fn content_len(&self) -> u32 {
        if self.is_countable() && !self.is_deleted() {
            self.len
        } else {
            0
        }
    }

    /// Links `self` into the document following the YATA rule. `offset`
    /// shifts a received item whose prefix is already known, trimming that
    /// prefix off before resolving neighbours.
    pub fn integrate(mut this: ItemPtr, txn: &mut TransactionMut, offset: u32) {
        if offset > 0 {
            this.id.clock += offset as Clock;
            let left_id = ID::new(this.id.client, this.id.clock - 1);
            this.left = txn.store().blocks.get_item(&left_id);
            this.origin = this.left.map(|l| l.last_id());
            this.content = this.content.split(offset);
            this.len -= offset;
        }

        let parent = match &this.parent {
            TypePtr::Named(name) => txn.store_mut().get_or_create_type(name.clone(), crate::types::TypeRef::Undefined),
            TypePtr::Branch(ptr) => *ptr,
            TypePtr::ID(id) => {
                let owner = txn.store().blocks.get_item(id).expect("parent must be integrated first");
                if let ItemContent::Type(branch) = &owner.content {
                    BranchPtr::from(branch.as_ref())
                } else {
                    panic!("parent id does not reference a Type item")
                }
            }
            TypePtr::Unknown => panic!("item has no parent"),
        };
        this.parent = TypePtr::Branch(parent);

        let left = this.origin.and_then(|id| txn.store().blocks.get_item_clean_end(id));
        // the boundary a known `right_origin` resolves to; used only as the
        // scan's stopping point below, never as the scan's starting point.
        let right = this
            .right_origin
            .and_then(|id| txn.store().blocks.get_item_clean_start(id));

        // Seed the YATA conflict-resolution scan. This is independent of
        // whether `right`/`right_origin` is known: with a resolved left
        // neighbour we continue from its right side; with none, a map-slot
        // item starts from the leftmost write still contending for that
        // key, and anything else starts from the parent's head.
        let mut o = if let Some(l) = left {
            l.right
        } else if let Some(key) = &this.parent_sub {
            let mut head = parent.map.get(key.as_ref()).copied();
            while let Some(h) = head {
                match h.left {
                    Some(hl) => head = Some(hl),
                    None => break,
                }
            }
            head
        } else {
            parent.start
        };

        // walk right over items whose origin puts them in the same gap,
        // deciding left/right placement deterministically, until we reach
        // the known right boundary (or run off the end of the list).
        let mut conflicting_left = left;
        loop {
            if o == right {
                break;
            }
            let candidate = match o {
                Some(c) => c,
                None => break,
            };
            let candidate_origin = candidate.origin;
            if candidate_origin == this.origin {
                if candidate.id.client >= this.id.client {
                    break;
                } else {
                    conflicting_left = Some(candidate);
                    o = candidate.right;
                }
            } else {
                let is_candidate_before = match (candidate_origin, this.origin) {
                    (Some(co), Some(to)) => co.client != to.client && co < to,
                    (None, Some(_)) => true,
                    _ => false,
                };
                if is_candidate_before {
                    conflicting_left = Some(candidate);
                    o = candidate.right;
                } else {
                    break;
                }
            }
        }
        let left = conflicting_left;
        let right = o;

        this.left = left;
        this.right = right;

        // link into the list
        if let Some(mut l) = left {
            l.right = Some(this);
        } else {
            let is_map_slot = this.parent_sub.is_some();
            if is_map_slot {
                // handled below, map head always points at rightmost item
            } else {
                parent.start = Some(this);
            }
        }
        if let Some(mut r) = right {
            r.left = Some(this);
        }

        let mut parent = parent;
        if let Some(key) = this.parent_sub.clone() {
            // only the item that ends up as the current rightmost write for
            // this key becomes the visible slot; a write that the scan
            // above placed to the left of a concurrent winner must not
            // override it.
            if this.right.is_none() {
                if let Some(old) = parent.map.insert(key, this) {
                    if old.id != this.id {
                        txn.delete(old);
                    }
                }
            }
        }

        if this.is_countable() && !this.is_deleted() {
            parent.block_len += this.len as u64;
            parent.content_len += this.content_len() as u64;
        }

        // the design step 6: deletion-on-parent-deleted
        let parent_deleted = parent
            .item
            .map(|owner| owner.is_deleted())
            .unwrap_or(false);
        if parent_deleted && !this.is_deleted() {
            txn.delete(this);
        }

        txn.add_changed_type(parent, this.parent_sub.clone());
    }
}

impl std::fmt::Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.id, self.len)?;
        if self.is_deleted() {
            write!(f, "(deleted)")?;
        }
        Ok(())
    }
}

/// Tag values from the content variant table.
pub mod content_tag {
    pub const DELETED: u8 = 1;
    pub const JSON: u8 = 2;
    pub const BINARY: u8 = 3;
    pub const STRING: u8 = 4;
    pub const EMBED: u8 = 5;
    pub const FORMAT: u8 = 6;
    pub const TYPE: u8 = 7;
    pub const ANY: u8 = 8;
    pub const DOC: u8 = 9;
}

/// One of the nine closed content variants. Each implements
/// `len`, `split`, `merge_with`, and participates in `Item::integrate` /
/// garbage collection.
pub enum ItemContent {
    /// Gap preserved after GC of other content; contributes length only.
    Deleted(u32),
    /// Legacy array of JSON-encoded scalars.
    Json(Vec<Arc<str>>),
    Binary(Box<[u8]>),
    /// UTF-16 code-unit string; `len` is the code-unit count.
    String(Box<str>),
    /// Single opaque rich-text embed value.
    Embed(Any),
    /// Rich-text formatting run marker; length 1, non-countable.
    Format(Arc<str>, Box<Any>),
    /// Nested shared-type instance; the item owns it.
    Type(Box<Branch>),
    /// Array of binary-encoded arbitrary values.
    Any(Vec<Any>),
    /// Sub-document reference: guid + load options.
    Doc(Arc<str>, Any),
}

impl ItemContent {
    pub fn tag(&self) -> u8 {
        match self {
            ItemContent::Deleted(_) => content_tag::DELETED,
            ItemContent::Json(_) => content_tag::JSON,
            ItemContent::Binary(_) => content_tag::BINARY,
            ItemContent::String(_) => content_tag::STRING,
            ItemContent::Embed(_) => content_tag::EMBED,
            ItemContent::Format(_, _) => content_tag::FORMAT,
            ItemContent::Type(_) => content_tag::TYPE,
            ItemContent::Any(_) => content_tag::ANY,
            ItemContent::Doc(_, _) => content_tag::DOC,
        }
    }

    pub fn len(&self) -> u32 {
        match self {
            ItemContent::Deleted(len) => *len,
            ItemContent::Json(items) => items.len() as u32,
            ItemContent::Binary(_) => 1,
            ItemContent::String(s) => s.encode_utf16().count() as u32,
            ItemContent::Embed(_) => 1,
            ItemContent::Format(_, _) => 1,
            ItemContent::Type(_) => 1,
            ItemContent::Any(items) => items.len() as u32,
            ItemContent::Doc(_, _) => 1,
        }
    }

    /// Non-countable content (Format, Deleted) never contributes to
    /// `parent._length`.
    pub fn is_countable(&self) -> bool {
        !matches!(self, ItemContent::Format(_, _) | ItemContent::Deleted(_))
    }

    /// Splits at a content-local `offset`, mutating `self` into the left
    /// part and returning the right part.
    pub fn split(&mut self, offset: u32) -> ItemContent {
        match self {
            ItemContent::Deleted(len) => {
                let right = *len - offset;
                *len = offset;
                ItemContent::Deleted(right)
            }
            ItemContent::String(s) => {
                let units: Vec<u16> = s.encode_utf16().collect();
                let (left, right) = units.split_at(offset as usize);
                let left_str = decode_utf16_lossy(left);
                let right_str = decode_utf16_lossy(right);
                *s = left_str.into_boxed_str();
                ItemContent::String(right_str.into_boxed_str())
            }
            ItemContent::Json(items) => {
                let right = items.split_off(offset as usize);
                ItemContent::Json(right)
            }
            ItemContent::Any(items) => {
                let right = items.split_off(offset as usize);
                ItemContent::Any(right)
            }
            // Binary/Embed/Format/Type/Doc all have length 1 and are never split.
            _ => panic!("attempted to split an unsplittable item content"),
        }
    }

    /// Invariant 6 helper: attempts to fuse `other` onto the end of `self`.
    pub fn merge_with(&mut self, other: &ItemContent) -> bool {
        match (self, other) {
            (ItemContent::String(a), ItemContent::String(b)) => {
                let mut s = a.to_string();
                s.push_str(b);
                *a = s.into_boxed_str();
                true
            }
            (ItemContent::Deleted(a), ItemContent::Deleted(b)) => {
                *a += *b;
                true
            }
            (ItemContent::Json(a), ItemContent::Json(b)) => {
                a.extend_from_slice(b);
                true
            }
            (ItemContent::Any(a), ItemContent::Any(b)) => {
                a.extend_from_slice(b);
                true
            }
            _ => false,
        }
    }

    /// Materializes this content as the values a reader of a sequence type
    /// would see.
    pub fn get_content(&self) -> Vec<crate::types::Value> {
        match self {
            ItemContent::String(s) => s.chars().map(|c| c.to_string().into()).collect(),
            ItemContent::Any(items) => items.iter().cloned().map(crate::types::Value::Any).collect(),
            ItemContent::Json(items) => items
                .iter()
                .map(|s| crate::types::Value::Any(Any::String(s.clone())))
                .collect(),
            ItemContent::Embed(any) => vec![crate::types::Value::Any(any.clone())],
            ItemContent::Binary(b) => vec![crate::types::Value::Any(Any::Buffer(b.clone().into()))],
            ItemContent::Type(branch) => vec![BranchPtr::from(branch.as_ref()).into()],
            ItemContent::Doc(_, any) => vec![crate::types::Value::Any(any.clone())],
            ItemContent::Format(_, _) | ItemContent::Deleted(_) => Vec::new(),
        }
    }

    /// Returns the last (most recently visible) scalar value — used by map
    /// semantics where only the tip of a key's history is observable.
    pub fn get_last(&self) -> Option<crate::types::Value> {
        self.get_content().into_iter().last()
    }
}

fn decode_utf16_lossy(units: &[u16]) -> String {
    char::decode_utf16(units.iter().copied())
        .map(|r| r.unwrap_or(std::char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Values that can be inserted into a shared sequence/map and converted into
/// item content on first integration (a `Prelim`
/// pattern referenced from `types/mod.rs`).
pub trait Prelim {
    fn into_content(self) -> ItemContent;
}

impl Prelim for Any {
    fn into_content(self) -> ItemContent {
        ItemContent::Any(vec![self])
    }
}

impl Prelim for String {
    fn into_content(self) -> ItemContent {
        ItemContent::String(self.into_boxed_str())
    }
}

impl<'a> Prelim for &'a str {
    fn into_content(self) -> ItemContent {
        ItemContent::String(self.into())
    }
}

/// Describes where a new item should be linked: the left/right neighbours
/// established by the caller (e.g. `Branch::insert_at`) before the YATA
/// integration pass in [`Item::integrate`] runs.
pub struct ItemPosition {
    pub parent: TypePtr,
    pub left: Option<ItemPtr>,
    pub right: Option<ItemPtr>,
    pub parent_sub: Option<Arc<str>>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn string_item(id: ID, s: &str) -> Item {
        Item::new(id, None, None, None, None, TypePtr::Unknown, None, ItemContent::String(s.into()))
    }

    #[test]
    fn split_preserves_total_length() {
        let mut item = string_item(ID::new(1, 0), "hello world");
        let original_len = item.len;
        let right = item.split(5);
        assert_eq!(item.len + right.len, original_len);
        if let ItemContent::String(s) = &item.content {
            assert_eq!(s.as_ref(), "hello");
        } else {
            panic!("expected string content");
        }
        if let ItemContent::String(s) = &right.content {
            assert_eq!(s.as_ref(), " world");
        } else {
            panic!("expected string content");
        }
    }

    #[test]
    fn split_across_surrogate_pair_yields_replacement_char() {
        // U+1F600 is encoded as a surrogate pair in UTF-16; splitting between
        // the two halves must not panic and must replace both halves with
        // U+FFFD.
        let mut item = string_item(ID::new(1, 0), "\u{1F600}");
        let right = item.split(1);
        if let ItemContent::String(s) = &item.content {
            assert_eq!(s.chars().next(), Some('\u{FFFD}'));
        }
        if let ItemContent::String(s) = &right.content {
            assert_eq!(s.chars().next(), Some('\u{FFFD}'));
        }
    }

    #[test]
    fn deleted_content_merges_by_summing_length() {
        let mut a = ItemContent::Deleted(3);
        let b = ItemContent::Deleted(4);
        assert!(a.merge_with(&b));
        assert_eq!(a.len(), 7);
    }

    #[test]
    fn format_content_is_not_countable() {
        let content = ItemContent::Format("bold".into(), Box::new(Any::Bool(true)));
        assert!(!content.is_countable());
        assert_eq!(content.len(), 1);
    }
}
