//! Positions that survive concurrent edits. An absolute
//! index into a sequence type shifts under remote inserts/deletes; a
//! `RelativePosition` instead glues itself to a specific unit of content by
//! `ID`, then re-derives whatever index that unit currently occupies.

use crate::block::ItemContent;
use crate::id::ID;
use crate::transaction::Transaction;
use crate::types::{BranchPtr, SharedRef};
use lib0::decoding::{Cursor, Read};
use lib0::encoding::Write;
use lib0::Error as Lib0Error;
use std::sync::Arc;

/// Which side of the glued-to unit a position sticks to when something new
/// is inserted exactly there.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Assoc {
    /// Binds to the unit at the index: text inserted at the same spot ends
    /// up to the position's right.
    Before,
    /// Binds to the unit immediately preceding the index: text inserted at
    /// the same spot ends up to the position's left.
    After,
}

impl Assoc {
    fn to_i32(self) -> i32 {
        match self {
            Assoc::Before => 0,
            Assoc::After => -1,
        }
    }

    fn from_i32(v: i32) -> Self {
        if v < 0 {
            Assoc::After
        } else {
            Assoc::Before
        }
    }
}

/// A position inside a sequence type, addressed by the `ID` of the unit of
/// content it's glued to rather than by a shifting numeric index.
///
/// `item` is `None` for a position at the very start (`Before`) or very end
/// (`After`) of the sequence, where there's no neighbouring unit to glue to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RelativePosition {
    /// `ID` of the item that owns the target branch, when it's nested
    /// rather than a root type.
    pub type_id: Option<ID>,
    /// Name the target branch was registered under, when it's a root type.
    pub root_name: Option<Arc<str>>,
    pub item: Option<ID>,
    pub assoc: i32,
}

/// The result of resolving a `RelativePosition` back against a document's
/// current state.
#[derive(Debug, Clone, Copy)]
pub struct AbsolutePosition {
    pub branch: BranchPtr,
    pub index: u32,
    pub assoc: Assoc,
}

impl RelativePosition {
    /// Builds a position glued to index `index` of `branch`'s current
    /// content, from the `assoc` side.
    pub fn from_type_index(branch: BranchPtr, index: u32, assoc: Assoc) -> Self {
        let type_id = branch.item.map(|i| i.id);
        let root_name = branch.name.clone();
        let item = match assoc {
            Assoc::Before => locate_unit(branch, index),
            Assoc::After => {
                if index == 0 {
                    None
                } else {
                    locate_unit(branch, index - 1)
                }
            }
        };
        RelativePosition { type_id, root_name, item, assoc: assoc.to_i32() }
    }

    /// Re-derives the branch and numeric index this position currently
    /// resolves to. Returns `None` if the target branch or item is no
    /// longer reachable (e.g. its root was never created on this replica,
    /// or the glued-to item was garbage collected).
    pub fn to_absolute(&self, txn: &Transaction) -> Option<AbsolutePosition> {
        let assoc = Assoc::from_i32(self.assoc);
        let store = txn.store();
        let branch = if let Some(name) = &self.root_name {
            store.get_type(name)?
        } else {
            let id = self.type_id?;
            let owner = store.blocks.get_item(&id)?;
            match &owner.content {
                ItemContent::Type(inner) => BranchPtr::from(inner.as_ref()),
                _ => return None,
            }
        };

        let index = match self.item {
            None => match assoc {
                Assoc::Before => 0,
                Assoc::After => branch.len(),
            },
            Some(id) => {
                let target = store.blocks.get_item(&id)?;
                let offset = (id.clock - target.id.clock) as u32;
                let mut pos = 0u32;
                let mut cursor = branch.start;
                let mut found = false;
                let mut idx = 0u32;
                while let Some(cur) = cursor {
                    if cur.id.client == target.id.client
                        && cur.id.clock <= id.clock
                        && id.clock < cur.id.clock + cur.len as u64
                    {
                        found = true;
                        idx = match assoc {
                            Assoc::Before if !cur.is_deleted() && cur.is_countable() => pos + offset,
                            Assoc::After if !cur.is_deleted() && cur.is_countable() => pos + offset + 1,
                            // the glued-to unit was deleted; snap to where it would have been
                            _ => pos,
                        };
                        break;
                    }
                    if !cur.is_deleted() && cur.is_countable() {
                        pos += cur.len;
                    }
                    cursor = cur.right;
                }
                if !found {
                    return None;
                }
                idx
            }
        };

        Some(AbsolutePosition { branch, index, assoc })
    }

    pub fn encode_v1(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match (&self.root_name, self.type_id) {
            (Some(name), _) => {
                buf.write_var(0u64);
                buf.write_string(name);
            }
            (None, Some(id)) => {
                buf.write_var(1u64);
                buf.write_var(id.client);
                buf.write_var(id.clock);
            }
            (None, None) => buf.write_var(2u64),
        }
        match self.item {
            Some(id) => {
                buf.write_var(1u64);
                buf.write_var(id.client);
                buf.write_var(id.clock);
            }
            None => buf.write_var(0u64),
        }
        buf.write_ivar(self.assoc as i64);
        buf
    }

    pub fn decode_v1(bytes: &[u8]) -> Result<RelativePosition, Lib0Error> {
        let mut cursor = Cursor::new(bytes);
        let owner_tag: u64 = cursor.read_var()?;
        let (root_name, type_id) = match owner_tag {
            0 => (Some(Arc::from(cursor.read_string()?)), None),
            1 => {
                let client = cursor.read_var()?;
                let clock = cursor.read_var()?;
                (None, Some(ID::new(client, clock)))
            }
            2 => (None, None),
            _ => return Err(Lib0Error::UnexpectedValue),
        };
        let has_item: u64 = cursor.read_var()?;
        let item = if has_item == 1 {
            let client = cursor.read_var()?;
            let clock = cursor.read_var()?;
            Some(ID::new(client, clock))
        } else {
            None
        };
        let assoc = cursor.read_ivar()? as i32;
        Ok(RelativePosition { type_id, root_name, item, assoc })
    }
}

/// Finds the `ID` of the content unit occupying index `unit_index` among
/// `branch`'s currently visible (non-deleted, countable) units.
fn locate_unit(branch: BranchPtr, unit_index: u32) -> Option<ID> {
    let mut pos = 0u32;
    let mut cursor = branch.start;
    while let Some(item) = cursor {
        if item.is_deleted() || !item.is_countable() {
            cursor = item.right;
            continue;
        }
        if unit_index < pos + item.len {
            let offset = (unit_index - pos) as u64;
            return Some(ID::new(item.id.client, item.id.clock + offset));
        }
        pos += item.len;
        cursor = item.right;
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::doc::Doc;
    use lib0::any::Any;

    #[test]
    fn position_tracks_index_across_a_concurrent_prepend() {
        let doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "hello world");
        }

        let rel = RelativePosition::from_type_index(text.as_ref(), 6, Assoc::Before);

        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "say: ");
        }

        let txn = doc.transact();
        let abs = rel.to_absolute(&txn).unwrap();
        assert_eq!(abs.index, 11); // "say: " (5) + original 6
    }

    #[test]
    fn root_level_array_position_resolves_by_name() {
        let doc = Doc::with_client_id(1);
        let array = doc.get_or_insert_array("a");
        {
            let mut txn = doc.transact_mut();
            array.insert(&mut txn, 0, Any::from(1i32));
            array.insert(&mut txn, 1, Any::from(2i32));
        }
        let rel = RelativePosition::from_type_index(array.as_ref(), 1, Assoc::Before);
        let txn = doc.transact();
        let abs = rel.to_absolute(&txn).unwrap();
        assert_eq!(abs.index, 1);
    }

    #[test]
    fn wire_roundtrip_preserves_fields() {
        let doc = Doc::with_client_id(5);
        let text = doc.get_or_insert_text("t");
        {
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "abc");
        }
        let rel = RelativePosition::from_type_index(text.as_ref(), 1, Assoc::After);
        let bytes = rel.encode_v1();
        let decoded = RelativePosition::decode_v1(&bytes).unwrap();
        assert_eq!(decoded, rel);
    }
}
