//! Per-client clock-sorted struct arrays plus the derived state
//! vector.

use crate::block::{BlockCell, ClockRange, ItemPtr};
use crate::id::{ClientID, Clock, ID};
use crate::utils::ClientMap;
use lib0::decoding::Read;
use lib0::encoding::Write;

/// `client -> Vec<BlockCell>`, kept sorted by clock with no gaps between
/// consecutive entries (invariant S1) and no overlaps (invariant S2).
#[derive(Default)]
pub struct ClientBlockList {
    list: Vec<BlockCell>,
}

impl ClientBlockList {
    pub fn new() -> Self {
        ClientBlockList { list: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Next free clock for this client — the basis for new local inserts.
    pub fn next_clock(&self) -> Clock {
        self.list.last().map(|b| b.clock_end()).unwrap_or(0)
    }

    /// Binary search for the block covering `clock`. Blocks are
    /// non-overlapping and sorted, so this is a straight bisection.
    fn find_pivot(&self, clock: Clock) -> Option<usize> {
        let mut lo = 0i64;
        let mut hi = self.list.len() as i64 - 1;
        while lo <= hi {
            let mid = (lo + hi) / 2;
            let block = &self.list[mid as usize];
            if block.clock_end() <= clock {
                lo = mid + 1;
            } else if block.clock_start() > clock {
                hi = mid - 1;
            } else {
                return Some(mid as usize);
            }
        }
        None
    }

    pub fn get(&self, clock: Clock) -> Option<&BlockCell> {
        self.find_pivot(clock).map(|i| &self.list[i])
    }

    pub fn get_mut(&mut self, clock: Clock) -> Option<&mut BlockCell> {
        self.find_pivot(clock).map(move |i| &mut self.list[i])
    }

    /// Splits the block covering `clock` (if any) so that `clock` becomes a
    /// clean boundary, then returns its index. Used before integration so a
    /// newly received item's neighbours are never mid-block.
    pub fn split_at(&mut self, clock: Clock) -> Option<usize> {
        let i = self.find_pivot(clock)?;
        let offset = (clock - self.list[i].clock_start()) as u32;
        if offset == 0 {
            return Some(i);
        }
        let is_item = matches!(self.list[i], BlockCell::Item(_));
        let right = match &mut self.list[i] {
            BlockCell::Item(item) => BlockCell::Item(Box::new(item.split(offset))),
            BlockCell::GC(r) => {
                let right = ClockRange { id: ID::new(r.id.client, r.id.clock + offset as Clock), len: r.len - offset };
                r.len = offset;
                BlockCell::GC(right)
            }
            BlockCell::Skip(r) => {
                let right = ClockRange { id: ID::new(r.id.client, r.id.clock + offset as Clock), len: r.len - offset };
                r.len = offset;
                BlockCell::Skip(right)
            }
        };
        self.list.insert(i + 1, right);
        if is_item {
            // item graph pointers (as opposed to storage-array neighbours)
            // must be relinked explicitly: `Item::split` only fills in
            // content/id/parent, not `left`/`right`, since the new
            // fragment has no stable address until it's inserted above.
            let left_ptr = ItemPtr::new(self.list[i].as_item().unwrap());
            let right_ptr = ItemPtr::new(self.list[i + 1].as_item().unwrap());
            self.list[i].as_item_mut().unwrap().right = Some(right_ptr);
            let mut new_right = self.list[i + 1].as_item_mut().unwrap();
            new_right.left = Some(left_ptr);
            if let Some(mut far_right) = new_right.right {
                far_right.left = Some(right_ptr);
            }
        }
        Some(i + 1)
    }

    pub fn push(&mut self, block: BlockCell) {
        if let Some(BlockCell::Item(last)) = self.list.last_mut() {
            if let BlockCell::Item(new_item) = &block {
                if last.try_squash(new_item) {
                    return;
                }
            }
        }
        self.list.push(block);
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockCell> {
        self.list.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BlockCell> {
        self.list.iter_mut()
    }

    pub fn get_mut_at(&mut self, index: usize) -> Option<&mut BlockCell> {
        self.list.get_mut(index)
    }
}

/// Maps each known client to the clock immediately after the last struct it
/// has produced — i.e. "how much of client X's history have I seen".
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct StateVector(ClientMap<Clock>);

impl StateVector {
    pub fn new() -> Self {
        StateVector(ClientMap::default())
    }

    pub fn get(&self, client: &ClientID) -> Clock {
        self.0.get(client).copied().unwrap_or(0)
    }

    pub fn set_max(&mut self, client: ClientID, clock: Clock) {
        let entry = self.0.entry(client).or_insert(0);
        if clock > *entry {
            *entry = clock;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientID, &Clock)> {
        self.0.iter()
    }

    pub fn encode<W: Write>(&self, w: &mut W) {
        w.write_var(self.0.len() as u64);
        for (client, clock) in &self.0 {
            w.write_var(*client);
            w.write_var(*clock);
        }
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, lib0::Error> {
        let mut sv = StateVector::new();
        let len: u64 = r.read_var()?;
        for _ in 0..len {
            let client: ClientID = r.read_var()?;
            let clock: Clock = r.read_var()?;
            sv.set_max(client, clock);
        }
        Ok(sv)
    }
}

#[derive(Default)]
pub struct BlockStore {
    clients: ClientMap<ClientBlockList>,
}

impl BlockStore {
    pub fn new() -> Self {
        BlockStore { clients: ClientMap::default() }
    }

    pub fn get_client_blocks(&self, client: &ClientID) -> Option<&ClientBlockList> {
        self.clients.get(client)
    }

    pub fn get_client_blocks_mut(&mut self, client: &ClientID) -> &mut ClientBlockList {
        self.clients.entry(*client).or_insert_with(ClientBlockList::new)
    }

    pub fn get_client_blocks_mut_opt(&mut self, client: &ClientID) -> Option<&mut ClientBlockList> {
        self.clients.get_mut(client)
    }

    pub fn contains_client(&self, client: &ClientID) -> bool {
        self.clients.contains_key(client)
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientID> {
        self.clients.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientID, &ClientBlockList)> {
        self.clients.iter()
    }

    pub fn get_item(&self, id: &ID) -> Option<ItemPtr> {
        self.clients
            .get(&id.client)
            .and_then(|blocks| blocks.get(id.clock))
            .and_then(|cell| cell.as_item())
            .map(ItemPtr::new)
    }

    /// Returns the item at `id`, splitting so `id` is the start of a block —
    /// used when resolving `right_origin`.
    pub fn get_item_clean_start(&mut self, id: ID) -> Option<ItemPtr> {
        let blocks = self.clients.get_mut(&id.client)?;
        let idx = blocks.split_at(id.clock)?;
        blocks.list.get(idx).and_then(|c| c.as_item()).map(ItemPtr::new)
    }

    /// Returns the item whose *end* is `id` (inclusive), splitting so `id` is
    /// the last clock of a block — used for `origin`.
    pub fn get_item_clean_end(&mut self, id: ID) -> Option<ItemPtr> {
        let blocks = self.clients.get_mut(&id.client)?;
        let idx = blocks.split_at(id.clock + 1)?;
        let idx = if idx == 0 { return None } else { idx - 1 };
        blocks.list.get(idx).and_then(|c| c.as_item()).map(ItemPtr::new)
    }

    pub fn push(&mut self, client: ClientID, block: BlockCell) {
        self.get_client_blocks_mut(&client).push(block);
    }

    /// The full state vector derived by walking every client's tail clock
    ///.
    pub fn state_vector(&self) -> StateVector {
        let mut sv = StateVector::new();
        for (client, blocks) in &self.clients {
            sv.set_max(*client, blocks.next_clock());
        }
        sv
    }
}
