//! Delete sets — a per-client list of disjoint, sorted clock ranges
//! recording which clocks have been deleted.

use crate::id::{ClientID, Clock, ID};
use crate::utils::ClientMap;
use lib0::decoding::Read;
use lib0::encoding::Write;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct IdRange {
    pub clock: Clock,
    pub len: u32,
}

impl IdRange {
    pub fn end(&self) -> Clock {
        self.clock + self.len as Clock
    }

    pub fn contains(&self, clock: Clock) -> bool {
        clock >= self.clock && clock < self.end()
    }
}

/// A delete set: `client -> sorted, non-overlapping, non-adjacent ranges`.
/// Invariant 3 (tombstone commutativity) depends on this being a pure set —
/// squashing on insert keeps it that way without ever needing to re-sort.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DeleteSet {
    clients: ClientMap<Vec<IdRange>>,
}

impl DeleteSet {
    pub fn new() -> Self {
        DeleteSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.values().all(|v| v.is_empty())
    }

    pub fn insert(&mut self, id: ID, len: u32) {
        if len == 0 {
            return;
        }
        let ranges = self.clients.entry(id.client).or_default();
        let pos = ranges.partition_point(|r| r.clock < id.clock);
        ranges.insert(pos, IdRange { clock: id.clock, len });
        // merge with neighbours to keep the set canonical
        Self::squash(ranges);
    }

    fn squash(ranges: &mut Vec<IdRange>) {
        ranges.sort_by_key(|r| r.clock);
        let mut write = 0;
        for read in 1..ranges.len() {
            let (left, right) = (ranges[write], ranges[read]);
            if right.clock <= left.end() {
                let end = left.end().max(right.end());
                ranges[write].len = (end - left.clock) as u32;
            } else {
                write += 1;
                ranges[write] = right;
            }
        }
        ranges.truncate(write + 1);
    }

    pub fn is_deleted(&self, id: &ID) -> bool {
        self.clients
            .get(&id.client)
            .map(|ranges| ranges.iter().any(|r| r.contains(id.clock)))
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientID, &Vec<IdRange>)> {
        self.clients.iter()
    }

    /// Union of two delete sets, used when merging a received update's
    /// delete set into the store's own.
    pub fn merge(&mut self, other: &DeleteSet) {
        for (client, ranges) in &other.clients {
            for r in ranges {
                self.insert(ID::new(*client, r.clock), r.len);
            }
        }
    }

    pub fn encode<W: Write>(&self, w: &mut W) {
        let mut clients: Vec<_> = self.clients.iter().filter(|(_, r)| !r.is_empty()).collect();
        clients.sort_by_key(|(c, _)| **c);
        w.write_var(clients.len() as u64);
        for (client, ranges) in clients {
            w.write_var(*client);
            w.write_var(ranges.len() as u64);
            let mut clock = 0u64;
            for r in ranges {
                w.write_var(r.clock - clock);
                w.write_var(r.len as u64);
                clock = r.clock + r.len as Clock;
            }
        }
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, lib0::Error> {
        let mut ds = DeleteSet::new();
        let num_clients: u64 = r.read_var()?;
        for _ in 0..num_clients {
            let client: ClientID = r.read_var()?;
            let num_ranges: u64 = r.read_var()?;
            let mut clock = 0u64;
            for _ in 0..num_ranges {
                let gap: u64 = r.read_var()?;
                clock += gap;
                let len: u32 = r.read_var()?;
                ds.insert(ID::new(client, clock), len);
                clock += len as Clock;
            }
        }
        Ok(ds)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn overlapping_inserts_squash_into_one_range() {
        let mut ds = DeleteSet::new();
        ds.insert(ID::new(1, 0), 5);
        ds.insert(ID::new(1, 5), 5);
        assert_eq!(ds.clients[&1].len(), 1);
        assert_eq!(ds.clients[&1][0].len, 10);
    }

    #[test]
    fn disjoint_inserts_stay_separate_and_sorted() {
        let mut ds = DeleteSet::new();
        ds.insert(ID::new(1, 20), 2);
        ds.insert(ID::new(1, 0), 2);
        assert_eq!(ds.clients[&1].len(), 2);
        assert_eq!(ds.clients[&1][0].clock, 0);
        assert_eq!(ds.clients[&1][1].clock, 20);
    }

    #[test]
    fn is_deleted_respects_range_bounds() {
        let mut ds = DeleteSet::new();
        ds.insert(ID::new(1, 10), 5);
        assert!(ds.is_deleted(&ID::new(1, 12)));
        assert!(!ds.is_deleted(&ID::new(1, 16)));
    }

    #[test]
    fn codec_roundtrip_preserves_ranges() {
        let mut ds = DeleteSet::new();
        ds.insert(ID::new(1, 0), 3);
        ds.insert(ID::new(1, 10), 2);
        ds.insert(ID::new(7, 0), 1);
        let mut buf = Vec::new();
        ds.encode(&mut buf);
        let mut cursor = lib0::decoding::Cursor::new(&buf);
        let decoded = DeleteSet::decode(&mut cursor).unwrap();
        assert_eq!(ds, decoded);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = DeleteSet::new();
        a.insert(ID::new(1, 0), 5);
        let mut b = a.clone();
        b.merge(&a);
        assert_eq!(a, b);
    }
}
