use crate::id::ClientID;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::hash::{BuildHasherDefault, Hasher};

/// A `HashMap` keyed by `ClientID` using [`ClientHasher`] instead of the
/// default SipHash — client ids are already uniformly random, so hashing
/// them is redundant work.
pub(crate) type ClientMap<V> = HashMap<ClientID, V, BuildHasherDefault<ClientHasher>>;

// An minimalistic hasher for client-ids!
// Client-ids are already random only have a size of maximum 64 bit. No reason to spin up
// cryptographic functions every time a client is queried.
#[derive(Default)]
pub struct ClientHasher {
    prefix: u64,
}

impl Hasher for ClientHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.prefix
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() == 8);
        // we only expect a single value to be written
        debug_assert!(self.prefix == 0);
        self.prefix = u64::from_ne_bytes(<[u8; 8]>::try_from(bytes).unwrap());
    }
}
