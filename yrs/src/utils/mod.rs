pub(crate) mod client_hasher;
pub mod observer;
pub(crate) mod search_marker;

pub(crate) use client_hasher::{ClientHasher, ClientMap};
pub use observer::{Observer, ObserverFn, ObserverMut, Subscription};
