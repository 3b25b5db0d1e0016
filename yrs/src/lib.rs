//! `yrs` — a CRDT engine for building decentralized, real-time collaborative
//! applications: a family of shared data types (sequence, map, rich text,
//! XML tree) that converge to identical state on every replica regardless of
//! delivery order, plus the binary update codec and sync protocol used to
//! exchange them over any transport.
//!
//! The crate has no I/O of its own — it is the "core" the design describes:
//! encode/decode updates, integrate them, read/observe the result. Opening
//! sockets, signaling, persistence and encryption are all left to callers.

pub mod awareness;
pub mod block;
pub mod block_store;
pub mod doc;
pub mod error;
pub mod id;
pub mod id_set;
pub mod relative_position;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod transaction;
pub mod types;
pub mod undo;
pub mod update;
pub mod updates;
pub(crate) mod utils;

pub use crate::doc::{Doc, Options};
pub use crate::error::Error;
pub use crate::id::{ClientID, Clock, ID};
pub use crate::transaction::{Origin, Transaction, TransactionMut};
pub use crate::types::array::Array;
pub use crate::types::map::Map;
pub use crate::types::text::Text;
pub use crate::types::xml::{XmlElement, XmlFragment, XmlHook, XmlText};
pub use crate::types::{Change, DeepObservable, Delta, Event, Observable, SharedRef, ToJson, Value};
pub use crate::update::Update;
pub use lib0::any::Any;

pub type Result<T> = std::result::Result<T, Error>;
