//! Storage layer: raw key-value backends and the per-user document
//! repository built on top of them.

pub mod kv;
pub mod repository;

pub use kv::{KeyValueStore, MemoryKvStore, RemoteKvStore, StoreError};
pub use repository::{parse_user_id_from_key, DocumentUpdate, UserRepository};
