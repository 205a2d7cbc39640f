//! Durable thread memory over a pluggable key/value store.

pub mod kv;
pub mod thread;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use thread::{RestoredThread, Theme, ThreadPersistence};
