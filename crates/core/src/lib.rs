//! Keyview Core - Shared primitives for keyview reducers.
//!
//! This crate provides the foundational pieces the reducer engine is built on:
//!
//! - `KeyedCollection`: The keyed data source abstraction and its map implementations
//! - `hash`: Deterministic string / index hashing used for change detection
//! - `store`: Subscribers, unsubscribe tokens, the `Reactive` capability and `Writable`
//! - `Value`: Loosely typed option values
//! - `Error`: Error types for reducer operations
//!
//! # Example
//!
//! ```rust
//! use keyview_core::{data_map, index_hash, KeyedCollection};
//!
//! let mut map = data_map();
//! map.insert("b", 2);
//! map.insert("a", 1);
//!
//! let keys: Vec<&str> = KeyedCollection::keys(&map).copied().collect();
//! assert_eq!(keys, vec!["b", "a"]);
//! assert!(index_hash(Some(&keys[..])).is_some());
//! ```

#![no_std]

extern crate alloc;

pub mod collection;
mod error;
pub mod hash;
pub mod store;
mod value;

pub use collection::{data_map, DataCell, DataMap, KeyedCollection};
pub use error::{Error, Result};
pub use hash::{array_equals, hash_string, hash_unknown, index_hash, HashUnknown};
pub use store::{Reactive, Subscriber, SubscriberList, SubscriptionId, Unsubscribe, Writable};
pub use value::{Extras, Value};
