//! Keyview Reducer - Reactive derived views over keyed collections.
//!
//! A [`MapReducer`] wraps a keyed collection and maintains an ordered index
//! of the keys that pass its filters, sorted by an optional comparator.
//! Subscribers are notified whenever the visible view changes.
//!
//! # Core Concepts
//!
//! - `MapReducer`: The root view; owns the collection
//! - `DerivedMapReducer`: A named child view refining its parent's order
//! - `AdapterFilters` / `AdapterSort`: Weighted predicates and a comparator
//! - `AdapterDerived`: Registry of derived views and derived kinds
//! - `IndexHandle`: The computed key order and its change hash
//! - `KeywordQuery`: A reactive text search filter
//!
//! Filters and comparators built with `subscribe_to` recompute the index
//! whenever their source store changes.
//!
//! # Example
//!
//! ```rust
//! use keyview_core::{data_map, DataMap, Writable};
//! use keyview_reducer::{DerivedOptions, Filter, MapReducer, Order, Sort};
//!
//! let mut map: DataMap<&str, u32> = data_map();
//! map.insert("a", 30);
//! map.insert("b", 10);
//! map.insert("c", 20);
//! let reducer = MapReducer::with_data(map);
//!
//! let limit = Writable::new(25u32);
//! let below = limit.clone();
//! reducer
//!     .filters()
//!     .add(Filter::new(move |v: &u32| *v < below.get()).subscribe_to(limit.clone()))
//!     .unwrap();
//! reducer.sort().set(Sort::by_key(|v: &u32| *v, Order::Asc)).unwrap();
//! assert_eq!(reducer.iter().collect::<Vec<_>>(), vec![10, 20]);
//!
//! limit.set(40);
//! assert_eq!(reducer.iter().collect::<Vec<_>>(), vec![10, 20, 30]);
//!
//! let top = reducer
//!     .derived()
//!     .create(DerivedOptions::new().name("top").filter(|v: &u32| *v >= 20))
//!     .unwrap();
//! assert_eq!(top.iter().collect::<Vec<_>>(), vec![20, 30]);
//! ```

#![no_std]

extern crate alloc;

mod derived;
mod derived_reducer;
mod filters;
mod indexer;
pub mod query;
mod reducer;
mod sort;

pub use derived::{AdapterDerived, DerivedKind, DerivedOptions, DerivedSpec, InitializeHook, DEFAULT_KIND};
pub use derived_reducer::DerivedMapReducer;
pub use filters::{AdapterFilters, Filter, FilterEntry, FilterIdentity, IntoFilter, Predicate, DEFAULT_WEIGHT};
pub use indexer::{IndexHandle, IndexIter};
pub use query::{KeywordQuery, KeywordQueryBuilder};
pub use reducer::{MapReducer, ReducerIter, ReducerOptions};
pub use sort::{AdapterSort, Comparator, IntoSort, Order, Sort};

// Re-export commonly used types from dependencies
pub use keyview_core::{DataMap, Error, Extras, Result, Subscriber, Unsubscribe, Value, Writable};
