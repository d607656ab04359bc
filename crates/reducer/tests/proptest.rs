//! Property-based tests for keyview-reducer using proptest.

use keyview_core::{data_map, DataMap, Writable};
use keyview_reducer::{Filter, MapReducer, Order, Sort};
use proptest::prelude::*;

type Map = DataMap<u32, u32>;

fn build(values: &[u32]) -> MapReducer<Map> {
    let mut map = data_map();
    for (key, &value) in values.iter().enumerate() {
        map.insert(key as u32, value);
    }
    MapReducer::with_data(map)
}

/// Expected view: insertion order, filtered, then stably sorted.
fn model(values: &[u32], threshold: u32, sorted: bool) -> Vec<u32> {
    let mut expected: Vec<u32> = values.iter().copied().filter(|v| *v >= threshold).collect();
    if sorted {
        expected.sort();
    }
    expected
}

proptest! {
    /// Test that a filtered view keeps insertion order.
    #[test]
    fn filter_matches_model(values in prop::collection::vec(0u32..1000, 0..200), threshold in 0u32..1000) {
        let reducer = build(&values);
        reducer.filters().add(move |v: &u32| *v >= threshold).unwrap();

        let actual: Vec<u32> = reducer.iter().collect();
        prop_assert_eq!(actual, model(&values, threshold, false));
        prop_assert_eq!(reducer.len(), model(&values, threshold, false).len());
    }

    /// Test that filters plus a comparator produce the sorted filtered values.
    #[test]
    fn filter_sort_matches_model(values in prop::collection::vec(0u32..1000, 0..200), threshold in 0u32..1000) {
        let reducer = build(&values);
        reducer.sort().set(Sort::by_key(|v: &u32| *v, Order::Asc)).unwrap();
        reducer.filters().add(move |v: &u32| *v >= threshold).unwrap();

        let actual: Vec<u32> = reducer.iter().collect();
        prop_assert_eq!(actual, model(&values, threshold, true));
    }

    /// Test that reversing a view yields the same values back to front.
    #[test]
    fn reversed_is_mirror(values in prop::collection::vec(0u32..1000, 0..200), sorted in any::<bool>()) {
        let reducer = build(&values);
        if sorted {
            reducer.sort().set(|a: &u32, b: &u32| a.cmp(b)).unwrap();
        }
        let forward: Vec<u32> = reducer.iter().collect();

        reducer.set_reversed(true).unwrap();
        let mut backward: Vec<u32> = reducer.iter().collect();
        backward.reverse();
        prop_assert_eq!(forward, backward);
    }

    /// Test that equal views over equal data hash identically.
    #[test]
    fn index_hash_is_deterministic(values in prop::collection::vec(0u32..1000, 1..100), threshold in 0u32..1000) {
        let first = build(&values);
        let second = build(&values);
        first.filters().add(move |v: &u32| *v >= threshold).unwrap();
        second.filters().add(move |v: &u32| *v >= threshold).unwrap();

        prop_assert_eq!(first.index().hash(), second.index().hash());
        let keys: Vec<u32> = first.index().iter().collect();
        prop_assert_eq!(keys, second.index().iter().collect::<Vec<_>>());
    }

    /// Test that a reactive filter tracks its source store.
    #[test]
    fn reactive_filter_tracks_store(
        values in prop::collection::vec(0u32..1000, 0..100),
        thresholds in prop::collection::vec(0u32..1000, 1..10)
    ) {
        let reducer = build(&values);
        let limit = Writable::new(0u32);
        let current = limit.clone();
        reducer
            .filters()
            .add(Filter::new(move |v: &u32| *v >= current.get()).subscribe_to(limit.clone()))
            .unwrap();

        for threshold in thresholds {
            limit.set(threshold);
            let actual: Vec<u32> = reducer.iter().collect();
            prop_assert_eq!(actual, model(&values, threshold, false));
        }
    }

    /// Test that merging new data keeps the collection and matches the new entries.
    #[test]
    fn set_data_merge_matches_replace(
        before in prop::collection::vec(0u32..1000, 0..100),
        after in prop::collection::vec(0u32..1000, 0..100)
    ) {
        let merged = build(&before);
        let replaced = build(&before);
        let next = || {
            let mut map: Map = data_map();
            for (key, &value) in after.iter().enumerate() {
                map.insert(key as u32, value);
            }
            map
        };

        merged.set_data(Some(next()), false).unwrap();
        replaced.set_data(Some(next()), true).unwrap();

        let merged_values: Vec<u32> = merged.iter().collect();
        prop_assert_eq!(&merged_values, &after);
        prop_assert_eq!(merged_values, replaced.iter().collect::<Vec<_>>());
    }

    /// Test that a derived view never shows values hidden by its parent.
    #[test]
    fn derived_is_subset_of_parent(
        values in prop::collection::vec(0u32..1000, 0..200),
        parent_min in 0u32..1000,
        child_max in 0u32..1000
    ) {
        let reducer = build(&values);
        let view = reducer
            .derived()
            .create(keyview_reducer::DerivedOptions::new().name("view").filter(move |v: &u32| *v <= child_max))
            .unwrap();
        reducer.filters().add(move |v: &u32| *v >= parent_min).unwrap();

        let expected: Vec<u32> = values
            .iter()
            .copied()
            .filter(|v| *v >= parent_min && *v <= child_max)
            .collect();
        prop_assert_eq!(view.iter().collect::<Vec<_>>(), expected);
    }
}
