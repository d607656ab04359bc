//! Keyword search filter.
//!
//! A [`KeywordQuery`] produces a reactive [`Filter`] that accepts values
//! whose accessed text contains the current keyword. The keyword lives in a
//! [`Writable`] store, so changing it recomputes every index the filter is
//! registered with.

use crate::filters::Filter;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use keyview_core::Writable;
use unicode_normalization::UnicodeNormalization;

/// Extracts the searchable text of a value.
pub type Accessor<V> = Rc<dyn for<'a> Fn(&'a V) -> Option<&'a str>>;

/// Trims, decomposes to NFD and drops ASCII control characters.
pub fn normalize(text: &str) -> String {
    text.trim().nfd().filter(|c| !matches!(c, '\u{0}'..='\u{1f}')).collect()
}

fn prepare(text: &str, case_sensitive: bool) -> String {
    let text = normalize(text);
    if case_sensitive {
        text
    } else {
        text.to_lowercase()
    }
}

/// Builder for [`KeywordQuery`].
pub struct KeywordQueryBuilder<V> {
    accessors: Vec<Accessor<V>>,
    case_sensitive: bool,
    access_warn: bool,
    store: Option<Writable<String>>,
}

impl<V: 'static> Default for KeywordQueryBuilder<V> {
    fn default() -> Self {
        Self {
            accessors: Vec::new(),
            case_sensitive: false,
            access_warn: false,
            store: None,
        }
    }
}

impl<V: 'static> KeywordQueryBuilder<V> {
    /// Adds a text accessor; a value matches if any accessor matches.
    pub fn accessor<F>(mut self, accessor: F) -> Self
    where
        F: for<'a> Fn(&'a V) -> Option<&'a str> + 'static,
    {
        self.accessors.push(Rc::new(accessor));
        self
    }

    /// Sets case sensitive matching (default: false).
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Logs a warning whenever an accessor yields no text (default: false).
    pub fn access_warn(mut self, access_warn: bool) -> Self {
        self.access_warn = access_warn;
        self
    }

    /// Uses an external keyword store; its current value seeds the keyword.
    pub fn store(mut self, store: Writable<String>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the query.
    pub fn build(self) -> KeywordQuery<V> {
        let Self {
            accessors,
            case_sensitive,
            access_warn,
            store,
        } = self;
        let store = store.unwrap_or_default();
        let keyword = Rc::new(RefCell::new(String::new()));

        // Registered before any index subscribes, so the keyword is current
        // when the index recomputes. The subscription lives as long as the store.
        let synced = Rc::clone(&keyword);
        let _ = store.subscribe(move |raw: &String| {
            *synced.borrow_mut() = prepare(raw, case_sensitive);
        });

        let predicate = move |value: &V| {
            let keyword = keyword.borrow();
            if keyword.is_empty() {
                return true;
            }
            for (position, accessor) in accessors.iter().enumerate() {
                match accessor(value) {
                    Some(text) => {
                        if prepare(text, case_sensitive).contains(keyword.as_str()) {
                            return true;
                        }
                    }
                    None => {
                        if access_warn {
                            tracing::warn!(accessor = position, "keyword query could not access string data");
                        }
                    }
                }
            }
            false
        };

        KeywordQuery {
            filter: Filter::new(predicate).subscribe_to(store.clone()),
            store,
        }
    }
}

/// A reactive keyword filter.
///
/// # Example
///
/// ```rust
/// use keyview_core::{data_map, DataMap};
/// use keyview_reducer::{KeywordQuery, MapReducer};
///
/// let mut map: DataMap<u32, String> = data_map();
/// map.insert(1, "Apple".into());
/// map.insert(2, "Banana".into());
/// map.insert(3, "Cherry".into());
/// let reducer = MapReducer::with_data(map);
///
/// let query = KeywordQuery::builder()
///     .accessor(|v: &String| Some(v.as_str()))
///     .build();
/// reducer.filters().add(query.filter()).unwrap();
///
/// query.set("AN");
/// assert_eq!(reducer.iter().collect::<Vec<_>>(), vec!["Banana".to_string()]);
///
/// query.set("");
/// assert_eq!(reducer.len(), 3);
/// ```
pub struct KeywordQuery<V> {
    filter: Filter<V>,
    store: Writable<String>,
}

impl<V: 'static> KeywordQuery<V> {
    /// Returns a builder.
    pub fn builder() -> KeywordQueryBuilder<V> {
        KeywordQueryBuilder::default()
    }

    /// Sets the keyword in [`normalize`]d form.
    pub fn set(&self, keyword: &str) {
        self.store.set(normalize(keyword));
    }

    /// Returns the current keyword.
    pub fn keyword(&self) -> String {
        self.store.get()
    }

    /// Returns the keyword store.
    pub fn store(&self) -> &Writable<String> {
        &self.store
    }

    /// Returns the filter; every call returns the same filter identity.
    pub fn filter(&self) -> Filter<V> {
        self.filter.clone()
    }
}
