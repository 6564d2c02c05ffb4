// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Registry of data sources known to a connector.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::data_source::DataSource;

#[derive(Default)]
struct Entries {
    by_id: HashMap<String, Arc<DataSource>>,
    order: Vec<String>,
}

/// Append-only map of data source identifiers to descriptors.
///
/// Registering an identifier that is already known is a no-op; the first
/// registration wins. Iteration follows registration order.
#[derive(Default)]
pub struct DataSourceRegistry {
    entries: RwLock<Entries>,
}

impl DataSourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one data source. Returns the stored descriptor if it was new.
    pub fn register(&self, identifier: impl Into<String>, data_source: DataSource) -> Option<Arc<DataSource>> {
        let identifier = identifier.into();
        let mut entries = self.entries.write();
        if entries.by_id.contains_key(&identifier) {
            tracing::debug!(data_source = %identifier, "Data source already registered; ignoring");
            return None;
        }
        let data_source = Arc::new(data_source);
        entries.by_id.insert(identifier.clone(), Arc::clone(&data_source));
        entries.order.push(identifier);
        Some(data_source)
    }

    /// Registers several data sources and returns the newly added ones.
    pub fn register_all<I, K>(&self, data_sources: I) -> Vec<(String, Arc<DataSource>)>
    where
        I: IntoIterator<Item = (K, DataSource)>,
        K: Into<String>,
    {
        data_sources
            .into_iter()
            .filter_map(|(id, source)| {
                let id = id.into();
                self.register(id.clone(), source).map(|stored| (id, stored))
            })
            .collect()
    }

    /// Looks up a data source.
    pub fn get(&self, identifier: &str) -> Option<Arc<DataSource>> {
        self.entries.read().by_id.get(identifier).cloned()
    }

    /// Returns `true` if the identifier is registered.
    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.read().by_id.contains_key(identifier)
    }

    /// Returns all identifiers in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.read().order.clone()
    }

    /// Returns all entries in registration order.
    pub fn snapshot(&self) -> Vec<(String, Arc<DataSource>)> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id).map(|ds| (id.clone(), Arc::clone(ds))))
            .collect()
    }

    /// Returns the number of registered data sources.
    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DataSourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_registration_wins() {
        let registry = DataSourceRegistry::new();
        assert!(registry.register("temp", DataSource::node(None, "i=1")).is_some());
        assert!(registry.register("temp", DataSource::node(None, "i=2")).is_none());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("temp").unwrap().to_string(), "i=1");
    }

    #[test]
    fn test_register_all_returns_new_entries_in_order() {
        let registry = DataSourceRegistry::new();
        registry.register("a", DataSource::node(None, "i=1"));

        let added = registry.register_all(vec![
            ("b", DataSource::node(None, "i=2")),
            ("a", DataSource::node(None, "i=3")),
            ("c", DataSource::node(None, "i=4")),
        ]);

        let added_ids: Vec<_> = added.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(added_ids, ["b", "c"]);
        assert_eq!(registry.ids(), ["a", "b", "c"]);
        assert!(registry.contains("c"));
        assert!(!registry.contains("d"));
    }
}
