// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry and fetch tracking

use crate::record::ModuleRecord;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Thread-safe, append-only map from module id to record.
///
/// Once an id has a record it is never overwritten; a later fetch or
/// definition for the same id reuses the cached record.
pub struct Registry {
    records: DashMap<String, Arc<ModuleRecord>>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Get a registered record by id
    pub fn get(&self, id: &str) -> Option<Arc<ModuleRecord>> {
        self.records.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Check whether an id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Register a record under an id.
    ///
    /// Append-only: returns `true` if the record was inserted, `false` if
    /// the id was already registered (in which case the existing record is
    /// kept).
    pub fn insert(&self, id: &str, record: Arc<ModuleRecord>) -> bool {
        match self.records.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    /// All registered ids
    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch lifecycle of a module id.
///
/// An id with no tracker entry is unrequested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// A fetch has been scheduled or dispatched and has not settled yet
    InFlight,
    /// The fetch's terminal completion has been processed
    Settled,
}

/// Tracks which ids have an in-flight or settled fetch.
///
/// Prevents duplicate fetch requests; independent of whether the fetch
/// succeeded.
pub struct FetchTracker {
    states: DashMap<String, FetchState>,
}

impl FetchTracker {
    /// Create a new empty tracker
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// Mark an id in-flight.
    ///
    /// Returns `true` if the id was previously unrequested; `false` if a
    /// fetch was already in flight or settled (no second fetch may be
    /// issued).
    pub fn begin(&self, id: &str) -> bool {
        match self.states.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(FetchState::InFlight);
                true
            }
        }
    }

    /// Mark an id settled
    pub fn settle(&self, id: &str) {
        self.states.insert(id.to_string(), FetchState::Settled);
    }

    /// Current fetch state of an id, if any fetch was ever initiated
    pub fn state(&self, id: &str) -> Option<FetchState> {
        self.states.get(id).map(|entry| *entry.value())
    }
}

impl Default for FetchTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_registry_is_append_only() {
        let registry = Registry::new();
        let first = ModuleRecord::new(Some("a".into()), Vec::new(), None, Some(Value::from(1.0)));
        let second = ModuleRecord::new(Some("a".into()), Vec::new(), None, Some(Value::from(2.0)));

        assert!(registry.insert("a", first));
        assert!(!registry.insert("a", second));
        assert_eq!(
            registry.get("a").unwrap().export_value(),
            Some(Value::Number(1.0))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_tracker_begin_is_idempotent() {
        let tracker = FetchTracker::new();
        assert!(tracker.begin("x"));
        assert!(!tracker.begin("x"));
        assert_eq!(tracker.state("x"), Some(FetchState::InFlight));
    }

    #[test]
    fn test_tracker_settle() {
        let tracker = FetchTracker::new();
        tracker.begin("x");
        tracker.settle("x");
        assert_eq!(tracker.state("x"), Some(FetchState::Settled));
        // settled ids are still tracked, so no re-fetch is possible
        assert!(!tracker.begin("x"));
    }

    #[test]
    fn test_tracker_settle_without_begin() {
        // built-ins are marked settled without ever being in flight
        let tracker = FetchTracker::new();
        tracker.settle("exports");
        assert_eq!(tracker.state("exports"), Some(FetchState::Settled));
        assert!(!tracker.begin("exports"));
    }

    #[test]
    fn test_untracked_id() {
        let tracker = FetchTracker::new();
        assert_eq!(tracker.state("never"), None);
    }
}
