// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Pending set - records awaiting dependency satisfaction

use crate::record::ModuleRecord;
use parking_lot::Mutex;
use std::sync::Arc;

/// The set of module records not yet resolved, in arrival order.
///
/// Records are compared by pointer identity (anonymous records have no id to
/// key on). A record is removed exactly once, at the moment it transitions
/// to resolved.
pub struct PendingSet {
    records: Mutex<Vec<Arc<ModuleRecord>>>,
}

impl PendingSet {
    /// Create a new empty set
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Add a record awaiting resolution
    pub fn push(&self, record: Arc<ModuleRecord>) {
        self.records.lock().push(record);
    }

    /// Remove a record by pointer identity.
    ///
    /// Returns `true` if the record was present.
    pub fn remove(&self, record: &Arc<ModuleRecord>) -> bool {
        let mut records = self.records.lock();
        match records.iter().position(|r| Arc::ptr_eq(r, record)) {
            Some(index) => {
                records.remove(index);
                true
            }
            None => false,
        }
    }

    /// Check whether a record is in the set
    pub fn contains(&self, record: &Arc<ModuleRecord>) -> bool {
        self.records.lock().iter().any(|r| Arc::ptr_eq(r, record))
    }

    /// Snapshot of the set in arrival order
    pub fn snapshot(&self) -> Vec<Arc<ModuleRecord>> {
        self.records.lock().clone()
    }

    /// Number of pending records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for PendingSet {
    fn default() -> Self {
        Self::new()
    }
}
