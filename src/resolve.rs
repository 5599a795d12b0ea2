// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resolution engine - fixed-point propagation of readiness.
//!
//! Each trigger seeds a worklist from the pending set and drains it,
//! resolving every record whose dependencies are satisfied. When a record
//! resolves, its dependents (tracked in a reverse-dependency index) are
//! pushed back onto the worklist, so transitive readiness propagates within
//! a single trigger instead of requiring whole-set re-scans. A dirty flag
//! re-seeds the run when definitions arrive mid-drain (a factory calling
//! define), and a non-reentrant gate guarantees each factory is invoked at
//! most once, ever.

use crate::error::Result;
use crate::pending::PendingSet;
use crate::record::ModuleRecord;
use crate::registry::Registry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub(crate) struct ResolutionEngine {
    /// Serializes resolution runs; a nested trigger (same thread, from
    /// inside a factory) fails the try-lock and defers to the outer run
    gate: Mutex<()>,
    /// Set when a trigger arrives while a run is in progress
    dirty: AtomicBool,
    /// Reverse-dependency index: dependency id -> records that declared it
    dependents: DashMap<String, Vec<Weak<ModuleRecord>>>,
}

impl ResolutionEngine {
    pub(crate) fn new() -> Self {
        Self {
            gate: Mutex::new(()),
            dirty: AtomicBool::new(false),
            dependents: DashMap::new(),
        }
    }

    /// Record that `dependent` declared a dependency on `dep_id`.
    ///
    /// Called once at definition time and again after normalization rewrites
    /// relative ids; duplicate edges only cost redundant readiness checks.
    pub(crate) fn link(&self, dep_id: &str, dependent: &Arc<ModuleRecord>) {
        self.dependents
            .entry(dep_id.to_string())
            .or_default()
            .push(Arc::downgrade(dependent));
    }

    /// Resolve every pending record that can make progress.
    ///
    /// Returns the number of records resolved by this trigger. A factory
    /// error propagates unchanged; the failing record stays pending and is
    /// retried on the next trigger.
    pub(crate) fn trigger(&self, registry: &Registry, pending: &PendingSet) -> Result<usize> {
        let Some(_guard) = self.gate.try_lock() else {
            self.dirty.store(true, Ordering::Release);
            return Ok(0);
        };

        let mut total = 0;
        loop {
            self.dirty.store(false, Ordering::Release);
            total += self.drain(registry, pending)?;
            if !self.dirty.load(Ordering::Acquire) {
                break;
            }
        }
        Ok(total)
    }

    /// One seeded worklist pass to its local fixed point.
    fn drain(&self, registry: &Registry, pending: &PendingSet) -> Result<usize> {
        // Popping the snapshot considers the most recently registered
        // records first.
        let mut worklist = pending.snapshot();
        let mut resolved = 0;

        while let Some(record) = worklist.pop() {
            if record.is_resolved() {
                // resolved by an earlier worklist entry; sweep it
                pending.remove(&record);
                continue;
            }
            if !record.is_ready(registry, None) {
                continue;
            }

            self.resolve_record(&record, registry, pending)?;
            resolved += 1;

            if let Some(id) = record.id() {
                self.push_dependents(&id, &mut worklist);
            }
        }
        Ok(resolved)
    }

    /// Invoke a ready record's factory and set its export value.
    fn resolve_record(
        &self,
        record: &Arc<ModuleRecord>,
        registry: &Registry,
        pending: &PendingSet,
    ) -> Result<()> {
        let Some(factory) = record.factory() else {
            pending.remove(record);
            return Ok(());
        };

        let deps = record.dependencies();
        let mut args = Vec::with_capacity(deps.len());
        for dep_id in &deps {
            args.push(record.dependency_value(registry, dep_id)?);
        }

        tracing::debug!("invoking factory for module {:?}", record.id());
        // An error leaves the record deferred and pending for retry.
        let value = factory(record.exports(), &args)?;

        record.complete(value);
        pending.remove(record);
        tracing::debug!("module {:?} resolved", record.id());
        Ok(())
    }

    fn push_dependents(&self, id: &str, worklist: &mut Vec<Arc<ModuleRecord>>) {
        let Some(entry) = self.dependents.get(id) else {
            return;
        };
        for weak in entry.value() {
            if let Some(dependent) = weak.upgrade() {
                if !dependent.is_resolved() {
                    worklist.push(dependent);
                }
            }
        }
    }
}
