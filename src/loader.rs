// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader orchestration - definitions, fetch scheduling, and settlement.
//!
//! The [`Loader`] owns all resolution state (registry, pending set, fetch
//! tracker, engine) as one explicit context object, so independent loader
//! instances can coexist and tests stay deterministic. Definitions arrive
//! through [`Loader::define`]; dependency normalization and fetch
//! scheduling are deferred to the drive loop's synchronization points so
//! every synchronous definition in a fetched script is collected before any
//! new fetch is issued.

use crate::builtins;
use crate::error::Result;
use crate::pending::PendingSet;
use crate::record::{ModuleFactory, ModuleRecord};
use crate::registry::{FetchState, FetchTracker, Registry};
use crate::resolve::ResolutionEngine;
use crate::transport::ScriptTransport;
use crate::value::{ExportsObject, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Dependencies assumed when a definition omits its dependency list.
pub const DEFAULT_DEPENDENCIES: [&str; 3] = ["require", "exports", "module"];

/// Placeholder for future loader configuration.
///
/// Carried so embedders have a stable construction surface; no options are
/// currently recognized.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {}

/// The factory-or-value slot of a definition.
#[derive(Clone)]
pub enum DefinePayload {
    /// A callable that computes the export value once dependencies settle
    Factory(ModuleFactory),
    /// A precomputed export value; the module is born resolved
    Value(Value),
}

/// A canonicalized module definition: `(id?, dependencies?, payload)`.
///
/// The three calling shapes of the definition entry point map onto the
/// constructors: [`Define::factory`] / [`Define::value`] for the
/// single-argument shape, [`Define::named`] / [`Define::with_dependencies`]
/// for the two-argument shapes, and [`Define::full`] for the full shape.
/// An omitted dependency list defaults to [`DEFAULT_DEPENDENCIES`].
#[derive(Clone)]
pub struct Define {
    pub(crate) id: Option<String>,
    pub(crate) dependencies: Option<Vec<String>>,
    pub(crate) payload: DefinePayload,
}

impl Define {
    /// Anonymous definition from a factory alone
    pub fn factory(
        f: impl Fn(&ExportsObject, &[Value]) -> Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: None,
            dependencies: None,
            payload: DefinePayload::Factory(Arc::new(f)),
        }
    }

    /// Anonymous definition of a precomputed value
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            id: None,
            dependencies: None,
            payload: DefinePayload::Value(value.into()),
        }
    }

    /// Named definition with the default dependency triad
    pub fn named(
        id: impl Into<String>,
        f: impl Fn(&ExportsObject, &[Value]) -> Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: Some(id.into()),
            dependencies: None,
            payload: DefinePayload::Factory(Arc::new(f)),
        }
    }

    /// Named definition of a precomputed value
    pub fn named_value(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: Some(id.into()),
            dependencies: None,
            payload: DefinePayload::Value(value.into()),
        }
    }

    /// Anonymous definition with an explicit dependency list
    pub fn with_dependencies(
        dependencies: impl IntoIterator<Item = impl Into<String>>,
        f: impl Fn(&ExportsObject, &[Value]) -> Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: None,
            dependencies: Some(dependencies.into_iter().map(Into::into).collect()),
            payload: DefinePayload::Factory(Arc::new(f)),
        }
    }

    /// Fully specified definition: id, dependency list, and factory
    pub fn full(
        id: impl Into<String>,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
        f: impl Fn(&ExportsObject, &[Value]) -> Result<Option<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: Some(id.into()),
            dependencies: Some(dependencies.into_iter().map(Into::into).collect()),
            payload: DefinePayload::Factory(Arc::new(f)),
        }
    }

    pub(crate) fn from_parts(
        id: Option<String>,
        dependencies: Option<Vec<String>>,
        payload: DefinePayload,
    ) -> Self {
        Self {
            id,
            dependencies,
            payload,
        }
    }

    /// Canonicalize a dynamic argument list into a definition.
    ///
    /// One argument is the payload; two arguments are `(id, payload)` when
    /// the first is a string, `(dependencies, payload)` when it is an
    /// array; three arguments are `(id, dependencies, payload)`. A
    /// non-callable payload becomes a precomputed value.
    pub fn from_values(args: &[Value]) -> Result<Self> {
        match args {
            [payload] => Ok(Self::from_parts(None, None, payload_of(payload))),
            [Value::String(id), payload] => {
                Ok(Self::from_parts(Some(id.clone()), None, payload_of(payload)))
            }
            [Value::Array(dependencies), payload] => Ok(Self::from_parts(
                None,
                Some(dependency_ids(dependencies)?),
                payload_of(payload),
            )),
            [Value::String(id), Value::Array(dependencies), payload] => Ok(Self::from_parts(
                Some(id.clone()),
                Some(dependency_ids(dependencies)?),
                payload_of(payload),
            )),
            _ => Err(crate::error::LoaderError::MalformedDefine),
        }
    }
}

fn payload_of(value: &Value) -> DefinePayload {
    match value {
        Value::Function(f) => {
            let f = f.clone();
            DefinePayload::Factory(Arc::new(move |_, args| {
                let result = f.call(args)?;
                Ok(if result.is_undefined() {
                    None
                } else {
                    Some(result)
                })
            }))
        }
        other => DefinePayload::Value(other.clone()),
    }
}

fn dependency_ids(values: &[Value]) -> Result<Vec<String>> {
    values
        .iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or(crate::error::LoaderError::MalformedDefine)
        })
        .collect()
}

pub(crate) struct LoaderInner {
    pub(crate) registry: Registry,
    pub(crate) pending: PendingSet,
    pub(crate) fetches: FetchTracker,
    pub(crate) engine: ResolutionEngine,
    /// Definitions since the last settlement, awaiting id reconciliation
    new_modules: Mutex<Vec<Arc<ModuleRecord>>>,
    /// Records whose dependency normalization and fetch scheduling is
    /// deferred to the next synchronization point
    deferred: Mutex<VecDeque<Arc<ModuleRecord>>>,
    /// Ids marked in-flight but not yet dispatched to the transport
    fetch_queue: Mutex<VecDeque<String>>,
    transport: Box<dyn ScriptTransport>,
    options: LoaderOptions,
}

/// The module loader.
///
/// Cheap to clone; all clones share the same resolution state.
#[derive(Clone)]
pub struct Loader {
    pub(crate) inner: Arc<LoaderInner>,
}

impl Loader {
    /// Create a loader backed by a script transport
    pub fn new(transport: impl ScriptTransport + 'static) -> Self {
        Self::with_options(transport, LoaderOptions::default())
    }

    /// Create a loader with explicit options
    pub fn with_options(transport: impl ScriptTransport + 'static, options: LoaderOptions) -> Self {
        let loader = Self {
            inner: Arc::new(LoaderInner {
                registry: Registry::new(),
                pending: PendingSet::new(),
                fetches: FetchTracker::new(),
                engine: ResolutionEngine::new(),
                new_modules: Mutex::new(Vec::new()),
                deferred: Mutex::new(VecDeque::new()),
                fetch_queue: Mutex::new(VecDeque::new()),
                transport: Box::new(transport),
                options,
            }),
        };
        builtins::register(&loader);
        loader
    }

    pub(crate) fn from_inner(inner: Arc<LoaderInner>) -> Self {
        Self { inner }
    }

    /// The loader's options
    pub fn options(&self) -> &LoaderOptions {
        &self.inner.options
    }

    /// The module registry
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The set of records still awaiting dependency satisfaction
    pub fn pending(&self) -> &PendingSet {
        &self.inner.pending
    }

    /// Fetch state of an id, if a fetch was ever initiated for it
    pub fn fetch_state(&self, id: &str) -> Option<FetchState> {
        self.inner.fetches.state(id)
    }

    /// Define a module.
    ///
    /// Creates the record, registers it under its id (if it has one), adds
    /// it to the reconciliation buffer and (unless born resolved) the
    /// pending set, defers dependency normalization and fetch scheduling to
    /// the next synchronization point, and immediately triggers resolution
    /// to cover definitions whose dependencies are already satisfied.
    ///
    /// Errors from factories invoked by the resolution trigger propagate
    /// from this call.
    pub fn define(&self, definition: Define) -> Result<Arc<ModuleRecord>> {
        let Define {
            id,
            dependencies,
            payload,
        } = definition;
        let dependencies = dependencies.unwrap_or_else(|| {
            DEFAULT_DEPENDENCIES.iter().map(|d| d.to_string()).collect()
        });
        let (factory, value) = match payload {
            DefinePayload::Factory(f) => (Some(f), None),
            DefinePayload::Value(v) => (None, Some(v)),
        };

        let record = ModuleRecord::new(id, dependencies, factory, value);
        tracing::debug!(
            "defined module {:?} with dependencies {:?}",
            record.id(),
            record.dependencies()
        );

        if let Some(record_id) = record.id() {
            self.inner.registry.insert(&record_id, record.clone());
        }
        self.inner.new_modules.lock().push(record.clone());
        if !record.is_resolved() {
            self.inner.pending.push(record.clone());
        }
        for dep in record.dependencies() {
            self.inner.engine.link(&dep, &record);
        }
        self.inner.deferred.lock().push_back(record.clone());

        self.resolve_now()?;
        Ok(record)
    }

    /// Look up the export value of a registered module.
    ///
    /// An unregistered id is an error. A registered but still unresolved
    /// module yields `Undefined` - the partial-visibility contract that lets
    /// a factory inside a mutual cycle observe whatever state exists at call
    /// time.
    pub fn require(&self, id: &str) -> Result<Value> {
        let record = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| crate::error::LoaderError::UnresolvedDependency(id.to_string()))?;
        Ok(record.export_value().unwrap_or(Value::Undefined))
    }

    /// The asynchronous require shape: equivalent to an anonymous
    /// definition with the given dependency list.
    pub fn require_async(
        &self,
        dependencies: impl IntoIterator<Item = impl Into<String>>,
        callback: impl Fn(&ExportsObject, &[Value]) -> Result<Option<Value>> + Send + Sync + 'static,
    ) -> Result<Arc<ModuleRecord>> {
        self.define(Define::with_dependencies(dependencies, callback))
    }

    /// Register a requester-bound built-in under an id and mark it settled
    /// so it is never scheduled for transport.
    pub(crate) fn register_dynamic(&self, id: &str, resolver: crate::record::DynamicResolver) {
        let record = ModuleRecord::dynamic(id, resolver);
        self.inner.registry.insert(id, record);
        self.inner.fetches.settle(id);
    }

    /// Drive deferred work and in-flight fetches until nothing remains.
    ///
    /// Fetches are dispatched sequentially: each transport completion is
    /// settled (definitions reconciled, resolution triggered) before the
    /// next fetch is issued, the cooperative-scheduling rendition of the
    /// original macrotask model. A transport or factory error propagates;
    /// queued work survives the error and a later call picks it up.
    pub async fn run_until_settled(&self) -> Result<()> {
        loop {
            if self.drain_deferred() {
                self.resolve_now()?;
            }
            let next = self.inner.fetch_queue.lock().pop_front();
            let Some(id) = next else {
                if self.inner.deferred.lock().is_empty() {
                    break;
                }
                continue;
            };
            self.fetch(&id).await?;
        }
        Ok(())
    }

    /// Trigger the resolution engine over the current pending set
    fn resolve_now(&self) -> Result<usize> {
        self.inner
            .engine
            .trigger(&self.inner.registry, &self.inner.pending)
    }

    /// Normalize dependencies of all deferred records and schedule fetches.
    ///
    /// Returns `true` if any record was processed.
    fn drain_deferred(&self) -> bool {
        let mut any = false;
        loop {
            let next = self.inner.deferred.lock().pop_front();
            let Some(record) = next else {
                break;
            };
            any = true;
            self.load_dependencies(&record);
        }
        any
    }

    /// Schedule fetches for a record's not-yet-requested dependencies.
    fn load_dependencies(&self, record: &Arc<ModuleRecord>) {
        for dep in record.normalize_dependencies() {
            // relative ids may have been rewritten; refresh the index
            self.inner.engine.link(&dep, record);
            if self.inner.registry.contains(&dep) {
                continue;
            }
            if self.inner.fetches.begin(&dep) {
                tracing::debug!("scheduling fetch for '{}'", dep);
                self.inner.fetch_queue.lock().push_back(dep);
            }
        }
    }

    /// Dispatch one fetch and settle its completion.
    async fn fetch(&self, id: &str) -> Result<()> {
        // Only definitions made during this fetch's in-flight window are
        // reconciled against it. Anything older is either registered under
        // its own id already or a permanent anonymous orphan.
        self.inner.new_modules.lock().clear();

        tracing::debug!("fetching '{}'", id);
        let outcome = self.inner.transport.fetch(id, self).await;
        // The future completed: that is the terminal signal, successful or
        // not. Settle before surfacing any transport error so definitions
        // made prior to the failure are reconciled. A failed fetch never
        // synthesizes - its dependents starve rather than seeing a phantom
        // empty export.
        self.settle(id, outcome.is_ok())?;
        outcome
    }

    /// Process a fetch's terminal completion.
    ///
    /// Drains the reconciliation buffer in arrival order: the first record
    /// still lacking an id is bound to the fetch id; later anonymous
    /// records stay id-less orphans; explicitly named records register
    /// under their own ids. On a successful fetch, if nothing claimed the
    /// fetch id and the registry has no entry for it, an empty-export
    /// record is synthesized so dependents still become ready.
    fn settle(&self, id: &str, synthesize: bool) -> Result<()> {
        let drained: Vec<Arc<ModuleRecord>> = std::mem::take(&mut *self.inner.new_modules.lock());
        let mut claimed = false;

        for record in drained {
            let record_id = match record.id() {
                Some(declared) => declared,
                None if claimed => {
                    tracing::debug!("extra anonymous definition from '{}' left as orphan", id);
                    continue;
                }
                None => {
                    record.set_id(id);
                    id.to_string()
                }
            };
            if record_id == id {
                claimed = true;
            }
            self.inner.registry.insert(&record_id, record);
        }

        if synthesize && !claimed && !self.inner.registry.contains(id) {
            tracing::debug!("fetch for '{}' defined no modules, synthesizing empty export", id);
            let empty = ModuleRecord::new(Some(id.to_string()), Vec::new(), None, None);
            self.inner.registry.insert(id, empty);
        }

        self.inner.fetches.settle(id);
        tracing::debug!("fetch for '{}' settled", id);
        self.resolve_now()?;
        Ok(())
    }
}
