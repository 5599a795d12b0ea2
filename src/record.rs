// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module records - the resolvable unit of the loader.
//!
//! A record carries an optional id (absent until an anonymous definition is
//! reconciled against the fetch that produced it), an ordered dependency
//! list, an export slot, and the mutable exports container handed to the
//! factory.

use crate::error::{LoaderError, Result};
use crate::registry::Registry;
use crate::value::{ExportsObject, Value};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Signature of a module factory.
///
/// Invoked with the module's exports container and its dependency values in
/// dependency order. `Ok(None)` means the factory returned nothing, in which
/// case the exports container becomes the export value.
pub type ModuleFactory =
    Arc<dyn Fn(&ExportsObject, &[Value]) -> Result<Option<Value>> + Send + Sync>;

/// Signature of a requester-bound resolver for built-in pseudo-modules.
pub type DynamicResolver = Arc<dyn Fn(&Arc<ModuleRecord>) -> Value + Send + Sync>;

/// The export slot of a module record.
///
/// Exactly one variant at all times; `Factory -> Static` is the only
/// transition and happens at most once.
pub enum Export {
    /// Deferred export: the factory has not been invoked yet
    Factory(ModuleFactory),
    /// Resolved export value (immutable once set)
    Static(Value),
    /// Requester-bound export: the value depends on who is asking
    Dynamic(DynamicResolver),
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Factory(_) => write!(f, "Factory(..)"),
            Export::Static(v) => write!(f, "Static({:?})", v),
            Export::Dynamic(_) => write!(f, "Dynamic(..)"),
        }
    }
}

/// A module definition awaiting or holding its export value.
pub struct ModuleRecord {
    id: RwLock<Option<String>>,
    dependencies: RwLock<Vec<String>>,
    export: RwLock<Export>,
    exports: ExportsObject,
}

impl ModuleRecord {
    /// Create a record from a definition.
    ///
    /// Without a factory the record is born resolved: the export slot is set
    /// immediately to the precomputed value, or to the (empty) exports
    /// container, so static-value modules follow the same readiness contract
    /// as factory modules.
    pub fn new(
        id: Option<String>,
        dependencies: Vec<String>,
        factory: Option<ModuleFactory>,
        value: Option<Value>,
    ) -> Arc<Self> {
        let exports = ExportsObject::new();
        let export = match factory {
            Some(f) => Export::Factory(f),
            None => Export::Static(value.unwrap_or_else(|| Value::Object(exports.clone()))),
        };
        Arc::new(Self {
            id: RwLock::new(id),
            dependencies: RwLock::new(dependencies),
            export: RwLock::new(export),
            exports,
        })
    }

    /// Create a requester-bound record for a built-in pseudo-module.
    pub(crate) fn dynamic(id: &str, resolver: DynamicResolver) -> Arc<Self> {
        Arc::new(Self {
            id: RwLock::new(Some(id.to_string())),
            dependencies: RwLock::new(Vec::new()),
            export: RwLock::new(Export::Dynamic(resolver)),
            exports: ExportsObject::new(),
        })
    }

    /// The module's id, if it has been assigned one
    pub fn id(&self) -> Option<String> {
        self.id.read().clone()
    }

    /// Assign the id of the fetch this record was reconciled against
    pub(crate) fn set_id(&self, id: &str) {
        *self.id.write() = Some(id.to_string());
    }

    /// The module's dependency ids, in declaration order
    pub fn dependencies(&self) -> Vec<String> {
        self.dependencies.read().clone()
    }

    /// The mutable exports container passed to the factory
    pub fn exports(&self) -> &ExportsObject {
        &self.exports
    }

    /// Whether the export value has been set
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.export.read(), Export::Static(_))
    }

    /// The resolved export value, or `None` while unresolved (or
    /// requester-bound)
    pub fn export_value(&self) -> Option<Value> {
        match &*self.export.read() {
            Export::Static(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Whether the export is available to any dependent without invoking a
    /// factory: resolved, or requester-bound (built-ins are always ready).
    fn has_available_export(&self) -> bool {
        matches!(&*self.export.read(), Export::Static(_) | Export::Dynamic(_))
    }

    /// Clone the factory out of the slot, if the record is still deferred
    pub(crate) fn factory(&self) -> Option<ModuleFactory> {
        match &*self.export.read() {
            Export::Factory(f) => Some(f.clone()),
            _ => None,
        }
    }

    /// Set the export value from a factory result.
    ///
    /// `None` (the factory returned nothing) selects the exports container.
    /// Only transitions a deferred slot; a resolved slot is never
    /// overwritten.
    pub(crate) fn complete(&self, value: Option<Value>) {
        let mut slot = self.export.write();
        if matches!(&*slot, Export::Factory(_)) {
            *slot = Export::Static(value.unwrap_or_else(|| Value::Object(self.exports.clone())));
        }
    }

    /// Rewrite relative dependency ids against this module's own id.
    ///
    /// A dependency starting with `.` is joined onto the path-segment prefix
    /// of this module's id (everything up to and including the last `/`); an
    /// id with no separator, or no id at all, treats its directory as root.
    /// After joining, `/./` sequences collapse left to right in a single
    /// pass. `..` segments pass through verbatim. Returns the normalized
    /// dependency list.
    pub(crate) fn normalize_dependencies(&self) -> Vec<String> {
        let own = self.id();
        let mut deps = self.dependencies.write();
        for dep in deps.iter_mut() {
            if dep.starts_with('.') {
                *dep = normalize_relative(own.as_deref(), dep);
            }
        }
        deps.clone()
    }

    /// Check whether every dependency of this record is satisfied.
    ///
    /// A dependency is satisfied when it is registered and has an available
    /// export, when it is blocked only by a cycle back to this module
    /// (checked by asking the dependency's own readiness while ignoring this
    /// record's id), or when it equals the explicitly ignored id. The
    /// recursion is one level deep by design: mutual dependencies between
    /// two modules are tolerated, longer cycles are not.
    pub(crate) fn is_ready(&self, registry: &Registry, ignore: Option<&str>) -> bool {
        let deps = self.dependencies();
        for dep_id in &deps {
            let Some(dep) = registry.get(dep_id) else {
                return false;
            };
            if dep.has_available_export() {
                continue;
            }
            if ignore.is_none() {
                let own = self.id();
                if dep.is_ready(registry, own.as_deref()) {
                    continue;
                }
            }
            if let (Some(ignored), Some(dep_id)) = (ignore, dep.id()) {
                if ignored == dep_id {
                    continue;
                }
            }
            return false;
        }
        true
    }

    /// Get the value of a dependency for this record.
    ///
    /// Requester-bound exports are resolved against this record; resolved
    /// exports are cloned; a dependency that is registered but still
    /// deferred yields `Undefined` (the partial-visibility contract for
    /// mutual cycles). An unregistered id is an error, never a silent
    /// undefined.
    pub(crate) fn dependency_value(self: &Arc<Self>, registry: &Registry, id: &str) -> Result<Value> {
        let dep = registry
            .get(id)
            .ok_or_else(|| LoaderError::UnresolvedDependency(id.to_string()))?;
        let resolver = match &*dep.export.read() {
            Export::Static(v) => return Ok(v.clone()),
            Export::Factory(_) => return Ok(Value::Undefined),
            Export::Dynamic(r) => r.clone(),
        };
        Ok(resolver(self))
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id())
            .field("dependencies", &self.dependencies())
            .field("export", &*self.export.read())
            .finish()
    }
}

fn normalize_relative(own: Option<&str>, dep: &str) -> String {
    let prefix = own.and_then(|own_id| own_id.rfind('/').map(|at| &own_id[..=at]));
    let joined = match prefix {
        Some(prefix) => format!("{}{}", prefix, dep),
        None => format!("/{}", dep),
    };
    collapse_current_dir(&joined)
}

/// Collapse `/./` sequences in a single left-to-right pass.
fn collapse_current_dir(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find("/./") {
        out.push_str(&rest[..pos + 1]);
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn factory_stub() -> ModuleFactory {
        Arc::new(|_, _| Ok(Some(Value::Null)))
    }

    #[test]
    fn test_static_value_record_is_born_resolved() {
        let record = ModuleRecord::new(
            Some("config".into()),
            Vec::new(),
            None,
            Some(Value::from(3.0)),
        );
        assert!(record.is_resolved());
        assert_eq!(record.export_value(), Some(Value::Number(3.0)));
    }

    #[test]
    fn test_record_without_factory_or_value_exports_container() {
        let record = ModuleRecord::new(Some("empty".into()), Vec::new(), None, None);
        assert!(record.is_resolved());
        match record.export_value() {
            Some(Value::Object(obj)) => assert!(obj.ptr_eq(record.exports())),
            other => panic!("expected exports container, got {:?}", other),
        }
    }

    #[test]
    fn test_complete_sets_value_at_most_once() {
        let record = ModuleRecord::new(None, Vec::new(), Some(factory_stub()), None);
        assert!(!record.is_resolved());

        record.complete(Some(Value::from(1.0)));
        record.complete(Some(Value::from(2.0)));
        assert_eq!(record.export_value(), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_complete_without_value_uses_exports_container() {
        let record = ModuleRecord::new(None, Vec::new(), Some(factory_stub()), None);
        record.exports().set("x", Value::from(1.0));
        record.complete(None);
        match record.export_value() {
            Some(Value::Object(obj)) => assert!(obj.ptr_eq(record.exports())),
            other => panic!("expected exports container, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_relative_against_own_path() {
        let record = ModuleRecord::new(
            Some("app/main".into()),
            vec!["./util".into(), "lib/log".into()],
            Some(factory_stub()),
            None,
        );
        assert_eq!(record.normalize_dependencies(), vec!["app/util", "lib/log"]);
    }

    #[test]
    fn test_normalize_treats_separatorless_id_as_root() {
        let record = ModuleRecord::new(
            Some("main".into()),
            vec!["./util".into()],
            Some(factory_stub()),
            None,
        );
        assert_eq!(record.normalize_dependencies(), vec!["/util"]);
    }

    #[test]
    fn test_normalize_anonymous_record_as_root() {
        let record = ModuleRecord::new(None, vec!["./util".into()], Some(factory_stub()), None);
        assert_eq!(record.normalize_dependencies(), vec!["/util"]);
    }

    #[test]
    fn test_normalize_passes_parent_segments_through() {
        let record = ModuleRecord::new(
            Some("app/main".into()),
            vec!["../shared".into()],
            Some(factory_stub()),
            None,
        );
        assert_eq!(record.normalize_dependencies(), vec!["app/../shared"]);
    }

    #[test]
    fn test_collapse_is_single_pass() {
        // Matches a single global left-to-right replacement: overlapping
        // markers survive one pass.
        assert_eq!(collapse_current_dir("a/././b"), "a/./b");
        assert_eq!(collapse_current_dir("a/./b/./c"), "a/b/c");
    }

    #[test]
    fn test_missing_dependency_is_not_ready() {
        let registry = Registry::new();
        let record = ModuleRecord::new(
            Some("a".into()),
            vec!["b".into()],
            Some(factory_stub()),
            None,
        );
        assert!(!record.is_ready(&registry, None));
    }

    #[test]
    fn test_resolved_dependency_is_ready() {
        let registry = Registry::new();
        let b = ModuleRecord::new(Some("b".into()), Vec::new(), None, Some(Value::from(1.0)));
        registry.insert("b", b);

        let record = ModuleRecord::new(
            Some("a".into()),
            vec!["b".into()],
            Some(factory_stub()),
            None,
        );
        assert!(record.is_ready(&registry, None));
    }

    #[test]
    fn test_mutual_cycle_is_tolerated() {
        let registry = Registry::new();
        let a = ModuleRecord::new(
            Some("a".into()),
            vec!["b".into()],
            Some(factory_stub()),
            None,
        );
        let b = ModuleRecord::new(
            Some("b".into()),
            vec!["a".into()],
            Some(factory_stub()),
            None,
        );
        registry.insert("a", a.clone());
        registry.insert("b", b.clone());

        assert!(a.is_ready(&registry, None));
        assert!(b.is_ready(&registry, None));
    }

    #[test]
    fn test_three_cycle_is_not_tolerated() {
        let registry = Registry::new();
        let ids = ["a", "b", "c"];
        let records: Vec<_> = ids
            .iter()
            .zip(["b", "c", "a"])
            .map(|(id, dep)| {
                let r = ModuleRecord::new(
                    Some((*id).into()),
                    vec![dep.into()],
                    Some(factory_stub()),
                    None,
                );
                registry.insert(id, r.clone());
                r
            })
            .collect();

        for record in &records {
            assert!(!record.is_ready(&registry, None));
        }
    }

    #[test]
    fn test_deferred_dependency_value_is_undefined() {
        let registry = Registry::new();
        let b = ModuleRecord::new(Some("b".into()), Vec::new(), Some(factory_stub()), None);
        registry.insert("b", b);

        let a = ModuleRecord::new(
            Some("a".into()),
            vec!["b".into()],
            Some(factory_stub()),
            None,
        );
        assert_eq!(a.dependency_value(&registry, "b").unwrap(), Value::Undefined);
    }

    #[test]
    fn test_unregistered_dependency_value_is_an_error() {
        let registry = Registry::new();
        let a = ModuleRecord::new(
            Some("a".into()),
            vec!["b".into()],
            Some(factory_stub()),
            None,
        );
        match a.dependency_value(&registry, "b") {
            Err(LoaderError::UnresolvedDependency(id)) => assert_eq!(id, "b"),
            other => panic!("expected UnresolvedDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_dynamic_dependency_resolves_per_requester() {
        let registry = Registry::new();
        let dynamic = ModuleRecord::dynamic(
            "who",
            Arc::new(|requester| match requester.id() {
                Some(id) => Value::String(id),
                None => Value::Undefined,
            }),
        );
        registry.insert("who", dynamic);

        let a = ModuleRecord::new(
            Some("a".into()),
            vec!["who".into()],
            Some(factory_stub()),
            None,
        );
        assert!(a.is_ready(&registry, None));
        assert_eq!(
            a.dependency_value(&registry, "who").unwrap(),
            Value::from("a")
        );
    }
}
