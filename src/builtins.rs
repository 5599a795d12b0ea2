// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Built-in pseudo-modules: `require`, `exports`, `module`.
//!
//! All three are requester-bound: their value depends on which module is
//! asking, not on a single fixed export. They are pre-registered with a
//! settled fetch state and are never scheduled for transport.

use crate::error::LoaderError;
use crate::loader::{Define, DefinePayload, Loader, LoaderInner};
use crate::record::ModuleRecord;
use crate::value::{NativeFunction, Value};
use std::sync::{Arc, Weak};

pub(crate) fn register(loader: &Loader) {
    let weak = Arc::downgrade(&loader.inner);
    loader.register_dynamic(
        "require",
        Arc::new(move |requester| bound_require(weak.clone(), requester)),
    );
    loader.register_dynamic(
        "exports",
        Arc::new(|requester| Value::Object(requester.exports().clone())),
    );
    loader.register_dynamic("module", Arc::new(|requester| Value::Module(requester.clone())));
}

/// Build the require function bound to a requesting module.
///
/// Supports `(id)` - synchronous registry lookup - and
/// `(dependencies, callback)` - a new anonymous definition. Any other
/// argument shape is malformed. Carries a `toUrl` property joining the
/// requester's id with a relative path.
fn bound_require(weak: Weak<LoaderInner>, requester: &Arc<ModuleRecord>) -> Value {
    let function = NativeFunction::new(move |args| {
        let Some(inner) = weak.upgrade() else {
            return Err(LoaderError::generic("loader no longer alive"));
        };
        let loader = Loader::from_inner(inner);
        match args {
            [Value::String(id)] => loader.require(id),
            [Value::Array(dependencies), Value::Function(callback)] => {
                let mut ids = Vec::with_capacity(dependencies.len());
                for dep in dependencies {
                    match dep.as_str() {
                        Some(id) => ids.push(id.to_string()),
                        None => return Err(LoaderError::MalformedRequire),
                    }
                }
                let callback = callback.clone();
                let factory: crate::record::ModuleFactory = Arc::new(move |_, values| {
                    let result = callback.call(values)?;
                    Ok(if result.is_undefined() {
                        None
                    } else {
                        Some(result)
                    })
                });
                loader.define(Define::from_parts(
                    None,
                    Some(ids),
                    DefinePayload::Factory(factory),
                ))?;
                Ok(Value::Undefined)
            }
            _ => Err(LoaderError::MalformedRequire),
        }
    });

    let requester = requester.clone();
    function.set_property(
        "toUrl",
        Value::Function(NativeFunction::new(move |args| match args {
            [Value::String(path)] => {
                let base = requester.id().unwrap_or_default();
                Ok(Value::String(format!("{}/{}", base, path)))
            }
            _ => Err(LoaderError::MalformedRequire),
        })),
    );

    Value::Function(function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Define;
    use crate::transport::StaticTransport;
    use parking_lot::Mutex;

    fn loader() -> Loader {
        Loader::new(StaticTransport::new())
    }

    fn bound_require_for(loader: &Loader, id: &str) -> NativeFunction {
        let record =
            ModuleRecord::new(Some(id.to_string()), Vec::new(), None, Some(Value::Null));
        match bound_require(Arc::downgrade(&loader.inner), &record) {
            Value::Function(f) => f,
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_shape() {
        let loader = loader();
        loader.define(Define::named_value("answer", 42.0)).unwrap();

        let require = bound_require_for(&loader, "asker");
        assert_eq!(
            require.call(&[Value::from("answer")]).unwrap(),
            Value::Number(42.0)
        );
    }

    #[test]
    fn test_lookup_shape_missing_id() {
        let loader = loader();
        let require = bound_require_for(&loader, "asker");
        match require.call(&[Value::from("missing")]) {
            Err(LoaderError::UnresolvedDependency(id)) => assert_eq!(id, "missing"),
            other => panic!("expected UnresolvedDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_async_shape_defines_anonymously() {
        let loader = loader();
        loader.define(Define::named_value("two", 2.0)).unwrap();

        let got = Arc::new(Mutex::new(None));
        let got_in_callback = got.clone();
        let require = bound_require_for(&loader, "asker");
        let callback = Value::Function(NativeFunction::new(move |args| {
            *got_in_callback.lock() = Some(args[0].clone());
            Ok(Value::Undefined)
        }));
        let deps = Value::Array(vec![Value::from("two")]);
        require.call(&[deps, callback]).unwrap();

        assert_eq!(got.lock().take(), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_malformed_shapes() {
        let loader = loader();
        let require = bound_require_for(&loader, "asker");

        assert!(matches!(
            require.call(&[Value::Number(3.0)]),
            Err(LoaderError::MalformedRequire)
        ));
        assert!(matches!(
            require.call(&[]),
            Err(LoaderError::MalformedRequire)
        ));
        // a dependency list without a callback is malformed too
        assert!(matches!(
            require.call(&[Value::Array(vec![])]),
            Err(LoaderError::MalformedRequire)
        ));
    }

    #[test]
    fn test_to_url_joins_requester_id() {
        let loader = loader();
        let require = bound_require_for(&loader, "app/main");
        let to_url = match require.property("toUrl") {
            Some(Value::Function(f)) => f,
            other => panic!("expected toUrl function, got {:?}", other),
        };
        assert_eq!(
            to_url.call(&[Value::from("templates/home")]).unwrap(),
            Value::from("app/main/templates/home")
        );
    }
}
