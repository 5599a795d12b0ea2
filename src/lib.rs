// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # skyhook
//!
//! An asynchronous AMD-style module loader and dependency resolution engine.
//!
//! Skyhook discovers module definitions as they arrive - from dynamically
//! fetched scripts or inline registration - builds the dependency graph
//! incrementally, and invokes each module's factory exactly once, the moment
//! its dependencies are satisfied. Mutual dependencies between two modules
//! are tolerated; the later-resolved side observes the earlier one's final
//! export, the earlier side observes whatever state exists at call time.
//!
//! The transport that actually fetches a script is a collaborator behind the
//! [`ScriptTransport`] trait; [`StaticTransport`] ships as an in-process
//! implementation for tests and embedders that register scripts ahead of
//! time.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use skyhook::{Define, Loader, StaticTransport, Value};
//!
//! #[tokio::main]
//! async fn main() -> skyhook::Result<()> {
//!     let transport = StaticTransport::new();
//!     transport.insert("a", |loader: &Loader| {
//!         loader.define(Define::named_value("a", 2.0))?;
//!         Ok(())
//!     });
//!     transport.insert("b", |loader: &Loader| {
//!         loader.define(Define::named_value("b", 3.0))?;
//!         Ok(())
//!     });
//!
//!     let loader = Loader::new(transport);
//!     let sum = loader.define(Define::with_dependencies(["a", "b"], |_, args| {
//!         let (a, b) = (args[0].as_number().unwrap(), args[1].as_number().unwrap());
//!         Ok(Some(Value::Number(a + b)))
//!     }))?;
//!
//!     loader.run_until_settled().await?;
//!     assert_eq!(sum.export_value(), Some(Value::Number(5.0)));
//!     Ok(())
//! }
//! ```
//!
//! ## Built-in pseudo-modules
//!
//! Three dependency ids are always available and never fetched: `require`
//! (a callable bound to the requesting module, with a `toUrl` helper),
//! `exports` (the requester's mutable exports container), and `module` (the
//! requesting record itself). A definition that omits its dependency list
//! gets exactly this triad.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod loader;
pub mod pending;
pub mod record;
pub mod registry;
pub mod transport;
pub mod value;

mod builtins;
mod resolve;

// Re-exports
pub use error::{LoaderError, Result};
pub use loader::{DEFAULT_DEPENDENCIES, Define, DefinePayload, Loader, LoaderOptions};
pub use pending::PendingSet;
pub use record::{DynamicResolver, Export, ModuleFactory, ModuleRecord};
pub use registry::{FetchState, FetchTracker, Registry};
pub use transport::{ScriptBody, ScriptTransport, StaticTransport};
pub use value::{ExportsObject, NativeFunction, Value};

/// Version of the skyhook loader
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
