// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script transport - the collaborator that makes module ids available.
//!
//! The core does not care how a transport is implemented (dynamic import,
//! network fetch, in-process registration) as long as each requested id gets
//! exactly one terminal completion. Expressing the transport as a future
//! enforces that by construction: the loader settles a fetch exactly once,
//! when the future completes.

use crate::error::{LoaderError, Result};
use crate::loader::Loader;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Fetches the resource expected to define a module id.
///
/// An implementation makes zero or more definitions available by calling
/// [`Loader::define`] on the provided loader handle before returning.
/// Returning is the terminal completion signal, successful or not; the
/// loader reconciles whatever was defined either way. Implementations must
/// not complete before the loader's scheduling call returns (any genuine
/// `.await` satisfies this).
#[async_trait]
pub trait ScriptTransport: Send + Sync {
    /// Make the resource for `id` available
    async fn fetch(&self, id: &str, loader: &Loader) -> Result<()>;
}

/// Body of a registered in-process script
pub type ScriptBody = Arc<dyn Fn(&Loader) -> Result<()> + Send + Sync>;

/// In-process transport backed by a map of scripts.
///
/// Each registered script is a closure that issues definitions against the
/// loader, standing in for the evaluation of a fetched resource. Fetching an
/// unregistered id fails, like a request for a resource that does not exist.
pub struct StaticTransport {
    scripts: DashMap<String, ScriptBody>,
}

impl StaticTransport {
    /// Create a transport with no scripts registered
    pub fn new() -> Self {
        Self {
            scripts: DashMap::new(),
        }
    }

    /// Register the script evaluated when `id` is fetched
    pub fn insert(
        &self,
        id: impl Into<String>,
        script: impl Fn(&Loader) -> Result<()> + Send + Sync + 'static,
    ) {
        self.scripts.insert(id.into(), Arc::new(script));
    }

    /// Number of registered scripts
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Check whether no scripts are registered
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl Default for StaticTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptTransport for StaticTransport {
    async fn fetch(&self, id: &str, loader: &Loader) -> Result<()> {
        // completion must not be synchronous with the scheduling call
        tokio::task::yield_now().await;

        let script = self
            .scripts
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LoaderError::transport(id, "no script registered"))?;
        script(loader)
    }
}
