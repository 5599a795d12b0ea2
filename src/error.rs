// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the module loader

use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Errors that can occur while defining, resolving, or fetching modules
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A bound `require` was invoked with arguments matching neither the
    /// synchronous lookup shape nor the async definition shape
    #[error("malformed require")]
    MalformedRequire,

    /// A dynamic `define` call was invoked with an unrecognized argument shape
    #[error("malformed define")]
    MalformedDefine,

    /// An id was dereferenced with no registry entry for it
    #[error("no module registered for '{0}'")]
    UnresolvedDependency(String),

    /// A module factory failed while computing its export value
    #[error("factory for module '{module}' failed: {reason}")]
    Factory {
        /// Id of the module whose factory failed, or `<anonymous>`
        module: String,
        /// Reason for failure
        reason: String,
    },

    /// The script transport failed to make a module id available
    #[error("transport failed for '{id}': {reason}")]
    Transport {
        /// The requested module id
        id: String,
        /// Reason for failure
        reason: String,
    },

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

impl LoaderError {
    /// Create a factory failure for a module
    pub fn factory(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Factory {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport failure for an id
    pub fn transport(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a generic error with a message
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }
}
