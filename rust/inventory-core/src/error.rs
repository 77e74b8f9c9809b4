/*
 * Copyright 2025 Carver Automation Corporation.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Error types for discovery, normalization and reconciliation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while discovering or reconciling inventory.
#[derive(Error, Debug)]
pub enum Error {
    /// The root systems collection could not be fetched or decoded.
    #[error("discovery failed: {cause}")]
    Discovery { cause: String },

    /// A discovery run found nothing to inventory.
    #[error("discovery of {endpoint} found no components")]
    EmptyResult { endpoint: String },

    /// A create or status update call failed while posting the device graph.
    #[error("normalization failed for {record}: {cause}")]
    Normalization { record: String, cause: String },

    /// A snapshot phase transition could not be written.
    #[error("failed to persist snapshot {id}: {source}")]
    Persistence {
        id: String,
        #[source]
        source: StoreError,
    },

    /// The stored resource does not have the snapshot shape.
    #[error("invalid resource {id}: {reason}")]
    InvalidResource { id: String, reason: String },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The HTTP request could not be sent or its body could not be read.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The remote endpoint answered with a non-success status.
    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    /// Failed to encode or decode JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid client or controller configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a scheduler should retry the same input later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Persistence { .. }
                | Error::Cancelled
                | Error::Transport { .. }
                | Error::HttpStatus { .. }
        )
    }
}

/// A non-fatal problem found during a walk. The affected branch is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeWarning {
    pub locator: String,
    pub reason: String,
}

impl DecodeWarning {
    pub fn new(locator: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            locator: locator.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.locator, self.reason)
    }
}
