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

//! Durable record storage.
//!
//! Records are JSON documents addressed by `(kind, id)`:
//!
//! ```json
//! { "metadata": { "uid": "...", "name": "..." }, "spec": { ... }, "status": { ... } }
//! ```

mod file;
mod http;
mod memory;

pub use file::FileStore;
pub use http::InventoryApiStore;
pub use memory::{MemoryStore, StoreOp};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Kind of canonical device records.
pub const DEVICE_KIND: &str = "Device";

/// Kind of discovery snapshot records.
pub const SNAPSHOT_KIND: &str = "DiscoverySnapshot";

/// Create field carrying a stable identity. Stores that understand it return
/// the existing id instead of creating a second record with the same key.
pub const CANONICAL_KEY_FIELD: &str = "canonicalKey";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("invalid record id {0:?}")]
    InvalidId(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("inventory API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence contract used by the normalizer and the snapshot reconciler.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the stored document, or `None` if there is no such record.
    async fn load(&self, kind: &str, id: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes a whole document under a caller-chosen id.
    async fn save(&self, kind: &str, id: &str, data: &[u8]) -> StoreResult<()>;

    /// Creates a record from metadata `fields` and returns its assigned id.
    async fn create(&self, kind: &str, fields: &Value) -> StoreResult<String>;

    /// Replaces the status block of an existing record.
    async fn update_status(&self, kind: &str, id: &str, status: &Value) -> StoreResult<()>;

    /// Ids of every record of `kind`.
    async fn list(&self, kind: &str) -> StoreResult<Vec<String>>;
}

/// Builds the document for a freshly created record.
pub(crate) fn new_document(id: &str, fields: &Value) -> Value {
    let mut metadata = match fields {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    metadata.insert("uid".to_string(), Value::String(id.to_string()));

    let mut doc = Map::new();
    doc.insert("metadata".to_string(), Value::Object(metadata));
    doc.insert("spec".to_string(), Value::Object(Map::new()));
    doc.insert("status".to_string(), Value::Object(Map::new()));
    Value::Object(doc)
}

/// Replaces the status block of `doc`.
pub(crate) fn set_status(doc: &mut Value, status: &Value) -> StoreResult<()> {
    match doc {
        Value::Object(map) => {
            map.insert("status".to_string(), status.clone());
            Ok(())
        }
        _ => Err(StoreError::Backend("stored record is not a JSON object".to_string())),
    }
}

pub(crate) fn canonical_key_of(fields: &Value) -> Option<&str> {
    fields.get(CANONICAL_KEY_FIELD).and_then(Value::as_str)
}

pub(crate) fn document_canonical_key(doc: &Value) -> Option<&str> {
    doc.get("metadata").and_then(canonical_key_of)
}

/// Rejects ids that cannot be used as a single path segment.
pub(crate) fn validate_id(id: &str) -> StoreResult<()> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}
