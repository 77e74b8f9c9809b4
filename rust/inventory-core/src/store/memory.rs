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

//! In-process record store. Keeps a log of every write for inspection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use super::{
    canonical_key_of, document_canonical_key, new_document, set_status, RecordStore, StoreError,
    StoreResult,
};

/// A write performed against a [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Save { kind: String, id: String },
    Create { kind: String, id: String, name: Option<String> },
    UpdateStatus { kind: String, id: String },
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<(String, String), Vec<u8>>,
    ops: Vec<StoreOp>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document without recording a write.
    pub fn seed(&self, kind: &str, id: &str, data: Vec<u8>) {
        self.inner
            .lock()
            .records
            .insert((kind.to_string(), id.to_string()), data);
    }

    pub fn get_json(&self, kind: &str, id: &str) -> Option<Value> {
        let inner = self.inner.lock();
        let data = inner.records.get(&(kind.to_string(), id.to_string()))?;
        serde_json::from_slice(data).ok()
    }

    /// All writes so far, in call order.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.inner.lock().ops.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().ops.len()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.inner
            .lock()
            .records
            .keys()
            .filter(|(k, _)| k == kind)
            .count()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, kind: &str, id: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .inner
            .lock()
            .records
            .get(&(kind.to_string(), id.to_string()))
            .cloned())
    }

    async fn save(&self, kind: &str, id: &str, data: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner
            .records
            .insert((kind.to_string(), id.to_string()), data.to_vec());
        inner.ops.push(StoreOp::Save {
            kind: kind.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    async fn create(&self, kind: &str, fields: &Value) -> StoreResult<String> {
        let name = fields.get("name").and_then(Value::as_str).map(str::to_string);
        let mut inner = self.inner.lock();

        let existing = canonical_key_of(fields).and_then(|key| {
            inner.records.iter().find_map(|((k, id), data)| {
                if k != kind {
                    return None;
                }
                let doc: Value = serde_json::from_slice(data).ok()?;
                (document_canonical_key(&doc) == Some(key)).then(|| id.clone())
            })
        });

        let id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                let doc = serde_json::to_vec(&new_document(&id, fields))?;
                inner.records.insert((kind.to_string(), id.clone()), doc);
                id
            }
        };

        inner.ops.push(StoreOp::Create {
            kind: kind.to_string(),
            id: id.clone(),
            name,
        });
        Ok(id)
    }

    async fn update_status(&self, kind: &str, id: &str, status: &Value) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let key = (kind.to_string(), id.to_string());
        let data = inner.records.get(&key).ok_or_else(|| StoreError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        })?;

        let mut doc: Value = serde_json::from_slice(data)?;
        set_status(&mut doc, status)?;
        inner.records.insert(key, serde_json::to_vec(&doc)?);
        inner.ops.push(StoreOp::UpdateStatus {
            kind: kind.to_string(),
            id: id.to_string(),
        });
        Ok(())
    }

    async fn list(&self, kind: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .records
            .keys()
            .filter(|(k, _)| k == kind)
            .map(|(_, id)| id.clone())
            .collect())
    }
}
