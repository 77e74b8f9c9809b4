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

//! Directory-backed record store: one JSON file per record at
//! `<root>/<kind>/<id>.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    canonical_key_of, document_canonical_key, new_document, set_status, validate_id, RecordStore,
    StoreError, StoreResult,
};

const RECORD_EXTENSION: &str = "json";

pub struct FileStore {
    root: PathBuf,
    // Serializes read-modify-write sequences within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: &str) -> StoreResult<PathBuf> {
        validate_id(kind)?;
        Ok(self.root.join(kind))
    }

    fn record_path(&self, kind: &str, id: &str) -> StoreResult<PathBuf> {
        validate_id(id)?;
        Ok(self
            .kind_dir(kind)?
            .join(format!("{id}.{RECORD_EXTENSION}")))
    }

    async fn read(&self, path: &Path) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(path, err)),
        }
    }

    /// Writes through a temporary file so readers never see a partial record.
    async fn write(&self, path: &Path, data: &[u8]) -> StoreResult<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|err| io_error(dir, err))?;
        }
        let tmp = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
        fs::write(&tmp, data)
            .await
            .map_err(|err| io_error(&tmp, err))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|err| io_error(path, err))
    }

    async fn find_by_canonical_key(&self, kind: &str, key: &str) -> StoreResult<Option<String>> {
        for id in self.list(kind).await? {
            let Some(data) = self.read(&self.record_path(kind, &id)?).await? else {
                continue;
            };
            let Ok(doc) = serde_json::from_slice::<Value>(&data) else {
                tracing::warn!(kind, id = %id, "skipping unreadable record");
                continue;
            };
            if document_canonical_key(&doc) == Some(key) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn load(&self, kind: &str, id: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.record_path(kind, id)?;
        self.read(&path).await
    }

    async fn save(&self, kind: &str, id: &str, data: &[u8]) -> StoreResult<()> {
        let path = self.record_path(kind, id)?;
        let _guard = self.write_lock.lock().await;
        self.write(&path, data).await
    }

    async fn create(&self, kind: &str, fields: &Value) -> StoreResult<String> {
        let _guard = self.write_lock.lock().await;

        if let Some(key) = canonical_key_of(fields) {
            if let Some(id) = self.find_by_canonical_key(kind, key).await? {
                tracing::debug!(kind, id = %id, key, "reusing existing record");
                return Ok(id);
            }
        }

        let id = Uuid::new_v4().to_string();
        let doc = serde_json::to_vec_pretty(&new_document(&id, fields))?;
        self.write(&self.record_path(kind, &id)?, &doc).await?;
        Ok(id)
    }

    async fn update_status(&self, kind: &str, id: &str, status: &Value) -> StoreResult<()> {
        let path = self.record_path(kind, id)?;
        let _guard = self.write_lock.lock().await;

        let data = self.read(&path).await?.ok_or_else(|| StoreError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        })?;
        let mut doc: Value = serde_json::from_slice(&data)?;
        set_status(&mut doc, status)?;
        self.write(&path, &serde_json::to_vec_pretty(&doc)?).await
    }

    async fn list(&self, kind: &str) -> StoreResult<Vec<String>> {
        let dir = self.kind_dir(kind)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&dir, err)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_error(&dir, err))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
