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

//! Posts a discovered component tree as canonical device records.
//!
//! The tree is two levels deep, so creation runs in two passes: every root
//! is created and indexed by its `sourceURI` before any child is looked at.
//! Children then resolve their parent through that index.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::model::{ComponentRecord, DeviceKind, DiscoveryReport};
use crate::store::{RecordStore, CANONICAL_KEY_FIELD, DEVICE_KIND};

/// One device created (or matched) during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedDevice {
    pub uid: String,
    pub name: String,
    pub kind: DeviceKind,
    #[serde(rename = "sourceURI")]
    pub source_uri: String,
    #[serde(rename = "parentID", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizationSummary {
    pub created: Vec<CreatedDevice>,
    /// `sourceURI`s of children whose parent was never created.
    pub skipped: Vec<String>,
}

impl NormalizationSummary {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    pub fn uid_for(&self, source_uri: &str) -> Option<&str> {
        self.created
            .iter()
            .find(|d| d.source_uri == source_uri)
            .map(|d| d.uid.as_str())
    }
}

impl fmt::Display for NormalizationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} device(s) created", self.created.len())?;
        if !self.skipped.is_empty() {
            write!(f, ", {} skipped", self.skipped.len())?;
        }
        Ok(())
    }
}

pub struct GraphNormalizer {
    store: Arc<dyn RecordStore>,
}

impl GraphNormalizer {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Creates one device per record, roots first, and links children to the
    /// id their parent was assigned.
    ///
    /// Any create or status update failure aborts the run with
    /// [`Error::Normalization`]; records already posted stay posted.
    pub async fn normalize(
        &self,
        report: &DiscoveryReport,
        cancel: &CancelToken,
    ) -> Result<NormalizationSummary> {
        let mut summary = NormalizationSummary::default();
        let mut ids_by_uri: HashMap<&str, String> = HashMap::new();

        for root in report.roots() {
            let uid = self.post(report, root, cancel).await?;
            ids_by_uri.insert(root.source_uri.as_str(), uid.clone());
            summary.created.push(created(root, uid));
        }

        for child in report.children() {
            let parent_id = report
                .parent_uri(&child.source_uri)
                .and_then(|uri| ids_by_uri.get(uri));

            let Some(parent_id) = parent_id else {
                tracing::warn!(
                    source_uri = %child.source_uri,
                    parent_uri = ?report.parent_uri(&child.source_uri),
                    "skipping component whose parent was not created"
                );
                summary.skipped.push(child.source_uri.clone());
                continue;
            };

            let mut record = child.clone();
            record.parent_id = Some(parent_id.clone());
            let uid = self.post(report, &record, cancel).await?;
            summary.created.push(created(&record, uid));
        }

        tracing::info!(
            created = summary.created.len(),
            skipped = summary.skipped.len(),
            "device graph normalized"
        );
        Ok(summary)
    }

    /// Creates the device then writes its full status.
    async fn post(
        &self,
        report: &DiscoveryReport,
        record: &ComponentRecord,
        cancel: &CancelToken,
    ) -> Result<String> {
        let name = record.name();
        let mut fields = json!({ "name": name });
        if let Some(key) = report.canonical_key(record) {
            fields[CANONICAL_KEY_FIELD] = Value::String(key);
        }

        let uid = cancel
            .run(self.store.create(DEVICE_KIND, &fields))
            .await?
            .map_err(|e| normalization_error(&name, e))?;

        let status = serde_json::to_value(record.status())
            .map_err(|e| normalization_error(&name, e))?;
        cancel
            .run(self.store.update_status(DEVICE_KIND, &uid, &status))
            .await?
            .map_err(|e| normalization_error(&name, e))?;

        tracing::debug!(
            uid = %uid,
            name = %name,
            parent_id = ?record.parent_id,
            "device posted"
        );
        Ok(uid)
    }
}

fn created(record: &ComponentRecord, uid: String) -> CreatedDevice {
    CreatedDevice {
        uid,
        name: record.name(),
        kind: record.kind,
        source_uri: record.source_uri.clone(),
        parent_id: record.parent_id.clone(),
    }
}

fn normalization_error(record: &str, cause: impl fmt::Display) -> Error {
    Error::Normalization {
        record: record.to_string(),
        cause: cause.to_string(),
    }
}
