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

//! Record store backed by the inventory REST API.
//!
//! | call            | request                                   |
//! |-----------------|-------------------------------------------|
//! | `create`        | `POST /{plural}` `{"metadata": fields}`   |
//! | `update_status` | `PUT /{plural}/{id}/status` `{"status": ..}` |
//! | `load`          | `GET /{plural}/{id}`                      |
//! | `save`          | `PUT /{plural}/{id}`                      |
//! | `list`          | `GET /{plural}`                           |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};

use super::{RecordStore, StoreError, StoreResult};

pub struct InventoryApiStore {
    base_url: String,
    http: Client,
}

impl InventoryApiStore {
    pub fn new(base_url: &str, timeout: Duration) -> StoreResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build HTTP client: {e}")))?;
        Self::with_client(base_url, http)
    }

    pub fn with_client(base_url: &str, http: Client) -> StoreResult<Self> {
        let base_url = ensure_scheme(base_url)?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: &str) -> String {
        format!("{}/{}", self.base_url, plural(kind))
    }

    fn record_url(&self, kind: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(kind), urlencoding::encode(id))
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> StoreResult<Response> {
        tracing::debug!(url = %url, "inventory API request");
        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("request to {url} failed: {e}")))?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Api { status, message })
    }

    async fn body(response: Response) -> StoreResult<Vec<u8>> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| StoreError::Backend(format!("failed to read response body: {e}")))
    }
}

fn not_found(kind: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl RecordStore for InventoryApiStore {
    async fn load(&self, kind: &str, id: &str) -> StoreResult<Option<Vec<u8>>> {
        let url = self.record_url(kind, id);
        let response = self.send(&url, self.http.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::body(response).await.map(Some)
    }

    async fn save(&self, kind: &str, id: &str, data: &[u8]) -> StoreResult<()> {
        let url = self.record_url(kind, id);
        let request = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(data.to_vec());
        let response = self.send(&url, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(not_found(kind, id));
        }
        Ok(())
    }

    async fn create(&self, kind: &str, fields: &Value) -> StoreResult<String> {
        let url = self.collection_url(kind);
        let request = self.http.post(&url).json(&json!({ "metadata": fields }));
        let response = self.send(&url, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::Api {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("no collection at {url}"),
            });
        }

        let created: Value = serde_json::from_slice(&Self::body(response).await?)?;
        created
            .pointer("/metadata/uid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Backend(format!("create response from {url} has no uid")))
    }

    async fn update_status(&self, kind: &str, id: &str, status: &Value) -> StoreResult<()> {
        let url = format!("{}/status", self.record_url(kind, id));
        let request = self.http.put(&url).json(&json!({ "status": status }));
        let response = self.send(&url, request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(not_found(kind, id));
        }
        Ok(())
    }

    async fn list(&self, kind: &str) -> StoreResult<Vec<String>> {
        let url = self.collection_url(kind);
        let response = self.send(&url, self.http.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let listing: Value = serde_json::from_slice(&Self::body(response).await?)?;
        Ok(uids(&listing))
    }
}

/// REST collection name for a record kind.
fn plural(kind: &str) -> String {
    format!("{}s", kind.to_ascii_lowercase())
}

/// Accepts either a bare array of records or an `{"items": [...]}` envelope.
fn uids(listing: &Value) -> Vec<String> {
    let items = match listing {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };
    items
        .iter()
        .filter_map(|item| item.pointer("/metadata/uid").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn ensure_scheme(url: &str) -> StoreResult<String> {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(StoreError::Backend("inventory API URL is required".to_string()));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Ok(format!("http://{url}"))
    }
}
