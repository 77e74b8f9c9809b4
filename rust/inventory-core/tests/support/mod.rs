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

//! Shared fixtures: a canned Redfish transport and a store that fails on
//! demand.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use inventory_core::{
    DiscoveryReport, Error, MemoryStore, Phase, RecordStore, RedfishTransport, Snapshot,
    StoreError, SNAPSHOT_KIND,
};

/// Serves canned bodies by path. Unknown paths answer 404.
#[derive(Default)]
pub struct FixtureTransport {
    endpoint: Option<String>,
    bodies: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<String>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers as a different BMC.
    pub fn at(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with(mut self, path: &str, body: &str) -> Self {
        self.bodies.insert(path.to_string(), body.to_string());
        self
    }

    /// Makes `path` take `delay` to answer.
    pub fn slow(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RedfishTransport for FixtureTransport {
    fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or("fixture-bmc")
    }

    async fn get(&self, path: &str) -> inventory_core::Result<Vec<u8>> {
        self.requests.lock().push(path.to_string());
        if let Some(delay) = self.delays.get(path) {
            tokio::time::sleep(*delay).await;
        }
        self.bodies
            .get(path)
            .map(|body| body.as_bytes().to_vec())
            .ok_or_else(|| Error::HttpStatus {
                url: format!("https://fixture-bmc/redfish/v1{path}"),
                status: 404,
            })
    }
}

/// One system with two processors and no memory collection.
pub fn scenario_a() -> FixtureTransport {
    FixtureTransport::new()
        .with(
            "/Systems",
            r#"{"@odata.id": "/redfish/v1/Systems", "Members": [{"@odata.id": "/redfish/v1/Systems/1"}]}"#,
        )
        .with(
            "/Systems/1",
            r#"{
                "@odata.id": "/redfish/v1/Systems/1",
                "Manufacturer": "Supermicro",
                "Model": "SYS-1029U",
                "SerialNumber": "S1029U-0001",
                "HostName": "compute-01",
                "PowerState": "On",
                "Processors": {"@odata.id": "/redfish/v1/Systems/1/Processors"}
            }"#,
        )
        .with(
            "/Systems/1/Processors",
            r#"{"Members": [
                {"@odata.id": "/redfish/v1/Systems/1/Processors/1"},
                {"@odata.id": "/redfish/v1/Systems/1/Processors/2"}
            ]}"#,
        )
        .with(
            "/Systems/1/Processors/1",
            r#"{"Manufacturer": "Intel(R) Corporation", "Model": "Xeon Gold 6230", "SerialNumber": "CPU-A1", "Socket": "CPU1", "TotalCores": 20}"#,
        )
        .with(
            "/Systems/1/Processors/2",
            r#"{"Manufacturer": "Intel(R) Corporation", "Model": "Xeon Gold 6230", "SerialNumber": "CPU-A2", "Socket": "CPU2", "TotalCores": 20}"#,
        )
}

/// One system without a serial number and no children.
pub fn serialless_system(endpoint: &str, manufacturer: &str) -> FixtureTransport {
    FixtureTransport::new()
        .at(endpoint)
        .with(
            "/Systems",
            r#"{"Members": [{"@odata.id": "/redfish/v1/Systems/1"}]}"#,
        )
        .with(
            "/Systems/1",
            &format!(r#"{{"Manufacturer": "{manufacturer}", "Model": "Whitebox"}}"#),
        )
}

/// Stores `report` as a snapshot in `phase` without counting as a write.
pub fn seed_snapshot(store: &MemoryStore, id: &str, phase: Phase, report: &DiscoveryReport) {
    let mut snapshot = Snapshot::from_report(id, report).unwrap();
    snapshot.status.phase = phase;
    store.seed(SNAPSHOT_KIND, id, snapshot.encode().unwrap());
}

pub fn stored_snapshot(store: &MemoryStore, id: &str) -> Snapshot {
    let doc = store.get_json(SNAPSHOT_KIND, id).expect("snapshot should exist");
    Snapshot::decode(id, &serde_json::to_vec(&doc).unwrap()).unwrap()
}

/// Delegates to a [`MemoryStore`], failing selected calls.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    save_failures: AtomicUsize,
    fail_create_named: Option<String>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` saves fail.
    pub fn failing_saves(self, count: usize) -> Self {
        self.save_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Creating a record with this name fails.
    pub fn failing_create(mut self, name: &str) -> Self {
        self.fail_create_named = Some(name.to_string());
        self
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn load(&self, kind: &str, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.load(kind, id).await
    }

    async fn save(&self, kind: &str, id: &str, data: &[u8]) -> Result<(), StoreError> {
        let remaining = self.save_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.save_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Backend("storage unavailable".to_string()));
        }
        self.inner.save(kind, id, data).await
    }

    async fn create(&self, kind: &str, fields: &Value) -> Result<String, StoreError> {
        let name = fields.get("name").and_then(Value::as_str);
        if name.is_some() && name == self.fail_create_named.as_deref() {
            return Err(StoreError::Api {
                status: 409,
                message: "conflict".to_string(),
            });
        }
        self.inner.create(kind, fields).await
    }

    async fn update_status(&self, kind: &str, id: &str, status: &Value) -> Result<(), StoreError> {
        self.inner.update_status(kind, id, status).await
    }

    async fn list(&self, kind: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(kind).await
    }
}
