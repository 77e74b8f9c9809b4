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

//! Discovered components and the report a walk produces.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::DecodeWarning;

/// Property key holding the Redfish path a device was discovered at.
pub const REDFISH_URI_PROPERTY: &str = "redfish_uri";

/// Type tag of a discovered part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceKind {
    Node,
    Rack,
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "DIMM")]
    Dimm,
    #[serde(rename = "GPU")]
    Gpu,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Node => "Node",
            DeviceKind::Rack => "Rack",
            DeviceKind::Cpu => "CPU",
            DeviceKind::Dimm => "DIMM",
            DeviceKind::Gpu => "GPU",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open mapping of protocol attributes. Values stay encoded until a caller
/// reads them with the type it expects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, Box<RawValue>>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T>(&mut self, key: impl Into<String>, value: &T) -> serde_json::Result<()>
    where
        T: Serialize + ?Sized,
    {
        let raw = serde_json::value::to_raw_value(value)?;
        self.0.insert(key.into(), raw);
        Ok(())
    }

    /// Decodes the value stored under `key`.
    ///
    /// Returns `None` when the key is absent and `Some(Err(_))` when the stored
    /// value does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<serde_json::Result<T>> {
        self.0.get(key).map(|raw| serde_json::from_str(raw.get()))
    }

    pub fn raw(&self, key: &str) -> Option<&RawValue> {
        self.0.get(key).map(|raw| raw.as_ref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One discovered physical or logical part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    #[serde(rename = "deviceType")]
    pub kind: DeviceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    /// Redfish path that produced this record, without the `/redfish/v1` prefix.
    #[serde(rename = "sourceURI")]
    pub source_uri: String,

    /// Durable id of the owning record; set by the normalizer.
    #[serde(rename = "parentID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

impl ComponentRecord {
    pub fn new(kind: DeviceKind, source_uri: impl Into<String>) -> Self {
        Self {
            kind,
            manufacturer: None,
            part_number: None,
            serial_number: None,
            source_uri: source_uri.into(),
            parent_id: None,
            properties: Properties::new(),
        }
    }

    /// Display name used when creating the canonical device, e.g. `CPU-SN123`.
    pub fn name(&self) -> String {
        format!(
            "{}-{}",
            self.kind,
            self.serial_number.as_deref().unwrap_or("unknown")
        )
    }

    /// Stable identity of the physical part across discovery runs.
    ///
    /// Kind plus serial number when the endpoint reports one. Without a
    /// serial the Redfish path only identifies the part within one BMC, so
    /// the key is scoped to `endpoint`, and there is no key at all when the
    /// endpoint is unknown.
    pub fn canonical_key(&self, endpoint: Option<&str>) -> Option<String> {
        match (self.serial_number.as_deref(), endpoint) {
            (Some(serial), _) => Some(format!("{}:{}", self.kind, serial)),
            (None, Some(endpoint)) => {
                Some(format!("{}@{}{}", self.kind, endpoint, self.source_uri))
            }
            (None, None) => None,
        }
    }

    pub fn status(&self) -> DeviceStatus<'_> {
        DeviceStatus {
            device_type: self.kind,
            manufacturer: self.manufacturer.as_deref(),
            part_number: self.part_number.as_deref(),
            serial_number: self.serial_number.as_deref(),
            parent_id: self.parent_id.as_deref(),
            properties: &self.properties,
        }
    }
}

/// Status payload of a canonical device record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus<'a> {
    pub device_type: DeviceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<&'a str>,
    #[serde(rename = "parentID", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Properties::is_empty")]
    pub properties: &'a Properties,
}

/// Output of one topology walk, and the raw payload of a discovery snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Service root the records were read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    pub records: Vec<ComponentRecord>,

    /// Child `sourceURI` to parent `sourceURI`.
    #[serde(default)]
    pub edges: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<DecodeWarning>,
}

impl DiscoveryReport {
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    /// Dedup key of `record` within this report's endpoint.
    pub fn canonical_key(&self, record: &ComponentRecord) -> Option<String> {
        record.canonical_key(self.endpoint.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn parent_uri(&self, source_uri: &str) -> Option<&str> {
        self.edges.get(source_uri).map(String::as_str)
    }

    pub fn is_root(&self, record: &ComponentRecord) -> bool {
        !self.edges.contains_key(&record.source_uri)
    }

    pub fn roots(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.records.iter().filter(|r| self.is_root(r))
    }

    pub fn children(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.records.iter().filter(|r| !self.is_root(r))
    }
}
