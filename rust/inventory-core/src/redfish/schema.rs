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

//! Redfish payload shapes.
//!
//! Every component payload is decoded as a shared [`CommonProperties`] block
//! plus a kind-specific part. The caller picks the kind; nothing is inferred
//! from the payload itself.
//!
//! Only the common block is strict. A kind-specific value of the wrong type
//! is dropped and the component is kept.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::model::{ComponentRecord, DeviceKind, Properties, REDFISH_URI_PROPERTY};

/// Path prefix of every Redfish locator.
pub const SERVICE_ROOT: &str = "/redfish/v1";

/// Reference to another resource.
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
}

impl Link {
    /// Locator relative to the service root.
    pub fn path(&self) -> &str {
        strip_service_root(&self.odata_id)
    }
}

pub fn strip_service_root(locator: &str) -> &str {
    locator.strip_prefix(SERVICE_ROOT).unwrap_or(locator)
}

/// Collection envelope. `Members` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
    #[serde(rename = "Members")]
    pub members: Vec<Link>,
}

/// Property block shared by systems, processors and memory modules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonProperties {
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemFields {
    #[serde(default, deserialize_with = "lenient")]
    pub processors: Option<Link>,
    #[serde(default, deserialize_with = "lenient")]
    pub memory: Option<Link>,
    #[serde(default, deserialize_with = "lenient")]
    pub host_name: Option<String>,
    #[serde(default, rename = "UUID", deserialize_with = "lenient")]
    pub uuid: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub power_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessorFields {
    #[serde(default, deserialize_with = "lenient")]
    pub socket: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub processor_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_cores: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_threads: Option<u32>,
    #[serde(default, rename = "MaxSpeedMHz", deserialize_with = "lenient")]
    pub max_speed_mhz: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MemoryFields {
    #[serde(default, deserialize_with = "lenient")]
    pub device_locator: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub memory_device_type: Option<String>,
    #[serde(default, rename = "CapacityMiB", deserialize_with = "lenient")]
    pub capacity_mib: Option<u64>,
    #[serde(default, rename = "OperatingSpeedMhz", deserialize_with = "lenient")]
    pub operating_speed_mhz: Option<u32>,
}

/// Reads an optional kind-specific value, treating a type mismatch as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value::<Option<T>>(value).ok().flatten())
}

/// Kind-specific part of a component payload.
#[derive(Debug, Clone)]
pub enum KindFields {
    System(SystemFields),
    Processor(ProcessorFields),
    Memory(MemoryFields),
    Opaque,
}

/// A decoded component payload.
#[derive(Debug, Clone)]
pub struct Component {
    pub kind: DeviceKind,
    pub common: CommonProperties,
    pub fields: KindFields,
}

#[derive(Deserialize)]
struct Envelope<S> {
    #[serde(flatten)]
    common: CommonProperties,
    #[serde(flatten)]
    specific: S,
}

fn decode_envelope<S: DeserializeOwned>(body: &[u8]) -> serde_json::Result<(CommonProperties, S)> {
    let envelope: Envelope<S> = serde_json::from_slice(body)?;
    Ok((envelope.common, envelope.specific))
}

/// Decodes `body` as a component of the given kind.
pub fn decode_component(kind: DeviceKind, body: &[u8]) -> serde_json::Result<Component> {
    let (common, fields) = match kind {
        DeviceKind::Node => {
            let (common, fields) = decode_envelope::<SystemFields>(body)?;
            (common, KindFields::System(fields))
        }
        DeviceKind::Cpu => {
            let (common, fields) = decode_envelope::<ProcessorFields>(body)?;
            (common, KindFields::Processor(fields))
        }
        DeviceKind::Dimm => {
            let (common, fields) = decode_envelope::<MemoryFields>(body)?;
            (common, KindFields::Memory(fields))
        }
        DeviceKind::Rack | DeviceKind::Gpu => {
            let common: CommonProperties = serde_json::from_slice(body)?;
            (common, KindFields::Opaque)
        }
    };
    Ok(Component {
        kind,
        common,
        fields,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Component {
    /// Maps the payload onto a record discovered at `source_uri`.
    pub fn into_record(self, source_uri: &str) -> serde_json::Result<ComponentRecord> {
        let mut record = ComponentRecord::new(self.kind, source_uri);
        record.manufacturer = non_empty(self.common.manufacturer);
        record.part_number =
            non_empty(self.common.part_number).or_else(|| non_empty(self.common.model));
        record.serial_number = non_empty(self.common.serial_number);

        let props = &mut record.properties;
        props.insert(REDFISH_URI_PROPERTY, source_uri)?;
        match self.fields {
            KindFields::System(system) => {
                insert_opt(props, "HostName", system.host_name)?;
                insert_opt(props, "UUID", system.uuid)?;
                insert_opt(props, "PowerState", system.power_state)?;
            }
            KindFields::Processor(cpu) => {
                insert_opt(props, "Socket", cpu.socket)?;
                insert_opt(props, "ProcessorType", cpu.processor_type)?;
                insert_opt(props, "TotalCores", cpu.total_cores)?;
                insert_opt(props, "TotalThreads", cpu.total_threads)?;
                insert_opt(props, "MaxSpeedMHz", cpu.max_speed_mhz)?;
            }
            KindFields::Memory(dimm) => {
                insert_opt(props, "DeviceLocator", dimm.device_locator)?;
                insert_opt(props, "MemoryDeviceType", dimm.memory_device_type)?;
                insert_opt(props, "CapacityMiB", dimm.capacity_mib)?;
                insert_opt(props, "OperatingSpeedMhz", dimm.operating_speed_mhz)?;
            }
            KindFields::Opaque => {}
        }
        Ok(record)
    }
}

fn insert_opt<T: serde::Serialize>(
    props: &mut Properties,
    key: &str,
    value: Option<T>,
) -> serde_json::Result<()> {
    match value {
        Some(value) => props.insert(key, &value),
        None => Ok(()),
    }
}
