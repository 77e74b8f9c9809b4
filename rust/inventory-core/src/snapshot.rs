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

//! The `DiscoverySnapshot` resource.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{Error, Result};
use crate::model::DiscoveryReport;

/// Reconciliation phase. Only ever moves forward.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Phase {
    #[default]
    #[serde(rename = "")]
    Unset,
    Pending,
    Processing,
    Complete,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Unset => "",
            Phase::Pending => "Pending",
            Phase::Processing => "Processing",
            Phase::Complete => "Complete",
            Phase::Error => "Error",
        }
    }

    /// `Complete` and `Error` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Unset => f.write_str("Unset"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSpec {
    /// Serialized [`DiscoveryReport`], kept undecoded until processing.
    #[serde(rename = "rawData")]
    pub raw_data: Box<RawValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

/// A raw discovery payload awaiting, undergoing or done with reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub spec: SnapshotSpec,
    #[serde(default)]
    pub status: SnapshotStatus,
}

impl Snapshot {
    pub fn new(uid: impl Into<String>, raw_data: Box<RawValue>) -> Self {
        Self {
            metadata: SnapshotMetadata {
                uid: uid.into(),
                name: None,
            },
            spec: SnapshotSpec { raw_data },
            status: SnapshotStatus::default(),
        }
    }

    /// Wraps a discovery report in a fresh, unreconciled snapshot.
    pub fn from_report(uid: impl Into<String>, report: &DiscoveryReport) -> Result<Self> {
        let raw = serde_json::value::to_raw_value(report)?;
        Ok(Self::new(uid, raw))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = Some(name.into());
        self
    }

    pub fn uid(&self) -> &str {
        &self.metadata.uid
    }

    pub fn phase(&self) -> Phase {
        self.status.phase
    }

    /// Decodes bytes stored under `id`. Anything that is not a snapshot, or
    /// whose `metadata.uid` is not `id`, is an [`Error::InvalidResource`].
    pub fn decode(id: &str, data: &[u8]) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidResource {
            id: id.to_string(),
            reason,
        };

        let snapshot: Self = serde_json::from_slice(data).map_err(|e| invalid(e.to_string()))?;
        if snapshot.uid() != id {
            return Err(invalid(format!(
                "metadata.uid {:?} does not match the record id",
                snapshot.uid()
            )));
        }
        Ok(snapshot)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses the embedded raw payload.
    pub fn report(&self) -> serde_json::Result<DiscoveryReport> {
        serde_json::from_str(self.spec.raw_data.get())
    }

    /// Moves to `phase` and records `message` as the current state.
    pub fn transition(&mut self, phase: Phase, message: impl Into<String>) {
        self.status.phase = phase;
        self.status.message = message.into();
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.status.logs.push(line.into());
    }
}
