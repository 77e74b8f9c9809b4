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

//! Hardware inventory discovery for ServiceRadar.
//!
//! This crate walks a BMC's Redfish tree into a flat [`DiscoveryReport`],
//! posts reports as linked device records through the [`GraphNormalizer`],
//! and reconciles stored [`Snapshot`]s of reports into those records.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use inventory_core::{
//!     redfish, CancelToken, ClientOptions, Credentials, MemoryStore, Snapshot,
//!     SnapshotReconciler, RecordStore, SNAPSHOT_KIND,
//! };
//!
//! # async fn example() -> inventory_core::Result<()> {
//! let cancel = CancelToken::never();
//! let report = redfish::discover(
//!     "10.0.0.5",
//!     Credentials::new("root", "secret"),
//!     &ClientOptions::default(),
//!     &cancel,
//! )
//! .await?;
//!
//! let store = Arc::new(MemoryStore::new());
//! let snapshot = Snapshot::from_report("ds-1", &report)?;
//! store
//!     .save(SNAPSHOT_KIND, snapshot.uid(), &snapshot.encode()?)
//!     .await
//!     .map_err(|source| inventory_core::Error::Persistence {
//!         id: snapshot.uid().to_string(),
//!         source,
//!     })?;
//!
//! let reconciler = SnapshotReconciler::new(store);
//! while let Some(delay) = reconciler.reconcile("ds-1", &cancel).await?.requeue_after {
//!     tokio::time::sleep(delay).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod controller;
pub mod error;
pub mod model;
pub mod normalize;
pub mod reconcile;
pub mod redfish;
pub mod snapshot;
pub mod store;
pub mod telemetry;

pub use cancel::{CancelHandle, CancelToken};
pub use controller::{Controller, ControllerOptions, Reconciler, WorkQueue};
pub use error::{DecodeWarning, Error, Result};
pub use model::{ComponentRecord, DeviceKind, DeviceStatus, DiscoveryReport, Properties};
pub use normalize::{CreatedDevice, GraphNormalizer, NormalizationSummary};
pub use reconcile::{ReconcileResult, SnapshotReconciler, DEFAULT_REQUEUE_DELAY};
pub use redfish::{ClientOptions, Credentials, RedfishClient, RedfishTransport, TopologyWalker};
pub use snapshot::{Phase, Snapshot};
pub use store::{
    FileStore, InventoryApiStore, MemoryStore, RecordStore, StoreError, DEVICE_KIND,
    SNAPSHOT_KIND,
};
