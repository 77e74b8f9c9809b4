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

//! Drives a discovery snapshot through its phases.
//!
//! ```text
//!   Unset ──save──▶ Pending ──save──▶ Processing ──save──▶ Complete
//!     (requeue)                              └────save──▶ Error
//! ```
//!
//! Every invocation starts from the persisted snapshot, so re-running any
//! step repeats it from the stored payload rather than from memory. The
//! reconciler holds no locks: callers must not run two reconciliations of
//! the same snapshot at once (see [`crate::controller::Controller`]).

use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::normalize::GraphNormalizer;
use crate::snapshot::{Phase, Snapshot};
use crate::store::{RecordStore, SNAPSHOT_KIND};

/// Delay before a freshly queued snapshot is picked up again.
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(1);

const QUEUED_MESSAGE: &str = "Snapshot queued for processing.";
const STARTED_MESSAGE: &str = "Reconciliation started.";
const COMPLETE_MESSAGE: &str = "Snapshot processed successfully.";

/// Scheduling outcome of one successful reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Run this snapshot again after the delay.
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

pub struct SnapshotReconciler {
    store: Arc<dyn RecordStore>,
    normalizer: GraphNormalizer,
    requeue_delay: Duration,
}

impl SnapshotReconciler {
    /// Uses `store` for snapshots and for the devices they produce.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let normalizer = GraphNormalizer::new(store.clone());
        Self::with_normalizer(store, normalizer)
    }

    pub fn with_normalizer(store: Arc<dyn RecordStore>, normalizer: GraphNormalizer) -> Self {
        Self {
            store,
            normalizer,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
        }
    }

    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    /// Loads snapshot `id` and advances it.
    ///
    /// A missing snapshot is a no-op. Bytes that do not decode as a snapshot
    /// yield [`Error::InvalidResource`].
    pub async fn reconcile(&self, id: &str, cancel: &CancelToken) -> Result<ReconcileResult> {
        let loaded = cancel
            .run(self.store.load(SNAPSHOT_KIND, id))
            .await?
            .map_err(|source| Error::Persistence {
                id: id.to_string(),
                source,
            })?;

        let Some(data) = loaded else {
            tracing::debug!(snapshot = id, "snapshot no longer exists");
            return Ok(ReconcileResult::done());
        };

        let snapshot = Snapshot::decode(id, &data)?;
        self.reconcile_snapshot(snapshot, cancel).await
    }

    /// Advances an already loaded snapshot.
    pub async fn reconcile_snapshot(
        &self,
        mut snapshot: Snapshot,
        cancel: &CancelToken,
    ) -> Result<ReconcileResult> {
        tracing::info!(
            snapshot = snapshot.uid(),
            phase = %snapshot.phase(),
            "reconciling discovery snapshot"
        );

        match snapshot.phase() {
            Phase::Complete | Phase::Error => {
                tracing::info!(snapshot = snapshot.uid(), "snapshot already processed, skipping");
                return Ok(ReconcileResult::done());
            }
            Phase::Unset => {
                snapshot.transition(Phase::Pending, QUEUED_MESSAGE);
                self.persist(&snapshot, cancel).await?;
                tracing::info!(
                    snapshot = snapshot.uid(),
                    requeue_after_ms = self.requeue_delay.as_millis() as u64,
                    "new snapshot queued"
                );
                return Ok(ReconcileResult::requeue(self.requeue_delay));
            }
            Phase::Pending => {
                snapshot.transition(Phase::Processing, STARTED_MESSAGE);
                snapshot.log(STARTED_MESSAGE);
                self.persist(&snapshot, cancel).await?;
            }
            Phase::Processing => {
                tracing::info!(snapshot = snapshot.uid(), "resuming interrupted processing");
            }
        }

        self.process(&mut snapshot, cancel).await?;
        self.persist(&snapshot, cancel).await?;

        tracing::info!(
            snapshot = snapshot.uid(),
            phase = %snapshot.phase(),
            "discovery snapshot reconciled"
        );
        Ok(ReconcileResult::done())
    }

    /// Runs the normalizer over the payload and moves to a terminal phase.
    /// Only cancellation is returned as an error; everything else ends up in
    /// the snapshot status.
    async fn process(&self, snapshot: &mut Snapshot, cancel: &CancelToken) -> Result<()> {
        let report = match snapshot.report() {
            Ok(report) => report,
            Err(err) => {
                let message = format!("Invalid discovery payload: {err}");
                tracing::warn!(snapshot = snapshot.uid(), error = %err, "undecodable snapshot payload");
                snapshot.log(message.clone());
                snapshot.transition(Phase::Error, message);
                return Ok(());
            }
        };

        snapshot.log(format!(
            "Discovery payload contains {} component(s).",
            report.records.len()
        ));
        for warning in &report.warnings {
            snapshot.log(format!("Discovery warning: {warning}"));
        }

        match self.normalizer.normalize(&report, cancel).await {
            Ok(summary) => {
                for device in &summary.created {
                    match &device.parent_id {
                        Some(parent) => snapshot.log(format!(
                            "Created {} {} under {}.",
                            device.name, device.uid, parent
                        )),
                        None => snapshot.log(format!("Created {} {}.", device.name, device.uid)),
                    }
                }
                for source_uri in &summary.skipped {
                    snapshot.log(format!("Skipped {source_uri}: parent was not created."));
                }
                snapshot.log(format!("{COMPLETE_MESSAGE} {summary}."));
                snapshot.transition(Phase::Complete, COMPLETE_MESSAGE);
            }
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => {
                tracing::error!(snapshot = snapshot.uid(), error = %err, "snapshot processing failed");
                snapshot.log(format!("Processing failed: {err}"));
                snapshot.transition(Phase::Error, err.to_string());
            }
        }
        Ok(())
    }

    async fn persist(&self, snapshot: &Snapshot, cancel: &CancelToken) -> Result<()> {
        let data = snapshot.encode()?;
        cancel
            .run(self.store.save(SNAPSHOT_KIND, snapshot.uid(), &data))
            .await?
            .map_err(|source| {
                tracing::error!(
                    snapshot = snapshot.uid(),
                    phase = %snapshot.phase(),
                    error = %source,
                    "failed to persist snapshot"
                );
                Error::Persistence {
                    id: snapshot.uid().to_string(),
                    source,
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentRecord, DeviceKind, DiscoveryReport};
    use crate::store::MemoryStore;

    fn seeded(store: &MemoryStore, id: &str, phase: Phase) {
        let mut report = DiscoveryReport::default();
        report
            .records
            .push(ComponentRecord::new(DeviceKind::Node, "/Systems/1"));
        let mut snapshot = Snapshot::from_report(id, &report).unwrap();
        snapshot.status.phase = phase;
        store.seed(SNAPSHOT_KIND, id, snapshot.encode().unwrap());
    }

    fn stored(store: &MemoryStore, id: &str) -> Snapshot {
        let data = serde_json::to_vec(&store.get_json(SNAPSHOT_KIND, id).unwrap()).unwrap();
        Snapshot::decode(id, &data).unwrap()
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = SnapshotReconciler::new(store.clone());
        let result = reconciler
            .reconcile("ds-gone", &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(result, ReconcileResult::done());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_invalid_resource() {
        let store = Arc::new(MemoryStore::new());
        store.seed(SNAPSHOT_KIND, "ds-1", b"not json".to_vec());
        let reconciler = SnapshotReconciler::new(store.clone());
        let err = reconciler
            .reconcile("ds-1", &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResource { .. }));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_requeue_delay_is_configurable() {
        let store = Arc::new(MemoryStore::new());
        seeded(&store, "ds-1", Phase::Unset);
        let reconciler =
            SnapshotReconciler::new(store.clone()).with_requeue_delay(Duration::from_millis(250));
        let result = reconciler
            .reconcile("ds-1", &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(result.requeue_after, Some(Duration::from_millis(250)));
        assert_eq!(stored(&store, "ds-1").status.message, QUEUED_MESSAGE);
    }

    #[tokio::test]
    async fn test_processing_phase_resumes_without_extra_save() {
        let store = Arc::new(MemoryStore::new());
        seeded(&store, "ds-1", Phase::Processing);
        let reconciler = SnapshotReconciler::new(store.clone());
        reconciler
            .reconcile("ds-1", &CancelToken::never())
            .await
            .unwrap();

        let snapshot = stored(&store, "ds-1");
        assert_eq!(snapshot.phase(), Phase::Complete);
        assert_eq!(snapshot.status.message, COMPLETE_MESSAGE);
        assert!(!snapshot.status.logs.iter().any(|l| l == STARTED_MESSAGE));
    }

    #[tokio::test]
    async fn test_undecodable_payload_moves_to_error() {
        let store = Arc::new(MemoryStore::new());
        let raw = serde_json::value::to_raw_value(&serde_json::json!({"records": "nope"})).unwrap();
        let mut snapshot = Snapshot::new("ds-1", raw);
        snapshot.status.phase = Phase::Pending;
        store.seed(SNAPSHOT_KIND, "ds-1", snapshot.encode().unwrap());

        let reconciler = SnapshotReconciler::new(store.clone());
        let result = reconciler
            .reconcile("ds-1", &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(result, ReconcileResult::done());

        let snapshot = stored(&store, "ds-1");
        assert_eq!(snapshot.phase(), Phase::Error);
        assert!(snapshot.status.message.starts_with("Invalid discovery payload"));
    }
}
