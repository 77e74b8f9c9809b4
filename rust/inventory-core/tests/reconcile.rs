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

//! Snapshot state machine scenarios.

mod support;

use std::sync::Arc;
use std::time::Duration;

use inventory_core::{
    CancelHandle, CancelToken, DiscoveryReport, Error, MemoryStore, Phase, ReconcileResult,
    Snapshot, SnapshotReconciler, TopologyWalker, DEFAULT_REQUEUE_DELAY, DEVICE_KIND, SNAPSHOT_KIND,
};
use pretty_assertions::assert_eq;
use support::{scenario_a, seed_snapshot, stored_snapshot, FlakyStore};

async fn scenario_a_report() -> DiscoveryReport {
    TopologyWalker::new(scenario_a())
        .discover(&CancelToken::never())
        .await
        .unwrap()
}

#[tokio::test]
async fn scenario_b_unset_then_pending_to_complete() {
    let store = Arc::new(MemoryStore::new());
    seed_snapshot(&store, "ds-1", Phase::Unset, &scenario_a_report().await);
    let reconciler = SnapshotReconciler::new(store.clone());
    let cancel = CancelToken::never();

    let first = reconciler.reconcile("ds-1", &cancel).await.unwrap();
    assert_eq!(first.requeue_after, Some(DEFAULT_REQUEUE_DELAY));
    assert_eq!(DEFAULT_REQUEUE_DELAY, Duration::from_secs(1));
    let snapshot = stored_snapshot(&store, "ds-1");
    assert_eq!(snapshot.phase(), Phase::Pending);
    assert_eq!(snapshot.status.message, "Snapshot queued for processing.");
    assert_eq!(store.count(DEVICE_KIND), 0);

    let second = reconciler.reconcile("ds-1", &cancel).await.unwrap();
    assert_eq!(second, ReconcileResult::done());
    let snapshot = stored_snapshot(&store, "ds-1");
    assert_eq!(snapshot.phase(), Phase::Complete);
    assert_eq!(snapshot.status.message, "Snapshot processed successfully.");
    assert!(!snapshot.status.logs.is_empty());
    assert_eq!(snapshot.status.logs[0], "Reconciliation started.");
    assert_eq!(
        snapshot.status.logs.last().map(String::as_str),
        Some("Snapshot processed successfully. 3 device(s) created.")
    );
    assert_eq!(store.count(DEVICE_KIND), 3);
}

#[tokio::test]
async fn scenario_c_error_phase_is_untouched() {
    let store = Arc::new(MemoryStore::new());
    seed_snapshot(&store, "ds-1", Phase::Error, &scenario_a_report().await);
    let before = store.get_json(SNAPSHOT_KIND, "ds-1");

    let result = SnapshotReconciler::new(store.clone())
        .reconcile("ds-1", &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(result, ReconcileResult::done());
    assert_eq!(store.write_count(), 0);
    assert_eq!(store.get_json(SNAPSHOT_KIND, "ds-1"), before);
}

#[tokio::test]
async fn complete_phase_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    seed_snapshot(&store, "ds-1", Phase::Pending, &scenario_a_report().await);
    let reconciler = SnapshotReconciler::new(store.clone());

    reconciler
        .reconcile("ds-1", &CancelToken::never())
        .await
        .unwrap();
    let writes = store.write_count();
    let logs = stored_snapshot(&store, "ds-1").status.logs;

    for _ in 0..3 {
        let result = reconciler
            .reconcile("ds-1", &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(result, ReconcileResult::done());
    }
    assert_eq!(store.write_count(), writes);
    assert_eq!(stored_snapshot(&store, "ds-1").status.logs, logs);
}

#[tokio::test]
async fn phases_never_regress() {
    let store = Arc::new(MemoryStore::new());
    seed_snapshot(&store, "ds-1", Phase::Unset, &scenario_a_report().await);
    let reconciler = SnapshotReconciler::new(store.clone());

    let mut observed = vec![stored_snapshot(&store, "ds-1").phase()];
    for _ in 0..5 {
        reconciler
            .reconcile("ds-1", &CancelToken::never())
            .await
            .unwrap();
        observed.push(stored_snapshot(&store, "ds-1").phase());
    }

    assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{observed:?}");
    assert_eq!(observed.first(), Some(&Phase::Unset));
    assert_eq!(observed.last(), Some(&Phase::Complete));
}

#[tokio::test]
async fn discovery_warnings_land_in_logs() {
    let mut report = scenario_a_report().await;
    report.warnings.push(inventory_core::DecodeWarning::new(
        "/Systems/1/Memory",
        "status 500",
    ));
    let store = Arc::new(MemoryStore::new());
    seed_snapshot(&store, "ds-1", Phase::Pending, &report);

    SnapshotReconciler::new(store.clone())
        .reconcile("ds-1", &CancelToken::never())
        .await
        .unwrap();

    let logs = stored_snapshot(&store, "ds-1").status.logs;
    assert!(logs
        .iter()
        .any(|line| line == "Discovery warning: /Systems/1/Memory: status 500"));
}

#[tokio::test]
async fn orphaned_child_is_logged_as_skipped() {
    let mut report = scenario_a_report().await;
    report.edges.insert(
        "/Systems/1/Processors/2".to_string(),
        "/Systems/2".to_string(),
    );
    let store = Arc::new(MemoryStore::new());
    seed_snapshot(&store, "ds-1", Phase::Pending, &report);

    SnapshotReconciler::new(store.clone())
        .reconcile("ds-1", &CancelToken::never())
        .await
        .unwrap();

    let snapshot = stored_snapshot(&store, "ds-1");
    assert_eq!(snapshot.phase(), Phase::Complete);
    assert!(snapshot
        .status
        .logs
        .contains(&"Skipped /Systems/1/Processors/2: parent was not created.".to_string()));
    assert_eq!(store.count(DEVICE_KIND), 2);
}

#[tokio::test]
async fn normalization_failure_moves_to_error() {
    let store = Arc::new(FlakyStore::new().failing_create("CPU-CPU-A1"));
    seed_snapshot(&store.inner, "ds-1", Phase::Pending, &scenario_a_report().await);

    let result = SnapshotReconciler::new(store.clone())
        .reconcile("ds-1", &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(result, ReconcileResult::done());

    let snapshot = stored_snapshot(&store.inner, "ds-1");
    assert_eq!(snapshot.phase(), Phase::Error);
    assert!(snapshot.status.message.contains("CPU-CPU-A1"));
}

#[tokio::test]
async fn failed_save_is_retryable_and_leaves_phase() {
    let store = Arc::new(FlakyStore::new().failing_saves(1));
    seed_snapshot(&store.inner, "ds-1", Phase::Unset, &scenario_a_report().await);
    let reconciler = SnapshotReconciler::new(store.clone());

    let err = reconciler
        .reconcile("ds-1", &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Persistence { ref id, .. } if id == "ds-1"));
    assert!(err.is_retryable());
    assert_eq!(stored_snapshot(&store.inner, "ds-1").phase(), Phase::Unset);

    let retried = reconciler
        .reconcile("ds-1", &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(retried.requeue_after, Some(DEFAULT_REQUEUE_DELAY));
    assert_eq!(stored_snapshot(&store.inner, "ds-1").phase(), Phase::Pending);
}

#[tokio::test]
async fn cancelled_reconcile_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    seed_snapshot(&store, "ds-1", Phase::Pending, &scenario_a_report().await);
    let (handle, token) = CancelHandle::pair();
    handle.cancel();

    let err = SnapshotReconciler::new(store.clone())
        .reconcile("ds-1", &token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn snapshot_stored_under_another_uid_is_invalid() {
    let store = Arc::new(MemoryStore::new());
    let report = scenario_a_report().await;
    let misplaced = Snapshot::from_report("other-uid", &report).unwrap();
    store.seed(SNAPSHOT_KIND, "ds-1", misplaced.encode().unwrap());

    let err = SnapshotReconciler::new(store.clone())
        .reconcile("ds-1", &CancelToken::never())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidResource { ref id, .. } if id == "ds-1"));
    assert!(!err.is_retryable());
    assert_eq!(store.write_count(), 0);
    assert_eq!(store.count(SNAPSHOT_KIND), 1);
}
