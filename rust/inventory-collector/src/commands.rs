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

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use inventory_core::{
    redfish, CancelHandle, CancelToken, Controller, DiscoveryReport, GraphNormalizer, Phase,
    RecordStore, Snapshot, SnapshotReconciler, SNAPSHOT_KIND,
};
use serde::Serialize;

use crate::cli::{Command, EndpointArgs};
use crate::config::Config;

pub async fn execute(command: Command, config: &Config) -> Result<()> {
    let cancel = shutdown_token();
    match command {
        Command::Discover(endpoint) => {
            let report = discover(&endpoint, config, &cancel).await?;
            print_json(&report)
        }
        Command::Post(endpoint) => {
            let report = discover(&endpoint, config, &cancel).await?;
            let store = config.open_store()?;
            let summary = GraphNormalizer::new(store)
                .normalize(&report, &cancel)
                .await
                .context("Failed to post discovered devices")?;
            print_json(&summary)
        }
        Command::Submit {
            endpoint,
            id,
            no_wait,
        } => {
            let report = discover(&endpoint, config, &cancel).await?;
            let store = config.open_store()?;
            let id = id.unwrap_or_else(|| format!("ds-{}", uuid::Uuid::new_v4()));
            submit(store.as_ref(), &id, &endpoint.endpoint, &report).await?;
            if no_wait {
                println!("{id}");
                return Ok(());
            }
            reconcile_to_end(store, config, &id, &cancel).await
        }
        Command::Reconcile { id } => {
            let store = config.open_store()?;
            reconcile_to_end(store, config, &id, &cancel).await
        }
        Command::Run => run_controller(config, cancel).await,
    }
}

/// A token that fires on Ctrl-C.
fn shutdown_token() -> CancelToken {
    let (handle, token) = CancelHandle::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            handle.cancel();
        }
    });
    token
}

async fn discover(
    args: &EndpointArgs,
    config: &Config,
    cancel: &CancelToken,
) -> Result<DiscoveryReport> {
    let credentials = config.credentials(args.username.as_deref(), args.password.as_deref())?;
    let report = redfish::discover(&args.endpoint, credentials, &config.client_options(), cancel)
        .await
        .with_context(|| format!("Discovery of {} failed", args.endpoint))?;

    for warning in &report.warnings {
        tracing::warn!(locator = %warning.locator, reason = %warning.reason, "partial discovery");
    }
    Ok(report)
}

/// Stores `report` as a new snapshot. An existing snapshot under `id` is
/// never replaced.
async fn submit(
    store: &dyn RecordStore,
    id: &str,
    endpoint: &str,
    report: &DiscoveryReport,
) -> Result<()> {
    let existing = store
        .load(SNAPSHOT_KIND, id)
        .await
        .with_context(|| format!("Failed to check for snapshot {id}"))?;
    if existing.is_some() {
        bail!("snapshot {id} already exists, submit with a new --id");
    }

    let snapshot = Snapshot::from_report(id, report)?.with_name(endpoint);
    store
        .save(SNAPSHOT_KIND, id, &snapshot.encode()?)
        .await
        .with_context(|| format!("Failed to store snapshot {id}"))?;
    tracing::info!(snapshot = id, records = report.records.len(), "snapshot submitted");
    Ok(())
}

/// Reconciles `id` until it stops asking to be requeued, then prints its
/// final status.
async fn reconcile_to_end(
    store: Arc<dyn RecordStore>,
    config: &Config,
    id: &str,
    cancel: &CancelToken,
) -> Result<()> {
    let reconciler =
        SnapshotReconciler::new(store.clone()).with_requeue_delay(config.requeue_delay());

    while let Some(delay) = reconciler
        .reconcile(id, cancel)
        .await
        .with_context(|| format!("Failed to reconcile snapshot {id}"))?
        .requeue_after
    {
        cancel.run(tokio::time::sleep(delay)).await?;
    }

    let data = store
        .load(SNAPSHOT_KIND, id)
        .await
        .with_context(|| format!("Failed to load snapshot {id}"))?
        .with_context(|| format!("Snapshot {id} not found"))?;
    let snapshot = Snapshot::decode(id, &data)?;
    print_json(&snapshot.status)?;

    if snapshot.phase() == Phase::Error {
        bail!("snapshot {id} failed: {}", snapshot.status.message);
    }
    Ok(())
}

async fn run_controller(config: &Config, cancel: CancelToken) -> Result<()> {
    let store = config.open_store()?;
    let reconciler = Arc::new(
        SnapshotReconciler::new(store.clone()).with_requeue_delay(config.requeue_delay()),
    );
    let controller = Controller::new(reconciler, config.controller_options())
        .context("Invalid controller configuration")?
        .with_resync(store, SNAPSHOT_KIND);

    controller.run(cancel).await?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
