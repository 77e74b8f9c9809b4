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

//! In-process scheduler for reconciliations.
//!
//! A key is never reconciled by two workers at once. Adding a key that is
//! currently running marks it dirty, and it runs once more after the current
//! run finishes. Requeue requests and retry backoff are timers that add the
//! key back to the queue.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::reconcile::{ReconcileResult, SnapshotReconciler};
use crate::store::RecordStore;

/// Something the controller can drive, keyed by resource id.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    async fn reconcile(&self, id: &str, cancel: &CancelToken) -> Result<ReconcileResult>;
}

#[async_trait]
impl Reconciler for SnapshotReconciler {
    async fn reconcile(&self, id: &str, cancel: &CancelToken) -> Result<ReconcileResult> {
        SnapshotReconciler::reconcile(self, id, cancel).await
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Maximum concurrent reconciliations across all keys.
    pub workers: usize,
    /// Retries of a retryable failure before the key is dropped.
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// List the store and enqueue every resource this often.
    pub resync_interval: Option<Duration>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            max_retries: 5,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            resync_interval: None,
        }
    }
}

impl ControllerOptions {
    /// Delay before retry number `attempt` (1-based): doubles each time, capped
    /// at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config(
                "controller needs at least one worker".to_string(),
            ));
        }
        if self.resync_interval == Some(Duration::ZERO) {
            return Err(Error::Config("resync interval must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<String>,
    queued: HashSet<String>,
    running: HashSet<String>,
    dirty: HashSet<String>,
}

/// FIFO of keys with per-key exclusivity.
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `key` unless it is already waiting. A running key is marked
    /// dirty instead.
    pub fn add(&self, key: &str) {
        let mut state = self.state.lock();
        if state.running.contains(key) {
            state.dirty.insert(key.to_string());
            return;
        }
        if state.queued.insert(key.to_string()) {
            state.pending.push_back(key.to_string());
            drop(state);
            self.notify.notify_one();
        }
    }

    fn try_next(&self) -> Option<String> {
        let mut state = self.state.lock();
        let key = state.pending.pop_front()?;
        state.queued.remove(&key);
        state.running.insert(key.clone());
        Some(key)
    }

    /// Waits for the next key and marks it running. Returns `None` once
    /// `cancel` fires.
    pub async fn next(&self, cancel: &CancelToken) -> Option<String> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(key) = self.try_next() {
                return Some(key);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Releases a running key, re-adding it if it was marked dirty meanwhile.
    pub fn done(&self, key: &str) {
        let dirty = {
            let mut state = self.state.lock();
            state.running.remove(key);
            state.dirty.remove(key)
        };
        if dirty {
            self.add(key);
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.state.lock().running.contains(key)
    }

    /// Keys waiting to run.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases a running key on drop, so a panicking reconcile does not pin it.
struct RunningKey {
    queue: Arc<WorkQueue>,
    key: String,
}

impl Drop for RunningKey {
    fn drop(&mut self) {
        self.queue.done(&self.key);
    }
}

struct Shared<R> {
    reconciler: Arc<R>,
    queue: Arc<WorkQueue>,
    options: ControllerOptions,
    failures: Mutex<HashMap<String, u32>>,
}

pub struct Controller<R> {
    shared: Arc<Shared<R>>,
    resync: Option<(Arc<dyn RecordStore>, &'static str)>,
}

impl<R: Reconciler> Controller<R> {
    pub fn new(reconciler: Arc<R>, options: ControllerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                reconciler,
                queue: Arc::new(WorkQueue::new()),
                options,
                failures: Mutex::new(HashMap::new()),
            }),
            resync: None,
        })
    }

    /// Periodically enqueues every `kind` record in `store`. Needs
    /// `resync_interval` to be set.
    pub fn with_resync(mut self, store: Arc<dyn RecordStore>, kind: &'static str) -> Self {
        self.resync = Some((store, kind));
        self
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        self.shared.queue.clone()
    }

    pub fn enqueue(&self, key: &str) {
        self.shared.queue.add(key);
    }

    /// Processes keys until `cancel` fires, then waits for in-flight
    /// reconciliations to return.
    pub async fn run(self, cancel: CancelToken) -> Result<()> {
        let shared = self.shared;
        let options = &shared.options;
        tracing::info!(
            workers = options.workers,
            max_retries = options.max_retries,
            resync_secs = ?options.resync_interval.map(|d| d.as_secs()),
            "controller started"
        );

        let resync = match (self.resync, options.resync_interval) {
            (Some((store, kind)), Some(interval)) => Some(tokio::spawn(resync_loop(
                store,
                kind,
                shared.queue.clone(),
                interval,
                cancel.clone(),
            ))),
            _ => None,
        };

        let permits = Arc::new(Semaphore::new(options.workers));
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!(error = %err, "reconcile task failed");
                    }
                }
                permit = permits.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };
                    let Some(key) = shared.queue.next(&cancel).await else { break };
                    let shared = shared.clone();
                    let cancel = cancel.clone();
                    tasks.spawn(async move {
                        let running = RunningKey {
                            queue: shared.queue.clone(),
                            key,
                        };
                        let outcome = shared.reconciler.reconcile(&running.key, &cancel).await;
                        handle_outcome(&shared, &running.key, outcome, &cancel);
                        drop(running);
                        drop(permit);
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "reconcile task failed");
            }
        }
        if let Some(handle) = resync {
            let _ = handle.await;
        }
        tracing::info!("controller stopped");
        Ok(())
    }
}

fn handle_outcome<R>(
    shared: &Arc<Shared<R>>,
    key: &str,
    outcome: Result<ReconcileResult>,
    cancel: &CancelToken,
) {
    let options = &shared.options;
    match outcome {
        Ok(result) => {
            shared.failures.lock().remove(key);
            if let Some(delay) = result.requeue_after {
                tracing::debug!(key, delay_ms = delay.as_millis() as u64, "requeue requested");
                schedule(shared.queue.clone(), key, delay, cancel);
            }
        }
        Err(Error::Cancelled) if cancel.is_cancelled() => {}
        Err(err) if err.is_retryable() => {
            let attempt = {
                let mut failures = shared.failures.lock();
                let count = failures.entry(key.to_string()).or_insert(0);
                *count += 1;
                *count
            };
            if attempt > options.max_retries {
                tracing::error!(key, attempts = attempt, error = %err, "giving up on reconciliation");
                shared.failures.lock().remove(key);
                return;
            }
            let delay = options.backoff(attempt);
            tracing::warn!(
                key,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "reconciliation failed, retrying"
            );
            schedule(shared.queue.clone(), key, delay, cancel);
        }
        Err(err) => {
            shared.failures.lock().remove(key);
            tracing::error!(key, error = %err, "reconciliation failed");
        }
    }
}

/// Adds `key` back after `delay` unless `cancel` fires first.
fn schedule(queue: Arc<WorkQueue>, key: &str, delay: Duration, cancel: &CancelToken) {
    let key = key.to_string();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => queue.add(&key),
        }
    });
}

async fn resync_loop(
    store: Arc<dyn RecordStore>,
    kind: &'static str,
    queue: Arc<WorkQueue>,
    interval: Duration,
    cancel: CancelToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        match cancel.run(store.list(kind)).await {
            Ok(Ok(ids)) => {
                tracing::debug!(kind, count = ids.len(), "resync");
                for id in ids {
                    queue.add(&id);
                }
            }
            Ok(Err(err)) => tracing::warn!(kind, error = %err, "resync listing failed"),
            Err(_) => return,
        }
    }
}
