//! Task registry and lifecycle state machine.
//!
//! The registry exclusively owns the set of live tasks and is the only
//! component that mutates task state. It is accessed concurrently from
//! caller threads (submission, control operations) and from gateway event
//! pumps (progress and terminal notifications).
//!
//! Locking: a coarse `RwLock` protects the id-to-task map, and each task sits
//! behind its own `Mutex`. Batch operations snapshot the key set and then
//! lock tasks one at a time, so independent tasks never contend for the same
//! lock and no task stays locked for a whole batch.
//!
//! State machine:
//!
//! ```text
//! Pending   --dispatch accepted-->        Running
//! Running   --suspend-->                  Suspended
//! Suspended --resume-->                   Running
//! Running   --gateway success-->          Completed
//! Running   --gateway error-->            Failed
//! {Pending,Running,Suspended} --cancel--> Cancelled
//! ```
//!
//! Terminal states absorb: control operations against them are silent
//! no-ops, and no callback ever fires after a terminal state is reached.
//! Control transitions are applied optimistically ahead of the gateway's
//! acknowledgment; a late gateway event against an already-terminal task is
//! ignored, which is how the two views reconcile.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use crate::cache::CacheProvider;
use crate::config::{EffectiveConfig, Fingerprint};
use crate::error::{Error, Result};
use crate::gateway::{event_channel, Gateway, GatewayEvent, GatewayHandle};
use crate::reform::{reform, Reformer};
use crate::types::{RawResponse, ReformedResult, RequestDescriptor, TaskId, TaskState, TransferProgress};

/// Progress callback; may fire many times before a terminal callback.
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Success callback; fires at most once, mutually exclusive with failure.
/// Receives the reformed result, whose own indicator may still report a
/// business failure.
pub type SuccessCallback = Box<dyn FnOnce(ReformedResult, RawResponse) + Send>;

/// Failure callback; fires at most once, mutually exclusive with success.
/// Carries the raw response when one was received (reformation failures).
pub type FailureCallback = Box<dyn FnOnce(Error, Option<RawResponse>) + Send>;

/// The caller-registered callbacks for one task.
#[derive(Default)]
pub struct TaskCallbacks {
    /// Invoked on each progress event.
    pub progress: Option<ProgressCallback>,
    /// Invoked when the task completes without a reformation error.
    pub success: Option<SuccessCallback>,
    /// Invoked when the transport fails or the reformation strategy errors.
    pub failure: Option<FailureCallback>,
}

/// Everything needed to dispatch one request.
pub struct Submission {
    /// The immutable request definition.
    pub descriptor: RequestDescriptor,
    /// The resolved configuration for this dispatch.
    pub config: EffectiveConfig,
    /// Optional reformation strategy applied to the raw response.
    pub reformer: Option<Arc<dyn Reformer>>,
    /// Caller callbacks.
    pub callbacks: TaskCallbacks,
    /// When set, successful responses are stored here after completion.
    pub cache: Option<(Arc<dyn CacheProvider>, Fingerprint)>,
}

/// Per-element outcome of a batch control operation.
///
/// Batches apply per-element: unknown identifiers are reported here and do
/// not affect sibling identifiers. An empty failure list means every element
/// was either applied or was a tolerated no-op.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// The identifiers that could not be processed, with their errors.
    pub failures: Vec<(TaskId, Error)>,
}

impl BatchOutcome {
    /// True when no element failed.
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One registry-tracked unit of work.
struct TaskEntry {
    id: TaskId,
    state: TaskState,
    #[allow(dead_code)] // kept for inspection and future retry support
    descriptor: RequestDescriptor,
    callbacks: TaskCallbacks,
    handle: Option<GatewayHandle>,
    /// Wakes the dispatch task when a pre-dispatch suspend is lifted (or the
    /// task is cancelled).
    wake: Arc<Notify>,
}

impl TaskEntry {
    /// Move to a terminal state, releasing the gateway handle and any
    /// callbacks that must never fire afterwards.
    fn finish(&mut self, state: TaskState) -> TaskCallbacks {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.handle = None;
        std::mem::take(&mut self.callbacks)
    }
}

/// The task registry: allocates identifiers, tracks per-task state, and
/// exposes the pause/resume/cancel control surface.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Arc<Mutex<TaskEntry>>>>,
    next_id: AtomicU64,
    gateway: Arc<dyn Gateway>,
}

impl TaskRegistry {
    /// Create a registry dispatching through the given gateway.
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            gateway,
        }
    }

    // ── Submission ──────────────────────────────────────────────

    /// Submit a request for dispatch.
    ///
    /// Allocates an identifier, creates a `Pending` task, hands off to the
    /// gateway in the background, and returns the identifier without waiting
    /// for any network I/O. The task is addressable (and cancellable) the
    /// moment this returns.
    pub async fn submit(self: &Arc<Self>, submission: Submission) -> Result<TaskId> {
        submission.descriptor.validate()?;

        let Submission {
            descriptor,
            config,
            reformer,
            callbacks,
            cache,
        } = submission;

        let id = self.insert_pending(descriptor.clone(), callbacks).await;
        info!(task_id = id, url = %config.url, "task submitted");

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            registry.dispatch_and_pump(id, descriptor, config, reformer, cache).await;
        });

        Ok(id)
    }

    /// Submit a request whose response is already known (cache hit).
    ///
    /// The task still exists and transitions `Pending -> Completed`, so the
    /// caller observes the same lifecycle as a dispatched request, but the
    /// gateway is never touched.
    pub async fn submit_prefetched(
        self: &Arc<Self>,
        descriptor: RequestDescriptor,
        raw: RawResponse,
        reformer: Option<Arc<dyn Reformer>>,
        callbacks: TaskCallbacks,
    ) -> Result<TaskId> {
        descriptor.validate()?;

        let id = self.insert_pending(descriptor, callbacks).await;
        info!(task_id = id, "task submitted with prefetched response");

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(entry) = registry.entry(id).await {
                registry.complete(&entry, reformer.as_deref(), raw, None).await;
            }
        });

        Ok(id)
    }

    async fn insert_pending(&self, descriptor: RequestDescriptor, callbacks: TaskCallbacks) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Mutex::new(TaskEntry {
            id,
            state: TaskState::Pending,
            descriptor,
            callbacks,
            handle: None,
            wake: Arc::new(Notify::new()),
        }));
        self.tasks.write().await.insert(id, entry);
        id
    }

    /// Hand the request to the gateway and pump its events until the
    /// terminal one.
    async fn dispatch_and_pump(
        &self,
        id: TaskId,
        descriptor: RequestDescriptor,
        config: EffectiveConfig,
        reformer: Option<Arc<dyn Reformer>>,
        cache: Option<(Arc<dyn CacheProvider>, Fingerprint)>,
    ) {
        let Some(entry) = self.entry(id).await else {
            return;
        };

        // The caller may have cancelled or suspended between submit and
        // here. A cancelled task never touches the gateway; a suspended one
        // parks and is handed off only once resumed.
        loop {
            let wake = {
                let guard = entry.lock().await;
                match guard.state {
                    TaskState::Cancelled => {
                        debug!(task_id = id, "cancelled before dispatch, skipping gateway");
                        return;
                    }
                    TaskState::Suspended => {
                        debug!(task_id = id, "suspended before dispatch, holding gateway");
                        Arc::clone(&guard.wake)
                    }
                    _ => break,
                }
            };
            wake.notified().await;
        }

        let (events_tx, mut events_rx) = event_channel();
        let dispatched = self
            .gateway
            .dispatch(config, descriptor, events_tx)
            .await;

        let handle = match dispatched {
            Ok(handle) => handle,
            Err(err) => {
                warn!(task_id = id, error = %err, "gateway rejected dispatch");
                self.fail(&entry, err, None).await;
                return;
            }
        };

        // Reconcile the handle with whatever state the caller set while the
        // dispatch was in flight.
        {
            let mut guard = entry.lock().await;
            match guard.state {
                TaskState::Pending => {
                    guard.state = TaskState::Running;
                    guard.handle = Some(handle);
                }
                TaskState::Suspended => {
                    let _ = self.gateway.suspend(&handle).await;
                    guard.handle = Some(handle);
                }
                TaskState::Cancelled => {
                    let _ = self.gateway.cancel(&handle).await;
                    // Terminal; the handle is not retained.
                }
                _ => {
                    guard.handle = Some(handle);
                }
            }
        }

        while let Some(event) = events_rx.recv().await {
            match event {
                GatewayEvent::Progress(progress) => {
                    let guard = entry.lock().await;
                    // Progress never fires once a terminal state is reached.
                    if guard.state.is_terminal() {
                        continue;
                    }
                    if let Some(cb) = &guard.callbacks.progress {
                        cb(progress);
                    }
                }
                GatewayEvent::Completed(raw) => {
                    self.complete(&entry, reformer.as_deref(), raw, cache.as_ref()).await;
                }
                GatewayEvent::Failed(err) => {
                    self.fail(&entry, err, None).await;
                }
            }
        }
    }

    /// Terminal-success path: transition, reform, invoke the callback,
    /// optionally populate the cache.
    async fn complete(
        &self,
        entry: &Arc<Mutex<TaskEntry>>,
        reformer: Option<&dyn Reformer>,
        raw: RawResponse,
        cache: Option<&(Arc<dyn CacheProvider>, Fingerprint)>,
    ) {
        let mut guard = entry.lock().await;
        if guard.state.is_terminal() {
            debug!(task_id = guard.id, state = %guard.state, "ignoring late completion");
            return;
        }
        let id = guard.id;
        let callbacks = guard.finish(TaskState::Completed);
        debug!(task_id = id, "task completed");

        let reformed = reform(&raw, reformer);
        let succeeded = reformed.is_success;

        // Callbacks are synchronous closures; invoking them under the entry
        // lock guarantees nothing fires after the terminal transition.
        //
        // A reformation error (strategy fault or panic) goes to the failure
        // callback. A strategy that deliberately reported a business failure
        // still delivers through the success callback, with its own
        // indicator set to false, so the caller sees the reformed payload.
        if let Some(err) = reformed.error.clone() {
            if let Some(cb) = callbacks.failure {
                cb(err, Some(raw.clone()));
            }
        } else if let Some(cb) = callbacks.success {
            cb(reformed, raw.clone());
        }
        drop(guard);

        if succeeded && raw.is_success {
            if let Some((provider, fingerprint)) = cache {
                if let Err(err) = provider.store(fingerprint, &raw).await {
                    warn!(task_id = id, error = %err, "cache store failed");
                }
            }
        }
    }

    /// Terminal-failure path: transition and invoke the failure callback.
    async fn fail(&self, entry: &Arc<Mutex<TaskEntry>>, err: Error, raw: Option<RawResponse>) {
        let mut guard = entry.lock().await;
        if guard.state.is_terminal() {
            debug!(task_id = guard.id, state = %guard.state, "ignoring late failure");
            return;
        }
        let id = guard.id;
        let callbacks = guard.finish(TaskState::Failed);
        debug!(task_id = id, error = %err, "task failed");
        if let Some(cb) = callbacks.failure {
            cb(err, raw);
        }
    }

    // ── Control operations ──────────────────────────────────────

    /// Pause one task.
    ///
    /// `Pending` and `Running` tasks move to `Suspended` (a task suspended
    /// while still pending is never dispatched until resumed). Terminal
    /// tasks are a silent no-op; unknown identifiers are an error.
    pub async fn suspend(&self, id: TaskId) -> Result<()> {
        let entry = self.entry(id).await.ok_or_else(|| Error::unknown_task(id))?;
        let mut guard = entry.lock().await;
        match guard.state {
            TaskState::Pending | TaskState::Running => {
                guard.state = TaskState::Suspended;
                debug!(task_id = id, "task suspended");
                if let Some(handle) = &guard.handle {
                    self.gateway.suspend(handle).await?;
                }
                Ok(())
            }
            // Already suspended or terminal: tolerated no-op.
            _ => Ok(()),
        }
    }

    /// Resume one suspended task. Terminal tasks are a silent no-op;
    /// unknown identifiers are an error.
    pub async fn resume(&self, id: TaskId) -> Result<()> {
        let entry = self.entry(id).await.ok_or_else(|| Error::unknown_task(id))?;
        let mut guard = entry.lock().await;
        match guard.state {
            TaskState::Suspended => {
                guard.state = TaskState::Running;
                debug!(task_id = id, "task resumed");
                // Release a dispatch task parked on a pre-dispatch suspend.
                guard.wake.notify_one();
                if let Some(handle) = &guard.handle {
                    self.gateway.resume(handle).await?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Cancel one task.
    ///
    /// The local transition to `Cancelled` is authoritative for the
    /// caller's view; the gateway tears the transfer down cooperatively.
    /// Callbacks are released without being invoked. Terminal tasks are a
    /// silent no-op; unknown identifiers are an error.
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let entry = self.entry(id).await.ok_or_else(|| Error::unknown_task(id))?;
        let mut guard = entry.lock().await;
        if guard.state.is_terminal() {
            return Ok(());
        }
        let handle = guard.handle.take();
        // Callbacks are released without being invoked.
        drop(guard.finish(TaskState::Cancelled));
        // A dispatch task parked on a pre-dispatch suspend re-checks the
        // state and bails out.
        guard.wake.notify_one();
        debug!(task_id = id, "task cancelled");
        if let Some(handle) = &handle {
            self.gateway.cancel(handle).await?;
        }
        Ok(())
    }

    /// Suspend a batch of tasks, applying the per-element policy.
    pub async fn suspend_batch(&self, ids: &[TaskId]) -> BatchOutcome {
        self.batch(ids, |id| self.suspend(id)).await
    }

    /// Resume a batch of tasks, applying the per-element policy.
    pub async fn resume_batch(&self, ids: &[TaskId]) -> BatchOutcome {
        self.batch(ids, |id| self.resume(id)).await
    }

    /// Cancel a batch of tasks, applying the per-element policy.
    pub async fn cancel_batch(&self, ids: &[TaskId]) -> BatchOutcome {
        self.batch(ids, |id| self.cancel(id)).await
    }

    /// Suspend every live task.
    pub async fn suspend_all(&self) {
        let ids = self.ids().await;
        let _ = self.suspend_batch(&ids).await;
    }

    /// Resume every suspended task.
    pub async fn resume_all(&self) {
        let ids = self.ids().await;
        let _ = self.resume_batch(&ids).await;
    }

    /// Cancel every live task.
    pub async fn cancel_all(&self) {
        let ids = self.ids().await;
        let _ = self.cancel_batch(&ids).await;
    }

    async fn batch<'a, F, Fut>(&'a self, ids: &[TaskId], op: F) -> BatchOutcome
    where
        F: Fn(TaskId) -> Fut,
        Fut: std::future::Future<Output = Result<()>> + 'a,
    {
        let mut outcome = BatchOutcome::default();
        for &id in ids {
            if let Err(err) = op(id).await {
                debug!(task_id = id, error = %err, "batch element failed");
                outcome.failures.push((id, err));
            }
        }
        outcome
    }

    // ── Queries & maintenance ───────────────────────────────────

    /// True iff at least one task is `Pending` or `Running`.
    pub async fn is_loading(&self) -> bool {
        let entries: Vec<_> = self.tasks.read().await.values().cloned().collect();
        for entry in entries {
            if entry.lock().await.state.is_active() {
                return true;
            }
        }
        false
    }

    /// The current state of a task.
    pub async fn task_state(&self, id: TaskId) -> Result<TaskState> {
        let entry = self.entry(id).await.ok_or_else(|| Error::unknown_task(id))?;
        let guard = entry.lock().await;
        Ok(guard.state)
    }

    /// Number of tracked tasks, terminal ones included.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// True when the registry tracks no tasks.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Remove every task in a terminal state, returning how many were
    /// dropped. Control operations on the removed identifiers report
    /// `UnknownTask` afterwards.
    pub async fn purge_terminal(&self) -> usize {
        let snapshot: Vec<_> = {
            let tasks = self.tasks.read().await;
            tasks.iter().map(|(id, e)| (*id, Arc::clone(e))).collect()
        };
        let mut finished = Vec::new();
        for (id, entry) in snapshot {
            if entry.lock().await.state.is_terminal() {
                finished.push(id);
            }
        }
        let mut tasks = self.tasks.write().await;
        let mut removed = 0;
        for id in finished {
            if tasks.remove(&id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    async fn ids(&self) -> Vec<TaskId> {
        self.tasks.read().await.keys().copied().collect()
    }

    async fn entry(&self, id: TaskId) -> Option<Arc<Mutex<TaskEntry>>> {
        self.tasks.read().await.get(&id).cloned()
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
