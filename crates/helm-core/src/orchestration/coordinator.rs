//! Task lifecycle. One coordinator per engine: monotonic ids, durable
//! records, per-manager FIFO for the serial task class, a global worker
//! budget, and truthful cooperative cancellation.
//!
//! The coordinator is cheap to clone; clones share all state.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime};

use tokio::sync::{Notify, Semaphore, broadcast};

use crate::exec::{CancelToken, output_ledger};
use crate::models::{
    CoreError, CoreResult, ErrorKind, ManagerId, TaskId, TaskLabel, TaskRecord, TaskStatus,
    TaskType,
};
use crate::orchestration::EngineEvent;
use crate::persistence::TaskStore;
use crate::sqlite::SqliteStore;

/// Concurrent adapter executions across all managers.
const WORKER_BUDGET: usize = 8;

/// Terminal-persistence retry schedule.
const PERSIST_BACKOFF: [Duration; 3] = [
    Duration::from_millis(50),
    Duration::from_millis(200),
    Duration::from_millis(800),
];

pub type TaskFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = CoreResult<()>> + Send>>;
pub type TaskOperation = Box<dyn FnOnce(TaskId, CancelToken) -> TaskFuture + Send>;

/// Box an async operation into the erased shape the coordinator runs.
pub fn boxed_operation<F, Fut>(operation: F) -> TaskOperation
where
    F: FnOnce(TaskId, CancelToken) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = CoreResult<()>> + Send + 'static,
{
    Box::new(move |task_id, cancel| {
        let future: TaskFuture = Box::pin(operation(task_id, cancel));
        future
    })
}

/// Every status write goes through the DAG guard. Returns false (and writes
/// nothing) when the edge is illegal.
fn advance_status(record: &mut TaskRecord, next: TaskStatus) -> bool {
    if record.status.can_transition_to(next) {
        record.status = next;
        return true;
    }
    tracing::error!(
        task = %record.id,
        from = record.status.as_str(),
        to = next.as_str(),
        "illegal task status transition rejected"
    );
    false
}

#[derive(Clone, Debug)]
pub struct TaskSpec {
    pub manager: ManagerId,
    pub task_type: TaskType,
    pub label: TaskLabel,
}

struct LiveTask {
    cancel: CancelToken,
    done: Arc<Notify>,
}

/// FIFO turnstile per manager: tickets are taken at submission time, so
/// start order equals submit order regardless of scheduler interleaving.
#[derive(Default)]
struct Turnstile {
    next_ticket: u64,
    serving: u64,
}

struct ManagerQueue {
    turnstile: StdMutex<Turnstile>,
    advanced: Notify,
}

impl ManagerQueue {
    fn new() -> Self {
        Self {
            turnstile: StdMutex::new(Turnstile::default()),
            advanced: Notify::new(),
        }
    }

    fn take_ticket(&self) -> u64 {
        let mut turnstile = self.turnstile.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let ticket = turnstile.next_ticket;
        turnstile.next_ticket += 1;
        ticket
    }

    async fn wait_turn(&self, ticket: u64) {
        loop {
            {
                let turnstile = self.turnstile.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if turnstile.serving == ticket {
                    return;
                }
            }
            let notified = self.advanced.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let turnstile = self.turnstile.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if turnstile.serving == ticket {
                    return;
                }
            }
            notified.await;
        }
    }

    fn advance(&self) {
        let mut turnstile = self.turnstile.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        turnstile.serving += 1;
        drop(turnstile);
        self.advanced.notify_waiters();
    }
}

#[derive(Default)]
struct CoordState {
    live: HashMap<TaskId, LiveTask>,
    queues: HashMap<ManagerId, Arc<ManagerQueue>>,
    /// Reserved ids cancelled before submission; submission short-circuits
    /// them into terminal Cancelled records.
    cancelled_reserved: HashSet<TaskId>,
}

#[derive(Clone)]
pub struct TaskCoordinator {
    store: Arc<SqliteStore>,
    next_id: Arc<AtomicU64>,
    state: Arc<StdMutex<CoordState>>,
    workers: Arc<Semaphore>,
    events: broadcast::Sender<EngineEvent>,
}

impl TaskCoordinator {
    pub fn new(
        store: Arc<SqliteStore>,
        events: broadcast::Sender<EngineEvent>,
    ) -> CoreResult<Self> {
        let next_id = store.max_task_id()?.map(|id| id + 1).unwrap_or(1);
        Ok(Self {
            store,
            next_id: Arc::new(AtomicU64::new(next_id)),
            state: Arc::new(StdMutex::new(CoordState::default())),
            workers: Arc::new(Semaphore::new(WORKER_BUDGET)),
            events,
        })
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Allocate a task id without submitting anything yet. Plan execution
    /// reserves ids up front so cancel-remaining can address steps that have
    /// not reached the queue.
    pub fn reserve_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn submit(&self, spec: TaskSpec, operation: TaskOperation) -> CoreResult<TaskId> {
        let task_id = self.reserve_id();
        self.submit_reserved(task_id, spec, operation).await
    }

    pub async fn submit_reserved(
        &self,
        task_id: TaskId,
        spec: TaskSpec,
        operation: TaskOperation,
    ) -> CoreResult<TaskId> {
        let mut record = TaskRecord {
            id: task_id,
            manager: spec.manager,
            task_type: spec.task_type,
            status: TaskStatus::Queued,
            label: spec.label.clone(),
            created_at: SystemTime::now(),
            terminal_at: None,
            error_kind: None,
        };

        // A reservation cancelled before submission never runs.
        let pre_cancelled = {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.cancelled_reserved.remove(&task_id)
        };
        if pre_cancelled {
            advance_status(&mut record, TaskStatus::Cancelled);
            record.terminal_at = Some(SystemTime::now());
            self.persist_insert(&record).await?;
            self.publish(EngineEvent::TasksChanged);
            return Ok(task_id);
        }

        self.persist_insert(&record).await?;
        self.publish(EngineEvent::TasksChanged);

        let cancel = CancelToken::new();
        let done = Arc::new(Notify::new());
        let queue = {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.live.insert(
                task_id,
                LiveTask {
                    cancel: cancel.clone(),
                    done: done.clone(),
                },
            );
            state
                .queues
                .entry(spec.manager)
                .or_insert_with(|| Arc::new(ManagerQueue::new()))
                .clone()
        };

        let ticket = spec.task_type.is_serial().then(|| queue.take_ticket());

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator
                .drive_task(record, queue, ticket, cancel, done, operation)
                .await;
        });

        Ok(task_id)
    }

    async fn drive_task(
        self,
        mut record: TaskRecord,
        queue: Arc<ManagerQueue>,
        ticket: Option<u64>,
        cancel: CancelToken,
        done: Arc<Notify>,
        operation: TaskOperation,
    ) {
        let task_id = record.id;

        if let Some(ticket) = ticket {
            tokio::select! {
                _ = queue.wait_turn(ticket) => {}
                _ = cancel.cancelled() => {
                    // Cancelled while queued: terminalize without running,
                    // but still consume the turn so the queue keeps moving.
                    let consume_queue = queue.clone();
                    tokio::spawn(async move {
                        consume_queue.wait_turn(ticket).await;
                        consume_queue.advance();
                    });
                    self.finish_task(&mut record, TaskStatus::Cancelled, None, &done)
                        .await;
                    return;
                }
            }
        }

        let advance_guard = ticket.map(|_| AdvanceOnDrop {
            queue: queue.clone(),
        });

        if cancel.is_cancelled() {
            self.finish_task(&mut record, TaskStatus::Cancelled, None, &done)
                .await;
            drop(advance_guard);
            return;
        }

        let _permit = match self.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // Never started; Queued → Cancelled is the truthful edge.
                self.finish_task(
                    &mut record,
                    TaskStatus::Cancelled,
                    Some(CoreError::cancelled("worker pool shut down before the task ran")),
                    &done,
                )
                .await;
                drop(advance_guard);
                return;
            }
        };

        if !advance_status(&mut record, TaskStatus::Running) {
            self.finish_task(&mut record, TaskStatus::Cancelled, None, &done)
                .await;
            drop(advance_guard);
            return;
        }
        self.persist_update(&record).await;
        self.publish(EngineEvent::TasksChanged);
        tracing::debug!(
            task = %task_id,
            manager = %record.manager,
            task_type = record.task_type.as_str(),
            "task running"
        );

        let outcome = operation(task_id, cancel.clone()).await;

        let (status, error) = match outcome {
            Ok(()) if cancel.is_cancelled() => (TaskStatus::Cancelled, None),
            Ok(()) => (TaskStatus::Completed, None),
            Err(error) if error.kind == ErrorKind::Cancelled || cancel.is_cancelled() => {
                (TaskStatus::Cancelled, Some(error))
            }
            Err(error) => (TaskStatus::Failed, Some(error)),
        };

        self.finish_task(&mut record, status, error, &done).await;
        drop(advance_guard);
    }

    async fn finish_task(
        &self,
        record: &mut TaskRecord,
        status: TaskStatus,
        error: Option<CoreError>,
        done: &Arc<Notify>,
    ) {
        if !advance_status(record, status) {
            if record.status.is_terminal() {
                // Double-terminal write; the first outcome stands.
                return;
            }
            // A Queued task has no direct edge to Completed/Failed; route
            // through Running so the terminal write stays on the DAG.
            if !advance_status(record, TaskStatus::Running)
                || !advance_status(record, status)
            {
                return;
            }
        }
        record.terminal_at = Some(SystemTime::now());
        record.error_kind = error.as_ref().map(|error| error.kind);

        if let Some(error) = &error {
            tracing::warn!(
                task = %record.id,
                manager = %record.manager,
                kind = error.kind.as_str(),
                "task failed: {}",
                error.message
            );
            let _ = self.store.append_task_log(
                record.id,
                crate::models::TaskLogLevel::Error,
                &error.message,
            );
        }

        self.persist_update(record).await;

        if let Some(entry) = output_ledger::take(record.id) {
            let _ = self.store.record_output(record.id, &entry.to_task_output());
        }

        {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.live.remove(&record.id);
        }
        done.notify_waiters();
        self.publish(EngineEvent::TasksChanged);
        tracing::debug!(task = %record.id, status = status.as_str(), "task terminal");
    }

    async fn persist_insert(&self, record: &TaskRecord) -> CoreResult<()> {
        let mut last_error = None;
        for (attempt, backoff) in PERSIST_BACKOFF.iter().enumerate() {
            match self.store.insert_task(record) {
                Ok(()) => return Ok(()),
                Err(error) => {
                    tracing::debug!(
                        task = %record.id,
                        attempt,
                        "task insert retry: {}",
                        error.message
                    );
                    last_error = Some(error);
                    tokio::time::sleep(*backoff).await;
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CoreError::storage("task insert failed")))
    }

    async fn persist_update(&self, record: &TaskRecord) {
        for (attempt, backoff) in PERSIST_BACKOFF.iter().enumerate() {
            match self.store.update_task(record) {
                Ok(()) => return,
                Err(error) => {
                    tracing::warn!(
                        task = %record.id,
                        attempt,
                        "task update retry: {}",
                        error.message
                    );
                    tokio::time::sleep(*backoff).await;
                }
            }
        }
        tracing::error!(task = %record.id, "task terminal state could not be persisted");
    }

    /// Idempotent. Returns true when the id is known (live, persisted, or
    /// reserved); a terminal task stays terminal.
    pub async fn cancel(&self, task_id: TaskId) -> CoreResult<bool> {
        if task_id.0 >= self.next_id.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let live = {
            let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.live.get(&task_id).map(|live| live.cancel.clone())
        };

        if let Some(cancel) = live {
            cancel.cancel();
            return Ok(true);
        }

        // Not live: either already terminal in the store, or reserved and
        // never submitted.
        if self.store.task(task_id)?.is_some() {
            return Ok(true);
        }

        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.cancelled_reserved.insert(task_id);
        Ok(true)
    }

    pub async fn wait_terminal(
        &self,
        task_id: TaskId,
        timeout: Option<Duration>,
    ) -> CoreResult<TaskRecord> {
        let deadline = timeout.map(|timeout| tokio::time::Instant::now() + timeout);
        loop {
            let done = {
                let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                state.live.get(&task_id).map(|live| live.done.clone())
            };

            match done {
                None => {
                    return self.store.task(task_id)?.ok_or_else(|| {
                        CoreError::invalid_input(format!("unknown task id '{task_id}'"))
                    });
                }
                Some(done) => {
                    let notified = done.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();

                    // Re-check: the task may have finished between the map
                    // lookup and enabling the waiter.
                    let still_live = {
                        let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                        state.live.contains_key(&task_id)
                    };
                    if !still_live {
                        continue;
                    }

                    match deadline {
                        Some(deadline) => {
                            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                                return Err(CoreError::timeout(format!(
                                    "timed out waiting for task '{task_id}'"
                                )));
                            }
                        }
                        None => notified.await,
                    }
                }
            }
        }
    }

    pub fn list_recent(&self, limit: usize) -> CoreResult<Vec<TaskRecord>> {
        self.store.list_recent_tasks(limit)
    }

    /// Find a queued or running task matching the given shape, for in-flight
    /// de-duplication of refresh and search submissions.
    pub fn find_inflight(
        &self,
        manager: ManagerId,
        task_type: TaskType,
        label: Option<&TaskLabel>,
    ) -> CoreResult<Option<TaskId>> {
        let live_ids: HashSet<TaskId> = {
            let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            state.live.keys().copied().collect()
        };
        if live_ids.is_empty() {
            return Ok(None);
        }

        let tasks = self.store.list_recent_tasks(live_ids.len().max(64))?;
        Ok(tasks
            .into_iter()
            .filter(|task| live_ids.contains(&task.id))
            .filter(|task| task.manager == manager && task.task_type == task_type)
            .filter(|task| !task.status.is_terminal())
            .find(|task| label.is_none_or(|label| task.label == *label))
            .map(|task| task.id))
    }

    fn publish(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

/// Advances the manager turnstile exactly once, even on panic paths.
struct AdvanceOnDrop {
    queue: Arc<ManagerQueue>,
}

impl Drop for AdvanceOnDrop {
    fn drop(&mut self) {
        self.queue.advance();
    }
}
