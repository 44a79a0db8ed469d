//! Correlation of task ids with pending results.
//!
//! A task has exactly one caller (blocked on a single value, or draining a
//! stream of chunks) and one agent producing the result asynchronously.
//! Whichever side shows up first creates the record; whichever side resolves
//! it first (a completion or a timeout) purges it.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde_json::Value;
use thiserror::Error;
use tokio::{
    sync::Notify,
    time::{Instant, timeout_at},
};

use crate::STREAM_SENTINEL;

/// How a task delivers its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    /// One terminal value.
    Single,
    /// Chunks closed by the stream sentinel.
    Stream,
}

/// Lifecycle of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Nothing received yet.
    PendingStart,
    /// A caller waits for the single value.
    PendingComplete,
    /// At least one chunk arrived.
    Streaming,
    /// Result complete, waiting to be collected.
    Completed,
}

/// Timeouts a caller attached to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTimeouts {
    /// Overall wait for a single value.
    pub overall: Duration,
    /// Wait for the first chunk, from the start of the call.
    pub start: Duration,
    /// Budget from the first chunk until completion.
    pub completion: Duration,
}

impl TaskTimeouts {
    #[must_use]
    pub const fn single(timeout: Duration) -> Self {
        Self {
            overall: timeout,
            start: timeout,
            completion: timeout,
        }
    }

    #[must_use]
    pub const fn stream(start: Duration, completion: Duration) -> Self {
        Self {
            overall: completion,
            start,
            completion,
        }
    }
}

/// Task correlation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Response timeout for task {0}")]
    ResponseTimeout(String),
    #[error("Response start timeout for task {0}")]
    StreamStartTimeout(String),
    #[error("Response completed timeout for task {0}")]
    StreamCompletionTimeout(String),
    #[error("Task {task_id} expects {expected:?} results but got {actual:?}")]
    ProtocolViolation {
        task_id: String,
        expected: TaskMode,
        actual: TaskMode,
    },
    #[error("Task {0} already has a waiting caller")]
    AlreadyAwaited(String),
}

impl TaskError {
    /// Whether the error is one of the caller-visible timeouts.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ResponseTimeout(_) | Self::StreamStartTimeout(_) | Self::StreamCompletionTimeout(_)
        )
    }
}

struct RecordState {
    timeouts: Option<TaskTimeouts>,
    awaiting: bool,
    first_chunk_at: Option<Instant>,
    completed: bool,
    chunks: VecDeque<Value>,
    value: Option<Value>,
    violation: Option<TaskMode>,
}

struct TaskRecord {
    mode: TaskMode,
    created_at: Instant,
    notify: Notify,
    state: Mutex<RecordState>,
}

impl TaskRecord {
    fn new(mode: TaskMode) -> Self {
        Self {
            mode,
            created_at: Instant::now(),
            notify: Notify::new(),
            state: Mutex::new(RecordState {
                timeouts: None,
                awaiting: false,
                first_chunk_at: None,
                completed: false,
                chunks: VecDeque::new(),
                value: None,
                violation: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn task_state(&self) -> TaskState {
        let state = self.lock();
        if state.completed {
            TaskState::Completed
        } else {
            match self.mode {
                TaskMode::Single if state.awaiting => TaskState::PendingComplete,
                TaskMode::Stream if state.first_chunk_at.is_some() => TaskState::Streaming,
                _ => TaskState::PendingStart,
            }
        }
    }

    fn violation(&self, task_id: &str, state: &RecordState) -> Option<TaskError> {
        state.violation.map(|actual| TaskError::ProtocolViolation {
            task_id: task_id.to_string(),
            expected: self.mode,
            actual,
        })
    }

    fn take_single(&self, task_id: &str) -> Option<Result<Value, TaskError>> {
        let mut state = self.lock();
        if let Some(err) = self.violation(task_id, &state) {
            return Some(Err(err));
        }
        if !state.completed {
            return None;
        }
        Some(Ok(state.value.take().unwrap_or(Value::Null)))
    }

    fn drain(&self, task_id: &str) -> Result<(Vec<Value>, bool, Option<Instant>), TaskError> {
        let mut state = self.lock();
        if let Some(err) = self.violation(task_id, &state) {
            return Err(err);
        }
        let chunks = state.chunks.drain(..).collect();
        Ok((chunks, state.completed, state.first_chunk_at))
    }
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, Arc<TaskRecord>>,
    tombstones: HashMap<String, Instant>,
}

/// Rendezvous between callers awaiting task results and agents producing
/// them.
#[derive(Default)]
pub struct TaskStore {
    inner: Mutex<Inner>,
}

impl TaskStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the caller side of a task, or adopt the record an early
    /// completion already created.
    ///
    /// # Errors
    /// Returns `ProtocolViolation` if the existing record uses the other mode.
    pub fn create_or_get(
        &self,
        task_id: &str,
        mode: TaskMode,
        timeouts: TaskTimeouts,
    ) -> Result<TaskState, TaskError> {
        let record = self.claim(task_id, mode, timeouts)?;
        Ok(record.task_state())
    }

    fn claim(
        &self,
        task_id: &str,
        mode: TaskMode,
        timeouts: TaskTimeouts,
    ) -> Result<Arc<TaskRecord>, TaskError> {
        let mut inner = self.lock();
        inner.tombstones.remove(task_id);
        let record = Arc::clone(
            inner
                .records
                .entry(task_id.to_string())
                .or_insert_with(|| Arc::new(TaskRecord::new(mode))),
        );
        if record.mode != mode {
            // A record with a live waiter belongs to that waiter.
            if !record.lock().awaiting {
                inner.records.remove(task_id);
                inner.tombstones.insert(task_id.to_string(), Instant::now());
            }
            return Err(TaskError::ProtocolViolation {
                task_id: task_id.to_string(),
                expected: mode,
                actual: record.mode,
            });
        }
        let mut state = record.lock();
        if !state.awaiting {
            state.timeouts = Some(timeouts);
        }
        drop(state);
        Ok(record)
    }

    fn attach(
        &self,
        task_id: &str,
        mode: TaskMode,
        timeouts: TaskTimeouts,
    ) -> Result<Arc<TaskRecord>, TaskError> {
        let record = self.claim(task_id, mode, timeouts)?;
        let mut state = record.lock();
        if state.awaiting {
            return Err(TaskError::AlreadyAwaited(task_id.to_string()));
        }
        state.awaiting = true;
        drop(state);
        Ok(record)
    }

    /// Record for the agent side; `None` once the caller is gone.
    fn producer_record(&self, task_id: &str, mode: TaskMode) -> Option<Arc<TaskRecord>> {
        let mut inner = self.lock();
        if inner.tombstones.contains_key(task_id) {
            return None;
        }
        let record = Arc::clone(
            inner
                .records
                .entry(task_id.to_string())
                .or_insert_with(|| Arc::new(TaskRecord::new(mode))),
        );
        Some(record)
    }

    fn purge(&self, task_id: &str, record: &Arc<TaskRecord>) {
        let mut inner = self.lock();
        let current = inner
            .records
            .get(task_id)
            .is_some_and(|r| Arc::ptr_eq(r, record));
        if current {
            inner.records.remove(task_id);
            inner.tombstones.insert(task_id.to_string(), Instant::now());
        }
    }

    /// Wait for a single result.
    ///
    /// The record is purged when this returns or is dropped.
    ///
    /// # Errors
    /// Returns `ResponseTimeout` if nothing arrives within `timeout`.
    pub async fn await_single(&self, task_id: &str, timeout: Duration) -> Result<Value, TaskError> {
        let record = self.attach(task_id, TaskMode::Single, TaskTimeouts::single(timeout))?;
        let _guard = PurgeGuard::new(self, task_id, &record);
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(outcome) = record.take_single(task_id) {
                return outcome;
            }
            if timeout_at(deadline, record.notify.notified()).await.is_err() {
                return record
                    .take_single(task_id)
                    .unwrap_or_else(|| Err(TaskError::ResponseTimeout(task_id.to_string())));
            }
        }
    }

    /// Drain a streamed result into `on_chunk`, in arrival order.
    ///
    /// `start_timeout` runs from the call until the first chunk arrives;
    /// `completion_timeout` runs from the first chunk's arrival until the
    /// sentinel and is not extended by later chunks. The record is purged
    /// when this returns or is dropped.
    ///
    /// # Errors
    /// Returns `StreamStartTimeout` or `StreamCompletionTimeout` when the
    /// matching deadline passes.
    pub async fn await_stream<F>(
        &self,
        task_id: &str,
        start_timeout: Duration,
        completion_timeout: Duration,
        mut on_chunk: F,
    ) -> Result<(), TaskError>
    where
        F: FnMut(Value) + Send,
    {
        let timeouts = TaskTimeouts::stream(start_timeout, completion_timeout);
        let record = self.attach(task_id, TaskMode::Stream, timeouts)?;
        let _guard = PurgeGuard::new(self, task_id, &record);
        let started = Instant::now();

        loop {
            let (chunks, completed, first_chunk_at) = record.drain(task_id)?;
            for chunk in chunks {
                on_chunk(chunk);
            }
            if completed {
                return Ok(());
            }

            let deadline =
                first_chunk_at.map_or(started + start_timeout, |at| at + completion_timeout);
            if Instant::now() >= deadline {
                return Err(match first_chunk_at {
                    None => TaskError::StreamStartTimeout(task_id.to_string()),
                    Some(_) => TaskError::StreamCompletionTimeout(task_id.to_string()),
                });
            }
            let _ = timeout_at(deadline, record.notify.notified()).await;
        }
    }

    /// Store the single result of a task.
    ///
    /// Completions for purged tasks are ignored.
    ///
    /// # Errors
    /// Returns `ProtocolViolation` if the task is a stream.
    pub fn complete_single(&self, task_id: &str, value: Value) -> Result<(), TaskError> {
        let Some(record) = self.producer_record(task_id, TaskMode::Single) else {
            tracing::debug!(task_id, "Ignoring completion for purged task");
            return Ok(());
        };
        if record.mode != TaskMode::Single {
            return Err(self.reject(task_id, &record, TaskMode::Single));
        }

        let mut state = record.lock();
        if state.completed {
            tracing::debug!(task_id, "Ignoring duplicate completion");
            return Ok(());
        }
        state.value = Some(value);
        state.completed = true;
        drop(state);

        record.notify.notify_one();
        Ok(())
    }

    /// Append one chunk of a streamed result; the sentinel completes it.
    ///
    /// Chunks for purged tasks are ignored.
    ///
    /// # Errors
    /// Returns `ProtocolViolation` if the task expects a single value.
    pub fn append_chunk(&self, task_id: &str, value: Value) -> Result<(), TaskError> {
        let Some(record) = self.producer_record(task_id, TaskMode::Stream) else {
            tracing::debug!(task_id, "Ignoring chunk for purged task");
            return Ok(());
        };
        if record.mode != TaskMode::Stream {
            return Err(self.reject(task_id, &record, TaskMode::Stream));
        }

        let mut state = record.lock();
        if state.completed {
            tracing::debug!(task_id, "Ignoring chunk after stream end");
            return Ok(());
        }
        if value.as_str() == Some(STREAM_SENTINEL) {
            state.completed = true;
        } else {
            state.first_chunk_at.get_or_insert_with(Instant::now);
            state.chunks.push_back(value);
        }
        drop(state);

        record.notify.notify_one();
        Ok(())
    }

    /// Flag a mode mismatch on the record so a waiting caller fails fast.
    fn reject(&self, task_id: &str, record: &Arc<TaskRecord>, actual: TaskMode) -> TaskError {
        let mut state = record.lock();
        state.violation.get_or_insert(actual);
        let awaited = state.awaiting;
        drop(state);

        if awaited {
            record.notify.notify_one();
        } else {
            self.purge(task_id, record);
        }
        TaskError::ProtocolViolation {
            task_id: task_id.to_string(),
            expected: record.mode,
            actual,
        }
    }

    /// Current state of a live task.
    #[must_use]
    pub fn state(&self, task_id: &str) -> Option<TaskState> {
        let record = self.lock().records.get(task_id).cloned();
        record.map(|r| r.task_state())
    }

    /// Timeouts the caller attached to a live task.
    #[must_use]
    pub fn timeouts(&self, task_id: &str) -> Option<TaskTimeouts> {
        let record = self.lock().records.get(task_id).cloned();
        record.and_then(|r| r.lock().timeouts)
    }

    /// Number of live task records.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Drop records older than `ttl` that no caller is waiting on, and
    /// tombstones older than `ttl`. Returns the number of records dropped.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.records.len();
        inner
            .records
            .retain(|_, r| r.lock().awaiting || now.duration_since(r.created_at) < ttl);
        inner
            .tombstones
            .retain(|_, purged_at| now.duration_since(*purged_at) < ttl);
        before - inner.records.len()
    }
}

/// Purges a task record when its caller returns or is cancelled.
struct PurgeGuard<'a> {
    store: &'a TaskStore,
    task_id: &'a str,
    record: Arc<TaskRecord>,
}

impl<'a> PurgeGuard<'a> {
    fn new(store: &'a TaskStore, task_id: &'a str, record: &Arc<TaskRecord>) -> Self {
        Self {
            store,
            task_id,
            record: Arc::clone(record),
        }
    }
}

impl Drop for PurgeGuard<'_> {
    fn drop(&mut self) {
        self.store.purge(self.task_id, &self.record);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::time::{Instant, sleep};
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[tokio::test(start_paused = true)]
    async fn test_single_times_out_and_purges() {
        let store = TaskStore::new();
        let started = Instant::now();

        let err = store.await_single("task-1", 100 * MS).await.unwrap_err();

        assert_eq!(err, TaskError::ResponseTimeout("task-1".into()));
        assert_eq!(started.elapsed(), 100 * MS);
        assert_eq!(store.state("task-1"), None);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_completion_is_returned_once() {
        let store = TaskStore::new();
        assert_ok!(store.complete_single("task-1", json!({"status": 200})));
        assert_eq!(store.state("task-1"), Some(TaskState::Completed));

        let value = store.await_single("task-1", 100 * MS).await.unwrap();
        assert_eq!(value, json!({"status": 200}));

        // No memory of the previous value.
        let started = Instant::now();
        let err = store.await_single("task-1", 50 * MS).await.unwrap_err();
        assert_eq!(err, TaskError::ResponseTimeout("task-1".into()));
        assert_eq!(started.elapsed(), 50 * MS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_wakes_waiting_caller() {
        let store = Arc::new(TaskStore::new());
        let producer = Arc::clone(&store);
        tokio::spawn(async move {
            sleep(30 * MS).await;
            producer.complete_single("task-1", json!("done")).unwrap();
        });

        let started = Instant::now();
        let value = store.await_single("task-1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(value, json!("done"));
        assert_eq!(started.elapsed(), 30 * MS);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_completion_is_ignored() {
        let store = TaskStore::new();
        assert_err!(store.await_single("task-1", 10 * MS).await);

        assert_ok!(store.complete_single("task-1", json!("late")));
        assert_ok!(store.append_chunk("task-1", json!("late chunk")));
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_chunks_in_order() {
        let store = Arc::new(TaskStore::new());
        let producer = Arc::clone(&store);
        tokio::spawn(async move {
            for chunk in ["a", "b", STREAM_SENTINEL] {
                sleep(5 * MS).await;
                producer.append_chunk("task-s", json!(chunk)).unwrap();
            }
        });

        let mut seen = Vec::new();
        store
            .await_stream("task-s", 50 * MS, 200 * MS, |chunk| seen.push(chunk))
            .await
            .unwrap();

        assert_eq!(seen, vec![json!("a"), json!("b")]);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_start_timeout() {
        let store = TaskStore::new();
        let started = Instant::now();

        let err = store
            .await_stream("task-s", 50 * MS, 200 * MS, |_| {})
            .await
            .unwrap_err();

        assert_eq!(err, TaskError::StreamStartTimeout("task-s".into()));
        assert_eq!(started.elapsed(), 50 * MS);
        assert_eq!(store.state("task-s"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_completion_budget_runs_from_first_chunk() {
        let store = Arc::new(TaskStore::new());
        let producer = Arc::clone(&store);
        tokio::spawn(async move {
            sleep(40 * MS).await;
            producer.append_chunk("task-s", json!("first")).unwrap();
            // A later chunk must not extend the budget.
            sleep(150 * MS).await;
            producer.append_chunk("task-s", json!("second")).unwrap();
        });

        let started = Instant::now();
        let mut seen = Vec::new();
        let err = store
            .await_stream("task-s", 50 * MS, 200 * MS, |chunk| seen.push(chunk))
            .await
            .unwrap_err();

        assert_eq!(err, TaskError::StreamCompletionTimeout("task-s".into()));
        assert_eq!(started.elapsed(), 240 * MS);
        assert_eq!(seen, vec![json!("first"), json!("second")]);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunks_before_attach_are_kept() {
        let store = TaskStore::new();
        store.append_chunk("task-s", json!("early")).unwrap();
        store.append_chunk("task-s", json!(STREAM_SENTINEL)).unwrap();

        let mut seen = Vec::new();
        store
            .await_stream("task-s", 50 * MS, 50 * MS, |chunk| seen.push(chunk))
            .await
            .unwrap();
        assert_eq!(seen, vec![json!("early")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_modes_are_a_protocol_violation() {
        let store = Arc::new(TaskStore::new());
        let producer = Arc::clone(&store);
        tokio::spawn(async move {
            sleep(10 * MS).await;
            let err = producer.complete_single("task-s", json!("whole")).unwrap_err();
            assert!(matches!(err, TaskError::ProtocolViolation { .. }));
        });

        let err = store
            .await_stream("task-s", Duration::from_secs(1), Duration::from_secs(1), |_| {})
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TaskError::ProtocolViolation {
                task_id: "task-s".into(),
                expected: TaskMode::Stream,
                actual: TaskMode::Single,
            }
        );
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_awaiting_in_other_mode_fails() {
        let store = TaskStore::new();
        store.append_chunk("task-1", json!("chunk")).unwrap();

        let err = store.await_single("task-1", 10 * MS).await.unwrap_err();
        assert!(matches!(err, TaskError::ProtocolViolation { .. }));
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_waiter_is_rejected() {
        let store = Arc::new(TaskStore::new());
        let first = Arc::clone(&store);
        let waiter = tokio::spawn(async move { first.await_single("task-1", 100 * MS).await });
        tokio::task::yield_now().await;

        let err = store.await_single("task-1", 100 * MS).await.unwrap_err();
        assert_eq!(err, TaskError::AlreadyAwaited("task-1".into()));

        store.complete_single("task-1", json!(1)).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), json!(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_purges() {
        let store = TaskStore::new();
        let wait = store.await_single("task-1", Duration::from_secs(60));
        assert_err!(tokio::time::timeout(10 * MS, wait).await);

        assert_eq!(store.pending_count(), 0);
        assert_ok!(store.complete_single("task-1", json!("stray")));
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_or_get_adopts_early_record() {
        let store = TaskStore::new();
        store.append_chunk("task-s", json!("x")).unwrap();

        let state = store
            .create_or_get("task-s", TaskMode::Stream, TaskTimeouts::stream(MS, MS))
            .unwrap();
        assert_eq!(state, TaskState::Streaming);
        assert_eq!(
            store.timeouts("task-s"),
            Some(TaskTimeouts::stream(MS, MS))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_mode_await_leaves_live_waiter() {
        let store = Arc::new(TaskStore::new());
        let first = Arc::clone(&store);
        let waiter = tokio::spawn(async move {
            let mut seen = Vec::new();
            first
                .await_stream("task-x", Duration::from_secs(1), Duration::from_secs(1), |chunk| {
                    seen.push(chunk);
                })
                .await
                .map(|()| seen)
        });
        tokio::task::yield_now().await;

        let err = store.await_single("task-x", 10 * MS).await.unwrap_err();
        assert_eq!(
            err,
            TaskError::ProtocolViolation {
                task_id: "task-x".into(),
                expected: TaskMode::Single,
                actual: TaskMode::Stream,
            }
        );
        assert_eq!(store.state("task-x"), Some(TaskState::PendingStart));
        assert_eq!(
            store.timeouts("task-x"),
            Some(TaskTimeouts::stream(Duration::from_secs(1), Duration::from_secs(1)))
        );

        store.append_chunk("task-x", json!("a")).unwrap();
        store.append_chunk("task-x", json!(STREAM_SENTINEL)).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), vec![json!("a")]);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_records_without_waiter() {
        let store = Arc::new(TaskStore::new());
        store.complete_single("orphan", json!(1)).unwrap();
        store
            .create_or_get("claimed", TaskMode::Single, TaskTimeouts::single(MS))
            .unwrap();
        let first = Arc::clone(&store);
        let waiter =
            tokio::spawn(async move { first.await_single("awaited", Duration::from_secs(1)).await });
        tokio::task::yield_now().await;

        sleep(100 * MS).await;
        assert_eq!(store.sweep(50 * MS), 2);
        assert_eq!(store.state("orphan"), None);
        assert_eq!(store.state("claimed"), None);
        assert_eq!(store.state("awaited"), Some(TaskState::PendingComplete));

        store.complete_single("awaited", json!("kept")).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), json!("kept"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expires_tombstones() {
        let store = TaskStore::new();
        assert_err!(store.await_single("task-1", 10 * MS).await);
        assert_ok!(store.complete_single("task-1", json!("late")));
        assert_eq!(store.pending_count(), 0);

        sleep(100 * MS).await;
        assert_eq!(store.sweep(50 * MS), 0);

        // Once the tombstone is gone the id is unknown again.
        assert_ok!(store.complete_single("task-1", json!("fresh")));
        assert_eq!(store.pending_count(), 1);
        assert_eq!(store.state("task-1"), Some(TaskState::Completed));
    }
}
