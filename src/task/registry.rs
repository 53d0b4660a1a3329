//! Bounded in-memory registry of mosaic tasks.
//!
//! Each task's state lives in a `watch` channel so that blocking compositor
//! threads can publish progress without touching the async lock, while HTTP
//! handlers read the latest snapshot.
//!
//! # Eviction
//!
//! - Finished tasks older than the retention TTL are reaped on every insert
//!   and by the periodic reaper.
//! - When the registry is still full, the oldest finished task is evicted.
//! - When every slot holds an in-flight task, inserts fail with
//!   [`TaskError::RegistryFull`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TaskError;
use crate::mosaic::ProgressEvent;

use super::record::{
    unix_now, CompletedOutput, TaskId, TaskRecord, PROGRESS_COMPOSITED, PROGRESS_DECODED,
};

/// Default maximum number of tracked tasks.
pub const DEFAULT_MAX_TASKS: usize = 1024;

/// Default retention of finished tasks (1 hour).
pub const DEFAULT_TASK_TTL: Duration = Duration::from_secs(3600);

/// Live state of one task.
pub struct TaskState {
    record: watch::Sender<TaskRecord>,
    cancel: CancellationToken,
}

impl TaskState {
    fn new(record: TaskRecord) -> Self {
        let (sender, _) = watch::channel(record);
        Self {
            record: sender,
            cancel: CancellationToken::new(),
        }
    }

    /// Current snapshot of the record.
    pub fn record(&self) -> TaskRecord {
        self.record.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<TaskRecord> {
        self.record.subscribe()
    }

    /// Token observed by the compositor between cells.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cooperative cancellation.
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.record.borrow().status.is_finished()
    }

    /// Raise progress; never lowers it.
    pub fn set_progress(&self, percent: u8) {
        self.record.send_if_modified(|record| record.advance(percent));
    }

    /// Map a compositor milestone onto the task's overall percentage.
    ///
    /// Compositing spans 10% to 80% of the task.
    pub fn on_event(&self, event: ProgressEvent) {
        let percent = match event {
            ProgressEvent::LoadStarted => return,
            ProgressEvent::DecodeComplete { .. } => PROGRESS_DECODED,
            ProgressEvent::Compositing { percent } => {
                let span = u32::from(PROGRESS_COMPOSITED - PROGRESS_DECODED);
                PROGRESS_DECODED + (u32::from(percent.min(100)) * span / 100) as u8
            }
            ProgressEvent::CompositingComplete => PROGRESS_COMPOSITED,
        };
        self.set_progress(percent);
    }

    /// Mark completed. Returns the final record.
    pub fn complete(&self, output: CompletedOutput) -> TaskRecord {
        self.record.send_modify(|record| record.complete(output));
        self.record()
    }

    /// Mark failed. Returns the final record.
    pub fn fail(&self, error: &TaskError) -> TaskRecord {
        self.record.send_modify(|record| record.fail(error));
        self.record()
    }

    /// Mark cancelled. Returns the final record.
    pub fn cancelled(&self) -> TaskRecord {
        self.record.send_modify(|record| record.cancel());
        self.record()
    }
}

/// Bounded, reaped map of task id to live state.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Arc<TaskState>>>,
    capacity: usize,
    ttl: Duration,
}

impl TaskRegistry {
    /// Registry with default bounds.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_TASKS, DEFAULT_TASK_TTL)
    }

    /// Registry holding at most `capacity` tasks, retaining finished ones for `ttl`.
    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Track a new task.
    pub async fn insert(&self, record: TaskRecord) -> Result<Arc<TaskState>, TaskError> {
        let mut tasks = self.tasks.write().await;

        reap_locked(&mut tasks, self.ttl);

        if tasks.len() >= self.capacity {
            let oldest_finished = tasks
                .iter()
                .filter_map(|(id, state)| {
                    let rec = state.record.borrow();
                    rec.finished_at.map(|at| (at, *id))
                })
                .min();

            match oldest_finished {
                Some((_, id)) => {
                    debug!(task_id = %id, "Evicting finished task to make room");
                    tasks.remove(&id);
                }
                None => {
                    return Err(TaskError::RegistryFull {
                        capacity: self.capacity,
                    })
                }
            }
        }

        let id = record.task_id;
        let state = Arc::new(TaskState::new(record));
        tasks.insert(id, Arc::clone(&state));
        Ok(state)
    }

    /// Live state of a task.
    pub async fn get(&self, id: &TaskId) -> Option<Arc<TaskState>> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Snapshot of a task's record.
    pub async fn snapshot(&self, id: &TaskId) -> Option<TaskRecord> {
        self.get(id).await.map(|state| state.record())
    }

    /// Drop finished tasks older than the TTL. Returns how many were removed.
    pub async fn reap_expired(&self) -> usize {
        let mut tasks = self.tasks.write().await;
        reap_locked(&mut tasks, self.ttl)
    }

    /// `(in_flight, total)` task counts.
    pub async fn counts(&self) -> (usize, usize) {
        let tasks = self.tasks.read().await;
        let active = tasks.values().filter(|s| !s.is_finished()).count();
        (active, tasks.len())
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn reap_locked(tasks: &mut HashMap<TaskId, Arc<TaskState>>, ttl: Duration) -> usize {
    let now = unix_now();
    let ttl = ttl.as_secs();
    let before = tasks.len();

    tasks.retain(|_, state| match state.record.borrow().finished_at {
        Some(at) => now.saturating_sub(at) < ttl,
        None => true,
    });

    let removed = before - tasks.len();
    if removed > 0 {
        debug!(removed, "Reaped finished tasks");
    }
    removed
}
