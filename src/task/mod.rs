//! Asynchronous mosaic tasks.
//!
//! A task wraps one mosaic build: it is registered when an upload is
//! accepted, runs the compositor on the blocking pool, writes the PNG and
//! persists its final record.
//!
//! ```text
//!  processing ──► completed
//!      │
//!      ├────────► failed
//!      │
//!      └────────► cancelled
//! ```
//!
//! # Components
//!
//! - [`MosaicService`]: submission, polling, download and cancellation
//! - [`TaskRegistry`]: bounded in-memory map of live tasks
//! - [`TaskStore`]: persistence of finished records ([`JsonFileStore`], [`MemoryStore`])
//! - [`TaskRecord`]: the polled and persisted view of a task

mod record;
mod registry;
mod service;
mod store;

pub use record::{
    format_size, unix_now, CompletedOutput, TaskId, TaskRecord, TaskStatus, PROGRESS_ACCEPTED,
    PROGRESS_COMPOSITED, PROGRESS_DECODED, PROGRESS_SAVED,
};
pub use registry::{TaskRegistry, TaskState, DEFAULT_MAX_TASKS, DEFAULT_TASK_TTL};
pub use service::{save_png, MosaicDownload, MosaicService, ServiceConfig, DEFAULT_OUTPUT_DIR};
pub use store::{JsonFileStore, MemoryStore, TaskStore};
