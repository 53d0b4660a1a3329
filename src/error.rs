use std::path::PathBuf;

use thiserror::Error;

/// A single tile image could not be decoded.
///
/// Always recoverable: the loader skips the file and the compositor leaves the
/// cell blank. Never surfaced as a build failure.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The file could not be opened or read
    #[error("failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// The file was read but is not a decodable raster image
    #[error("failed to decode {}: {message}", path.display())]
    Image { path: PathBuf, message: String },

    /// The image decoded to zero pixels
    #[error("image {} has no pixels", path.display())]
    Empty { path: PathBuf },
}

/// The tile library could not produce any usable entries.
///
/// Fatal at startup and surfaced to the operator; never retried.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The tile directory could not be listed
    #[error("cannot read tile directory {}: {message}", path.display())]
    Directory { path: PathBuf, message: String },

    /// Every candidate file failed to decode, or the directory was empty
    #[error("no usable tiles in {} ({skipped} file(s) skipped)", path.display())]
    NoUsableTiles { path: PathBuf, skipped: usize },
}

/// A whole mosaic build cannot proceed.
///
/// Fatal for one build only; other concurrent builds are unaffected.
#[derive(Debug, Clone, Error)]
pub enum CompositeError {
    /// A build parameter was rejected before any processing began
    #[error("invalid parameter '{name}' = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    /// The source image could not be decoded at all
    #[error("failed to decode source image: {message}")]
    SourceDecode { message: String },

    /// The tile library has no entries to match against
    #[error("tile library is empty")]
    EmptyLibrary,

    /// The output raster would not fit in memory addressing limits
    #[error("output raster {width}x{height} is too large")]
    OutputTooLarge { width: u64, height: u64 },

    /// The build was cancelled between cells
    #[error("mosaic build was cancelled")]
    Cancelled,
}

/// Errors from the task record store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("store I/O error on {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    /// The backing file did not contain valid JSON records
    #[error("store serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by the task orchestration layer.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// No task with this identifier is known
    #[error("Task not found: {task_id}")]
    NotFound { task_id: String },

    /// The registry is at capacity with in-flight tasks
    #[error("task registry is full ({capacity} tasks in flight)")]
    RegistryFull { capacity: usize },

    /// The task already reached a terminal state
    #[error("task {task_id} has already finished")]
    AlreadyFinished { task_id: String },

    /// The task exists but has no downloadable output
    #[error("task {task_id} is {status}, no output available")]
    NotCompleted { task_id: String, status: String },

    /// The mosaic build itself failed
    #[error(transparent)]
    Composite(#[from] CompositeError),

    /// The record store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Writing or reading the output raster failed
    #[error("output error on {}: {message}", path.display())]
    Output { path: PathBuf, message: String },

    /// A blocking worker panicked or was aborted
    #[error("worker failed: {0}")]
    Worker(String),
}

impl TaskError {
    /// Short machine-readable kind, used in task records and HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::NotFound { .. } => "not_found",
            TaskError::RegistryFull { .. } => "registry_full",
            TaskError::AlreadyFinished { .. } => "already_finished",
            TaskError::NotCompleted { .. } => "not_completed",
            TaskError::Composite(CompositeError::InvalidParameter { .. }) => "invalid_parameter",
            TaskError::Composite(CompositeError::SourceDecode { .. }) => "invalid_image",
            TaskError::Composite(CompositeError::Cancelled) => "cancelled",
            TaskError::Composite(_) => "composite_error",
            TaskError::Store(_) => "store_error",
            TaskError::Output { .. } => "output_error",
            TaskError::Worker(_) => "worker_error",
        }
    }
}
