//! Task identifiers and the task record shared by polling and persistence.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;
use crate::mosaic::MosaicParams;

/// Progress once the upload is accepted.
pub const PROGRESS_ACCEPTED: u8 = 0;

/// Progress once the source image is decoded and compositing begins.
pub const PROGRESS_DECODED: u8 = 10;

/// Progress once every cell is composited.
pub const PROGRESS_COMPOSITED: u8 = 80;

/// Progress once the output raster is written.
pub const PROGRESS_SAVED: u8 = 100;

/// Opaque task identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(TaskId).map_err(|_| TaskError::NotFound {
            task_id: s.to_string(),
        })
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task reached a terminal state.
    pub fn is_finished(self) -> bool {
        !matches!(self, TaskStatus::Processing)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Everything known about one mosaic task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,

    /// Completion percentage, never decreasing
    pub progress: u8,

    pub params: MosaicParams,

    /// Tiles in the library used for this build
    pub tile_count: usize,

    /// Unix seconds
    pub created_at: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size_bytes: Option<u64>,

    /// Human-readable output size, e.g. "1.25 MB"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blank_cells: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a written mosaic.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedOutput {
    pub filepath: PathBuf,
    pub size_bytes: u64,
    pub grid_width: u32,
    pub grid_height: u32,
    pub blank_cells: u64,
}

impl TaskRecord {
    /// A freshly accepted task.
    pub fn new(task_id: TaskId, params: MosaicParams, tile_count: usize) -> Self {
        Self {
            task_id,
            status: TaskStatus::Processing,
            progress: PROGRESS_ACCEPTED,
            params,
            tile_count,
            created_at: unix_now(),
            finished_at: None,
            filepath: None,
            image_size_bytes: None,
            image_size: None,
            grid_width: None,
            grid_height: None,
            blank_cells: None,
            error_kind: None,
            error: None,
        }
    }

    /// Raise progress. Lower values and updates after completion are ignored.
    ///
    /// Returns whether the record changed.
    pub fn advance(&mut self, percent: u8) -> bool {
        let percent = percent.min(PROGRESS_SAVED);
        if self.status.is_finished() || percent <= self.progress {
            return false;
        }
        self.progress = percent;
        true
    }

    /// Mark the task completed with its output.
    pub fn complete(&mut self, output: CompletedOutput) {
        self.status = TaskStatus::Completed;
        self.progress = PROGRESS_SAVED;
        self.finished_at = Some(unix_now());
        self.image_size = Some(format_size(output.size_bytes));
        self.image_size_bytes = Some(output.size_bytes);
        self.filepath = Some(output.filepath);
        self.grid_width = Some(output.grid_width);
        self.grid_height = Some(output.grid_height);
        self.blank_cells = Some(output.blank_cells);
    }

    /// Mark the task failed.
    pub fn fail(&mut self, error: &TaskError) {
        self.status = TaskStatus::Failed;
        self.finished_at = Some(unix_now());
        self.error_kind = Some(error.kind().to_string());
        self.error = Some(format!(
            "Error during mosaic creation task {}: {}",
            self.task_id, error
        ));
    }

    /// Mark the task cancelled. No output is attached.
    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.finished_at = Some(unix_now());
        self.filepath = None;
        self.error_kind = Some("cancelled".to_string());
        self.error = Some("mosaic build was cancelled".to_string());
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Format a byte count in megabytes with two decimals.
pub fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
