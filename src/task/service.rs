//! Mosaic Service for orchestrating asynchronous mosaic builds.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         MosaicService                           │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                       submit()                          │    │
//! │  │  1. Validate params    4. Composite (blocking pool)     │    │
//! │  │  2. Decode source      5. Save PNG to output dir        │    │
//! │  │  3. Register task      6. Persist final record          │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │         │                      │                     │          │
//! │         ▼                      ▼                     ▼          │
//! │  ┌──────────────┐     ┌────────────────┐     ┌──────────────┐   │
//! │  │ TaskRegistry │     │   Compositor   │     │  TaskStore   │   │
//! │  └──────────────┘     └────────────────┘     └──────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::{ImageFormat, RgbImage};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CompositeError, TaskError};
use crate::library::TileLibrary;
use crate::mosaic::{decode_source, Compositor, MosaicParams, ProgressEvent};

use super::record::{CompletedOutput, TaskId, TaskRecord, TaskStatus, PROGRESS_DECODED};
use super::registry::{TaskRegistry, TaskState, DEFAULT_MAX_TASKS, DEFAULT_TASK_TTL};
use super::store::TaskStore;

/// Default directory for finished mosaics.
pub const DEFAULT_OUTPUT_DIR: &str = "static/mosaics";

/// Settings for [`MosaicService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Where finished PNGs are written
    pub output_dir: PathBuf,

    /// Parameters applied when a request does not override them
    pub default_params: MosaicParams,

    /// Maximum tracked tasks
    pub max_tasks: usize,

    /// Retention of finished tasks in memory
    pub task_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            default_params: MosaicParams::default(),
            max_tasks: DEFAULT_MAX_TASKS,
            task_ttl: DEFAULT_TASK_TTL,
        }
    }
}

impl ServiceConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_default_params(mut self, params: MosaicParams) -> Self {
        self.default_params = params;
        self
    }

    pub fn with_task_limits(mut self, max_tasks: usize, task_ttl: Duration) -> Self {
        self.max_tasks = max_tasks;
        self.task_ttl = task_ttl;
        self
    }
}

/// A finished mosaic ready to be served.
#[derive(Debug, Clone)]
pub struct MosaicDownload {
    pub filename: String,
    pub data: Bytes,
}

/// Runs mosaic builds as background tasks and tracks their progress.
///
/// # Example
///
/// ```ignore
/// let library = Arc::new(TileLibrary::load("static/emojis")?);
/// let service = Arc::new(MosaicService::new(
///     Compositor::new(library),
///     Arc::new(JsonFileStore::new("static/mosaic_db.json")),
///     ServiceConfig::default(),
/// ));
///
/// let task_id = service.submit(upload_bytes, MosaicParams::default()).await?;
/// let record = service.progress(&task_id).await?;
/// ```
pub struct MosaicService {
    compositor: Arc<Compositor>,
    registry: TaskRegistry,
    store: Arc<dyn TaskStore>,
    output_dir: PathBuf,
    default_params: MosaicParams,
    started_at: Instant,
}

impl MosaicService {
    pub fn new(compositor: Compositor, store: Arc<dyn TaskStore>, config: ServiceConfig) -> Self {
        Self {
            compositor: Arc::new(compositor),
            registry: TaskRegistry::with_limits(config.max_tasks, config.task_ttl),
            store,
            output_dir: config.output_dir,
            default_params: config.default_params,
            started_at: Instant::now(),
        }
    }

    pub fn library(&self) -> &Arc<TileLibrary> {
        self.compositor.library()
    }

    pub fn compositor(&self) -> &Arc<Compositor> {
        &self.compositor
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn default_params(&self) -> MosaicParams {
        self.default_params
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Accept an uploaded image and start building its mosaic.
    ///
    /// Parameter and decode errors are returned immediately; everything after
    /// registration is reported through the task record.
    pub async fn submit(
        self: &Arc<Self>,
        upload: Bytes,
        params: MosaicParams,
    ) -> Result<TaskId, TaskError> {
        params.validate()?;

        let source = tokio::task::spawn_blocking(move || decode_source(&upload))
            .await
            .map_err(|e| TaskError::Worker(e.to_string()))??;

        let task_id = TaskId::new();
        let record = TaskRecord::new(task_id, params, self.library().len());
        let state = self.registry.insert(record).await?;

        info!(
            task_id = %task_id,
            width = source.width(),
            height = source.height(),
            "Accepted mosaic task"
        );

        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.run(task_id, state, source, params).await;
        });

        Ok(task_id)
    }

    async fn run(
        &self,
        task_id: TaskId,
        state: Arc<TaskState>,
        source: RgbImage,
        params: MosaicParams,
    ) {
        let started = Instant::now();

        let final_record = match self.build(&state, source, params).await {
            Ok(output) => {
                info!(
                    task_id = %task_id,
                    path = %output.filepath.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Mosaic task completed"
                );
                state.complete(output)
            }
            Err(TaskError::Composite(CompositeError::Cancelled)) => {
                info!(task_id = %task_id, "Mosaic task cancelled");
                state.cancelled()
            }
            Err(e) => {
                error!(task_id = %task_id, kind = e.kind(), "Mosaic task failed: {}", e);
                state.fail(&e)
            }
        };

        if let Err(e) = self.store.save(&final_record).await {
            error!(task_id = %task_id, "Failed to persist task record: {}", e);
        }
    }

    async fn build(
        &self,
        state: &Arc<TaskState>,
        source: RgbImage,
        params: MosaicParams,
    ) -> Result<CompletedOutput, TaskError> {
        state.set_progress(PROGRESS_DECODED);

        let compositor = Arc::clone(&self.compositor);
        let cancel = state.cancel_token();
        let events = Arc::clone(state);

        let output = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || {
                let sink = move |event: ProgressEvent| events.on_event(event);
                compositor.composite(&source, &params, &sink, &cancel)
            }
        })
        .await
        .map_err(|e| TaskError::Worker(e.to_string()))??;

        // Nothing is written for a build cancelled after its last cell
        if cancel.is_cancelled() {
            return Err(CompositeError::Cancelled.into());
        }

        let filename = format!("mosaic_{}.png", Uuid::new_v4().simple());
        let path = self.output_dir.join(filename);

        let grid_width = output.grid_width;
        let grid_height = output.grid_height;
        let blank_cells = output.blank_cells;

        let size_bytes = tokio::task::spawn_blocking({
            let path = path.clone();
            move || save_png(&output.image, &path)
        })
        .await
        .map_err(|e| TaskError::Worker(e.to_string()))??;

        debug!(path = %path.display(), size_bytes, "Saved mosaic image");

        Ok(CompletedOutput {
            filepath: path,
            size_bytes,
            grid_width,
            grid_height,
            blank_cells,
        })
    }

    /// Live record of a tracked task.
    pub async fn progress(&self, task_id: &TaskId) -> Result<TaskRecord, TaskError> {
        self.registry
            .snapshot(task_id)
            .await
            .ok_or_else(|| TaskError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Persisted record of a finished task.
    pub async fn result(&self, task_id: &TaskId) -> Result<TaskRecord, TaskError> {
        self.store
            .load(task_id)
            .await?
            .ok_or_else(|| TaskError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Bytes of a completed mosaic.
    pub async fn download(&self, task_id: &TaskId) -> Result<MosaicDownload, TaskError> {
        let record = match self.registry.snapshot(task_id).await {
            Some(record) => record,
            None => self.result(task_id).await?,
        };

        if record.status != TaskStatus::Completed {
            return Err(TaskError::NotCompleted {
                task_id: task_id.to_string(),
                status: record.status.to_string(),
            });
        }

        let path = record.filepath.ok_or_else(|| TaskError::Output {
            path: PathBuf::new(),
            message: "completed task has no output path".to_string(),
        })?;

        let data = tokio::fs::read(&path).await.map_err(|e| TaskError::Output {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("mosaic_{}.png", task_id));

        Ok(MosaicDownload {
            filename,
            data: Bytes::from(data),
        })
    }

    /// Request cooperative cancellation of an in-flight task.
    pub async fn cancel(&self, task_id: &TaskId) -> Result<TaskRecord, TaskError> {
        let state = self
            .registry
            .get(task_id)
            .await
            .ok_or_else(|| TaskError::NotFound {
                task_id: task_id.to_string(),
            })?;

        if state.is_finished() {
            return Err(TaskError::AlreadyFinished {
                task_id: task_id.to_string(),
            });
        }

        state.request_cancel();
        debug!(task_id = %task_id, "Cancellation requested");
        Ok(state.record())
    }

    /// Drop expired finished tasks from memory.
    pub async fn reap_expired(&self) -> usize {
        self.registry.reap_expired().await
    }

    /// Spawn a background loop reaping expired tasks every `interval`.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = service.reap_expired().await;
                if removed > 0 {
                    debug!(removed, "Periodic task reap");
                }
            }
        })
    }
}

/// Encode `image` as PNG at `path`, creating parent directories. Returns the file size.
pub fn save_png(image: &RgbImage, path: &Path) -> Result<u64, TaskError> {
    let output_error = |message: String| TaskError::Output {
        path: path.to_path_buf(),
        message,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| output_error(e.to_string()))?;
        }
    }

    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| output_error(e.to_string()))?;

    let size = std::fs::metadata(path)
        .map_err(|e| output_error(e.to_string()))?
        .len();

    if size == 0 {
        warn!(path = %path.display(), "Saved mosaic is empty");
    }
    Ok(size)
}
