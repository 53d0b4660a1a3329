//! Coarse progress reporting for mosaic builds.
//!
//! The compositor emits [`ProgressEvent`]s into a [`ProgressSink`]. Rows are
//! composited in parallel, so [`ProgressReporter`] serialises percentage
//! updates and drops any that would move backwards.

use std::sync::Mutex;

use serde::Serialize;

/// A build milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The source image was accepted and is being prepared
    LoadStarted,

    /// The source image is decoded and downsampled to the grid
    DecodeComplete { grid_width: u32, grid_height: u32 },

    /// Share of grid rows composited so far
    Compositing { percent: u8 },

    /// Every cell has been processed
    CompositingComplete,
}

/// Receiver of progress events. Must tolerate calls from worker threads.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Wraps a sink and guarantees non-decreasing compositing percentages.
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    total_rows: u32,
    state: Mutex<RowState>,
}

#[derive(Default)]
struct RowState {
    completed: u32,
    last_percent: Option<u8>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink, total_rows: u32) -> Self {
        Self {
            sink,
            total_rows,
            state: Mutex::new(RowState::default()),
        }
    }

    /// Record one finished row and emit a percentage if it advanced.
    pub fn row_done(&self) {
        // Emitting under the lock keeps delivery order equal to value order
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.completed = (state.completed + 1).min(self.total_rows);

        let percent = if self.total_rows == 0 {
            100
        } else {
            (u64::from(state.completed) * 100 / u64::from(self.total_rows)) as u8
        };

        if state.last_percent.map_or(true, |last| percent > last) {
            state.last_percent = Some(percent);
            self.sink.report(ProgressEvent::Compositing { percent });
        }
    }
}
