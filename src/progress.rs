//! Progress reporting and cooperative cancellation
//!
//! Pipeline stages never talk to a UI directly. They announce the stage they
//! enter and byte counters through a [`ProgressSink`], and they poll a
//! [`CancelToken`] between chunks.

use crate::error::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Writing source files into the scratch archive
    Compressing,
    /// Turning the scratch archive into Base64 text
    Encoding,
    /// Turning Base64 text back into archive bytes
    Decoding,
    /// Checking that the decoded bytes form a ZIP container
    Validating,
}

impl Stage {
    /// Human-readable phase name
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Compressing => "Compressing files",
            Stage::Encoding => "Encoding to Base64",
            Stage::Decoding => "Decoding Base64",
            Stage::Validating => "Validating archive",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Counter update within one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub current: u64,
    pub total: u64,
}

impl ProgressEvent {
    /// Completion ratio in `0.0..=1.0`; an empty stage counts as done
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.current as f64 / self.total as f64
        }
    }
}

/// Receiver of stage and progress notifications
pub trait ProgressSink {
    fn stage(&self, stage: Stage);
    fn progress(&self, event: ProgressEvent);
}

/// Sink that drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn stage(&self, _stage: Stage) {}
    fn progress(&self, _event: ProgressEvent) {}
}

/// Sink that keeps every notification, in order
#[derive(Debug, Default)]
pub struct ProgressLog {
    stages: Mutex<Vec<Stage>>,
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.stages.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events belonging to one stage
    pub fn events_for(&self, stage: Stage) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.stage == stage)
            .collect()
    }
}

impl ProgressSink for ProgressLog {
    fn stage(&self, stage: Stage) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.push(stage);
        }
    }

    fn progress(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Per-stage counter that keeps `current` monotonic and clamped to `total`
pub(crate) struct Tracker<'a> {
    sink: &'a dyn ProgressSink,
    stage: Stage,
    current: u64,
    total: u64,
}

impl<'a> Tracker<'a> {
    /// Announce `stage` and report `0 / total`
    pub(crate) fn begin(sink: &'a dyn ProgressSink, stage: Stage, total: u64) -> Self {
        sink.stage(stage);
        let tracker = Self {
            sink,
            stage,
            current: 0,
            total,
        };
        tracker.emit();
        tracker
    }

    pub(crate) fn advance(&mut self, amount: u64) {
        self.current = self.current.saturating_add(amount).min(self.total);
        self.emit();
    }

    /// Fix the total once it becomes known after the stage was announced
    pub(crate) fn set_total(&mut self, total: u64) {
        self.total = total;
        self.current = self.current.min(total);
        self.emit();
    }

    /// Jump to `total`, used when a stage ends short of its size estimate
    pub(crate) fn finish(&mut self) {
        if self.current < self.total {
            self.current = self.total;
            self.emit();
        }
    }

    fn emit(&self) {
        self.sink.progress(ProgressEvent {
            stage: self.stage,
            current: self.current,
            total: self.total,
        });
    }
}

/// Shared cancellation flag, checked by the pipeline at chunk boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The running stage notices it before its next chunk.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Error::Canceled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}
