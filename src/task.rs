//! Cancellable task runner
//!
//! A [`Task`] wraps one encode or decode run. Starting it moves the run onto
//! a dedicated worker thread and returns a [`TaskHandle`] that carries the
//! event channel, the cancellation request and the final [`Outcome`].
//!
//! ```text
//! Pending --start--> Running --+--> Succeeded
//!                              +--> Canceled
//!                              +--> Failed
//! ```

use crate::archive::Worklist;
use crate::config::PipelineConfig;
use crate::error::{Error, FailureKind};
use crate::pipeline;
use crate::progress::{CancelToken, ProgressEvent, ProgressSink, Stage};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// What a task does
#[derive(Debug, Clone)]
pub enum Job {
    /// Archive the worklist and write its Base64 text to `destination`
    Encode {
        worklist: Worklist,
        destination: PathBuf,
    },
    /// Decode the Base64 text in `source` into a validated scratch archive
    Decode { source: PathBuf },
}

/// Lifecycle of a task. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Canceled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Canceled | TaskState::Failed
        )
    }
}

/// Why a run failed, in a form that can be cloned and sent across threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub path: Option<PathBuf>,
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            path: err.path().map(PathBuf::from),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Terminal result of a run; exactly one per task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Encoded text file (encode) or validated scratch archive (decode).
    /// The caller owns the path from here on.
    Succeeded(PathBuf),
    Canceled,
    Failed(Failure),
}

impl Outcome {
    fn from_result(result: crate::Result<PathBuf>) -> Self {
        match result {
            Ok(path) => Outcome::Succeeded(path),
            Err(Error::Canceled) => Outcome::Canceled,
            Err(e) => Outcome::Failed(Failure::from(&e)),
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            Outcome::Succeeded(_) => TaskState::Succeeded,
            Outcome::Canceled => TaskState::Canceled,
            Outcome::Failed(_) => TaskState::Failed,
        }
    }
}

/// Everything a driver observes while a task runs
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A new phase started
    Stage(Stage),
    Progress(ProgressEvent),
    /// Last event of every run
    Finished(Outcome),
}

impl ProgressSink for Sender<TaskEvent> {
    fn stage(&self, stage: Stage) {
        // A driver that stopped listening does not stop the run.
        let _ = self.send(TaskEvent::Stage(stage));
    }

    fn progress(&self, event: ProgressEvent) {
        let _ = self.send(TaskEvent::Progress(event));
    }
}

/// One encode or decode run, not yet started
#[derive(Debug)]
pub struct Task {
    job: Job,
    config: PipelineConfig,
    cancel: CancelToken,
    state: Arc<Mutex<TaskState>>,
}

impl Task {
    pub fn new(job: Job, config: PipelineConfig) -> Self {
        Self {
            job,
            config,
            cancel: CancelToken::new(),
            state: Arc::new(Mutex::new(TaskState::Pending)),
        }
    }

    pub fn encode(worklist: Worklist, destination: impl Into<PathBuf>, config: PipelineConfig) -> Self {
        Self::new(
            Job::Encode {
                worklist,
                destination: destination.into(),
            },
            config,
        )
    }

    pub fn decode(source: impl Into<PathBuf>, config: PipelineConfig) -> Self {
        Self::new(
            Job::Decode {
                source: source.into(),
            },
            config,
        )
    }

    /// Token that cancels this task; may be cloned before or after start
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> TaskState {
        read_state(&self.state)
    }

    /// Use `cancel` instead of this task's own token.
    ///
    /// Lets one token, for example an interrupt handler's, stop whichever
    /// task is running.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run on a dedicated worker thread.
    ///
    /// The state is `Running` as soon as this returns.
    pub fn start(self) -> crate::Result<TaskHandle> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = self.cancel.clone();
        let state = Arc::clone(&self.state);
        set_state(&state, TaskState::Running);

        let worker_state = Arc::clone(&self.state);
        let spawned = std::thread::Builder::new()
            .name("b64pack-worker".into())
            .spawn(move || guarded_run(|| self.run_blocking(&tx), &worker_state, &tx));

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                set_state(&state, TaskState::Failed);
                return Err(Error::Worker(format!("failed to spawn worker thread: {}", e)));
            }
        };

        Ok(TaskHandle {
            events: rx,
            cancel,
            state,
            thread,
        })
    }

    /// Run on the calling thread, reporting to `progress`
    pub fn run_blocking(self, progress: &dyn ProgressSink) -> Outcome {
        set_state(&self.state, TaskState::Running);

        let result = match &self.job {
            Job::Encode {
                worklist,
                destination,
            } => pipeline::encode_to_file(worklist, destination, &self.config, progress, &self.cancel),
            Job::Decode { source } => {
                pipeline::decode_to_scratch(source, &self.config, progress, &self.cancel)
            }
        };

        let outcome = Outcome::from_result(result);
        match &outcome {
            Outcome::Succeeded(path) => info!(path = %path.display(), "task succeeded"),
            Outcome::Canceled => info!("task canceled"),
            Outcome::Failed(failure) => warn!(kind = ?failure.kind, error = %failure.message, "task failed"),
        }
        set_state(&self.state, outcome.state());
        outcome
    }
}

/// Handle to a running task
#[derive(Debug)]
pub struct TaskHandle {
    events: Receiver<TaskEvent>,
    cancel: CancelToken,
    state: Arc<Mutex<TaskState>>,
    thread: JoinHandle<Outcome>,
}

impl TaskHandle {
    /// Stage, progress and the final outcome, in emission order
    pub fn events(&self) -> &Receiver<TaskEvent> {
        &self.events
    }

    /// Ask the worker to stop at its next chunk boundary
    pub fn cancel(&self) {
        debug!("cancellation requested");
        self.cancel.cancel();
    }

    pub fn state(&self) -> TaskState {
        read_state(&self.state)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the worker exits and return its outcome
    pub fn wait(self) -> Outcome {
        match self.thread.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                set_state(&self.state, TaskState::Failed);
                Outcome::Failed(Failure::from(&Error::Worker("worker thread panicked".into())))
            }
        }
    }
}

/// Run `body`, turn a panic into a failed outcome, and always send `Finished`
fn guarded_run<F>(body: F, state: &Mutex<TaskState>, events: &Sender<TaskEvent>) -> Outcome
where
    F: FnOnce() -> Outcome,
{
    let outcome = match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(%reason, "worker panicked");
            set_state(state, TaskState::Failed);
            Outcome::Failed(Failure::from(&Error::Worker(format!(
                "worker thread panicked: {}",
                reason
            ))))
        }
    };
    let _ = events.send(TaskEvent::Finished(outcome.clone()));
    outcome
}

fn read_state(state: &Mutex<TaskState>) -> TaskState {
    match state.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

/// Apply a transition unless the current state is already terminal
fn set_state(state: &Mutex<TaskState>, next: TaskState) {
    let mut guard = match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if !guard.is_terminal() {
        *guard = next;
    }
}
