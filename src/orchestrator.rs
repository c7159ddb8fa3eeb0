use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tracing::{error, info, instrument, warn};

use crate::device::{ManualCommand, PlotDevice, PlotterSettings, plot_and_release, run_manual};
use crate::error::{DeviceError, LinecraftError, Result};
use crate::inventory::{ConsumableInventory, Reservoir};
use crate::session::{SessionSnapshot, SessionStore};
use crate::state_machine::{CompiledJob, Event, JobOutcome, JobQueue, RunState, StateMachine};

/// Result of a control-surface call: whether it took effect, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlOutcome {
    pub success: bool,
    pub message: String,
}

impl ControlOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Lightweight change notification published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub state: RunState,
    pub current_index: usize,
    pub worker_busy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PenStatus {
    pub id: String,
    pub name: String,
    pub capacity: f64,
    pub used: f64,
    pub remaining: f64,
}

/// Read-only view of the queue for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub state: RunState,
    pub current_file: Option<String>,
    pub next_file: Option<String>,
    /// 1-based card number.
    pub position: usize,
    pub total: usize,
    pub message: String,
    pub elapsed_secs: i64,
    pub elapsed: String,
    pub session_ink_m: f64,
    pub pen: Option<PenStatus>,
}

/// What [`JobOrchestrator::recover`] found on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// No snapshot: nothing to resume.
    Fresh,
    /// Progress restored; the queue is idle at `current_index`.
    Restored { current_index: usize },
    /// A snapshot existed but could not be used.
    Discarded { reason: String },
    /// The snapshot belongs to a different batch than the one asked for; it
    /// was left alone.
    OtherQueue { recorded: PathBuf },
}

struct Inner {
    queue: JobQueue,
    state: RunState,
    current_index: usize,
    session_ink: f64,
    start_time: Option<DateTime<Utc>>,
    message: String,
    worker_busy: bool,
    inventory: ConsumableInventory,
}

impl Inner {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source_queue_path: self.queue.source.clone(),
            current_index: self.current_index,
            session_ink_total: self.session_ink,
            start_time: self.start_time,
        }
    }

    fn progress(&self) -> Progress {
        Progress {
            state: self.state,
            current_index: self.current_index,
            worker_busy: self.worker_busy,
        }
    }

    fn file_at(&self, index: usize) -> Option<String> {
        self.queue.get(index).map(CompiledJob::file_name)
    }
}

struct Shared {
    inner: Mutex<Inner>,
    device: Arc<dyn PlotDevice>,
    settings: PlotterSettings,
    session: SessionStore,
    permit: Arc<Semaphore>,
    progress: watch::Sender<Progress>,
    runtime: Handle,
}

/// Walks a compiled-job queue against one plotter.
///
/// All queue state sits behind one mutex. Device calls run on the blocking
/// pool while holding the only permit of a semaphore, so at most one
/// invocation is ever in flight. Cloning gives another handle to the same
/// orchestrator.
#[derive(Clone)]
pub struct JobOrchestrator {
    shared: Arc<Shared>,
}

/// Compares two directories after resolving them, falling back to the
/// literal paths when either cannot be resolved.
fn same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn format_elapsed(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.progress.send_replace(inner.progress());
    }

    /// Writes the snapshot. A failure faults the queue so the operator sees it.
    fn persist(&self, inner: &mut Inner) -> std::result::Result<(), String> {
        if let Err(e) = self.session.save(&inner.snapshot()) {
            error!(error = %e, "session snapshot write failed");
            inner.state = RunState::Error;
            inner.message = format!("Persistence failure: {e}");
            self.publish(inner);
            return Err(inner.message.clone());
        }
        Ok(())
    }

    fn spawn_job(self: &Arc<Self>, inner: &mut Inner, permit: OwnedSemaphorePermit) {
        let index = inner.current_index;
        let Some(job) = inner.queue.get(index).cloned() else {
            drop(permit);
            inner.state = RunState::Error;
            inner.message = format!("No job at index {index}");
            self.publish(inner);
            return;
        };
        inner.worker_busy = true;
        inner.message = format!("Plotting {}/{}...", index + 1, inner.queue.len());
        self.publish(inner);
        info!(index, file = %job.file_name(), "plotting");

        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let device = Arc::clone(&shared.device);
            let settings = shared.settings;
            let document = job.document.clone();
            let joined = tokio::task::spawn_blocking(move || {
                plot_and_release(device.as_ref(), &document, &settings)
            })
            .await;
            let outcome = match joined {
                Ok(Ok(())) => JobOutcome::Success,
                Ok(Err(e)) => JobOutcome::Failure(e.to_string()),
                Err(e) => JobOutcome::Failure(DeviceError::Worker(e.to_string()).to_string()),
            };
            shared.finish_job(&job, outcome, permit);
        });
    }

    /// Applies a finished device call. Runs on the worker.
    fn finish_job(&self, job: &CompiledJob, outcome: JobOutcome, permit: OwnedSemaphorePermit) {
        let mut inner = self.lock();
        inner.worker_busy = false;
        // Released under the lock so a control call that sees the new state
        // can always take the permit.
        drop(permit);

        if let JobOutcome::Failure(reason) = &outcome {
            warn!(index = inner.current_index, %reason, "plot failed");
            inner.state = RunState::Error;
            inner.message = format!("Error: {reason}");
            self.publish(&inner);
            return;
        }

        if let Err(e) = inner.inventory.deduct(job.ink_m) {
            error!(error = %e, "ink deduction failed");
            inner.state = RunState::Error;
            inner.message = format!("Persistence failure: {e}");
            self.publish(&inner);
            return;
        }
        inner.session_ink += job.ink_m;

        let has_more = inner.current_index + 1 < inner.queue.len();
        let next = StateMachine::next(inner.state, &Event::JobFinished { outcome, has_more })
            .unwrap_or(RunState::Error);
        inner.state = next;

        match next {
            RunState::Paused => {
                inner.message =
                    "Paused. Check quality, then resume to reprint or skip to the next card."
                        .to_string();
                if self.persist(&mut inner).is_err() {
                    return;
                }
            }
            RunState::WaitingForPaper => {
                inner.message = "Change paper, then continue".to_string();
                if self.persist(&mut inner).is_err() {
                    return;
                }
            }
            RunState::Completed => {
                inner.current_index = inner.queue.len();
                inner.message = "All done!".to_string();
                if let Err(e) = self.session.clear() {
                    error!(error = %e, "could not delete session snapshot");
                    inner.message = format!("All done, but the session file remains: {e}");
                }
                info!(ink_m = inner.session_ink, "queue completed");
            }
            _ => {}
        }
        self.publish(&inner);
    }
}

impl JobOrchestrator {
    /// Must be called from within a tokio runtime; jobs are spawned on it.
    pub fn new(
        device: Arc<dyn PlotDevice>,
        settings: PlotterSettings,
        inventory: ConsumableInventory,
        session: SessionStore,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            LinecraftError::Config(format!("orchestrator needs a tokio runtime: {e}"))
        })?;
        let inner = Inner {
            queue: JobQueue::default(),
            state: RunState::Idle,
            current_index: 0,
            session_ink: 0.0,
            start_time: None,
            message: "Ready".to_string(),
            worker_busy: false,
            inventory,
        };
        let (progress, _) = watch::channel(inner.progress());
        Ok(Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                device,
                settings,
                session,
                permit: Arc::new(Semaphore::new(1)),
                progress,
                runtime,
            }),
        })
    }

    /// Receives a [`Progress`] on every transition.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.shared.progress.subscribe()
    }

    /// Restores progress from the session snapshot, if one is usable.
    pub fn recover(&self) -> Recovery {
        self.recover_matching(None)
    }

    /// Like [`recover`](Self::recover), but only resumes a snapshot whose
    /// queue is `batch_dir`.
    pub fn recover_for(&self, batch_dir: &Path) -> Recovery {
        self.recover_matching(Some(batch_dir))
    }

    #[instrument(skip(self))]
    fn recover_matching(&self, expected: Option<&Path>) -> Recovery {
        let snapshot = match self.shared.session.load() {
            Ok(None) => return Recovery::Fresh,
            Ok(Some(snapshot)) => snapshot,
            Err(e) => return self.discard(format!("Previous session unreadable: {e}")),
        };
        if let Some(expected) = expected {
            if !same_location(&snapshot.source_queue_path, expected) {
                let recorded = snapshot.source_queue_path;
                warn!(
                    recorded = %recorded.display(),
                    requested = %expected.display(),
                    "session snapshot belongs to another batch"
                );
                self.shared.lock().message = format!(
                    "Previous session was for {}, not {}",
                    recorded.display(),
                    expected.display()
                );
                return Recovery::OtherQueue { recorded };
            }
        }
        let queue = match JobQueue::load(&snapshot.source_queue_path) {
            Ok(queue) => queue,
            Err(e) => {
                return self.discard(format!(
                    "Previous session queue {} unavailable: {e}",
                    snapshot.source_queue_path.display()
                ));
            }
        };
        if snapshot.current_index >= queue.len() {
            return self.discard(format!(
                "Previous session index {} is outside a queue of {}",
                snapshot.current_index,
                queue.len()
            ));
        }

        let mut inner = self.shared.lock();
        inner.queue = queue;
        inner.current_index = snapshot.current_index;
        inner.session_ink = snapshot.session_ink_total;
        inner.start_time = snapshot.start_time;
        inner.state = RunState::Idle;
        inner.message = format!("Recovered session at Card {}", snapshot.current_index + 1);
        info!(index = snapshot.current_index, "session recovered");
        self.shared.publish(&inner);
        Recovery::Restored {
            current_index: snapshot.current_index,
        }
    }

    fn discard(&self, reason: String) -> Recovery {
        warn!(%reason, "session snapshot discarded");
        let mut inner = self.shared.lock();
        inner.message = reason.clone();
        Recovery::Discarded { reason }
    }

    /// Replaces the queue and rewinds to its first job.
    pub fn load_queue(&self, queue: JobQueue) -> ControlOutcome {
        let mut inner = self.shared.lock();
        if inner.worker_busy {
            return ControlOutcome::fail("Cannot load while a job is running");
        }
        if queue.is_empty() {
            return ControlOutcome::fail("No SVGs found");
        }
        let next = StateMachine::next(inner.state, &Event::Load).unwrap_or(RunState::Idle);
        let total = queue.len();
        inner.queue = queue;
        inner.current_index = 0;
        inner.session_ink = 0.0;
        inner.start_time = None;
        inner.state = next;
        inner.message = format!("Loaded {total} files.");
        if let Err(message) = self.shared.persist(&mut inner) {
            return ControlOutcome::fail(message);
        }
        self.shared.publish(&inner);
        ControlOutcome::ok(format!("Loaded {total} files."))
    }

    /// Loads the batch directory produced by the generator.
    pub fn load_batch(&self, batch_dir: &Path) -> ControlOutcome {
        match JobQueue::load(batch_dir) {
            Ok(queue) => self.load_queue(queue),
            Err(LinecraftError::Config(reason)) => ControlOutcome::fail(reason),
            Err(e) => ControlOutcome::fail(e.to_string()),
        }
    }

    /// Plots the job at the current index. Only legal from `IDLE`.
    pub fn start(&self) -> ControlOutcome {
        let mut inner = self.shared.lock();
        if inner.queue.is_empty() {
            return ControlOutcome::fail("Queue empty");
        }
        if let Err(reason) = StateMachine::next(inner.state, &Event::Start) {
            return ControlOutcome::fail(reason);
        }
        if inner.current_index >= inner.queue.len() {
            return ControlOutcome::fail("End of Queue");
        }
        let Ok(permit) = Arc::clone(&self.shared.permit).try_acquire_owned() else {
            return ControlOutcome::fail("Device busy");
        };

        inner.state = RunState::Plotting;
        if inner.start_time.is_none() {
            inner.start_time = Some(Utc::now());
        }
        if let Err(message) = self.shared.persist(&mut inner) {
            return ControlOutcome::fail(message);
        }
        self.shared.spawn_job(&mut inner, permit);
        ControlOutcome::ok("Batch Started")
    }

    /// Operator confirms fresh paper: advance and plot the next job.
    pub fn continue_after_paper(&self) -> ControlOutcome {
        let mut inner = self.shared.lock();
        let next = match StateMachine::next(inner.state, &Event::PaperLoaded) {
            Ok(next) => next,
            Err(reason) => return ControlOutcome::fail(reason),
        };
        if inner.current_index + 1 >= inner.queue.len() {
            return ControlOutcome::fail("End of Queue");
        }
        let Ok(permit) = Arc::clone(&self.shared.permit).try_acquire_owned() else {
            return ControlOutcome::fail("Device busy");
        };

        inner.current_index += 1;
        inner.state = next;
        if let Err(message) = self.shared.persist(&mut inner) {
            return ControlOutcome::fail(message);
        }
        self.shared.spawn_job(&mut inner, permit);
        ControlOutcome::ok(format!("Plotting card {}", inner.current_index + 1))
    }

    /// Pauses, or resumes a paused queue back to `IDLE`. A running job is
    /// not interrupted; it just does not advance when it finishes.
    pub fn pause_toggle(&self) -> ControlOutcome {
        let mut inner = self.shared.lock();
        let next = StateMachine::next(inner.state, &Event::PauseToggle).unwrap_or(RunState::Paused);
        inner.state = next;
        let outcome = if next == RunState::Paused {
            inner.message = if inner.worker_busy {
                "Queue PAUSED. Finishing current card.".to_string()
            } else {
                "Queue PAUSED.".to_string()
            };
            ControlOutcome::ok("PAUSED")
        } else {
            inner.message = "Resumed. Ready to start.".to_string();
            ControlOutcome::ok("RESUMED")
        };
        self.shared.publish(&inner);
        outcome
    }

    pub fn skip_forward(&self) -> ControlOutcome {
        self.skip(true)
    }

    pub fn skip_backward(&self) -> ControlOutcome {
        self.skip(false)
    }

    fn skip(&self, forward: bool) -> ControlOutcome {
        let mut inner = self.shared.lock();
        if let Err(reason) = StateMachine::next(inner.state, &Event::Skip) {
            return ControlOutcome::fail(reason);
        }
        if inner.worker_busy {
            return ControlOutcome::fail("Cannot skip while a job is running");
        }

        let total = inner.queue.len();
        let index = inner.current_index;
        let target = if forward {
            (index + 1 < total).then_some(index + 1)
        } else {
            (index > 0 && total > 0).then(|| (index - 1).min(total - 1))
        };
        let Some(target) = target else {
            return ControlOutcome::fail(if forward { "End of Queue" } else { "Start of Queue" });
        };

        inner.current_index = target;
        inner.message = if forward {
            format!("Skipped to Card {}", target + 1)
        } else {
            format!("Rewound to Card {}", target + 1)
        };
        if let Err(message) = self.shared.persist(&mut inner) {
            return ControlOutcome::fail(message);
        }
        self.shared.publish(&inner);
        ControlOutcome::ok(if forward { "Skipped Forward" } else { "Skipped Backward" })
    }

    pub fn status(&self) -> StatusReport {
        let inner = self.shared.lock();
        let elapsed_secs = inner
            .start_time
            .map(|t| (Utc::now() - t).num_seconds())
            .unwrap_or(0);
        let pen = inner
            .inventory
            .active_id()
            .zip(inner.inventory.active())
            .map(|(id, pen)| PenStatus {
                id: id.to_string(),
                name: pen.name.clone(),
                capacity: pen.capacity,
                used: pen.used,
                remaining: pen.remaining(),
            });
        let total = inner.queue.len();
        StatusReport {
            state: inner.state,
            current_file: inner.file_at(inner.current_index),
            next_file: inner.file_at(inner.current_index + 1),
            position: (inner.current_index + 1).min(total),
            total,
            message: inner.message.clone(),
            elapsed_secs,
            elapsed: format_elapsed(elapsed_secs),
            session_ink_m: inner.session_ink,
            pen,
        }
    }

    /// Runs a manual pen or motor command on the plotter. Refused while a
    /// card is plotting.
    pub async fn manual(&self, command: ManualCommand) -> ControlOutcome {
        let permit = {
            let inner = self.shared.lock();
            if inner.worker_busy || inner.state == RunState::Plotting {
                return ControlOutcome::fail("Cannot use manual controls while plotting");
            }
            match Arc::clone(&self.shared.permit).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => return ControlOutcome::fail("Device busy"),
            }
        };

        let device = Arc::clone(&self.shared.device);
        let joined = tokio::task::spawn_blocking(move || run_manual(device.as_ref(), command)).await;
        drop(permit);
        match joined {
            Ok(Ok(())) => {
                info!(%command, "manual command done");
                ControlOutcome::ok(format!("Done: {command}"))
            }
            Ok(Err(e)) => {
                warn!(%command, error = %e, "manual command failed");
                ControlOutcome::fail(e.to_string())
            }
            Err(e) => ControlOutcome::fail(DeviceError::Worker(e.to_string()).to_string()),
        }
    }

    /// Registers a new pen and makes it active.
    pub fn add_reservoir(&self, name: &str, capacity: f64) -> Result<String> {
        self.shared.lock().inventory.add_reservoir(name, capacity)
    }

    pub fn set_active_reservoir(&self, id: &str) -> ControlOutcome {
        match self.shared.lock().inventory.set_active(id) {
            Ok(true) => ControlOutcome::ok(format!("Pen {id} selected")),
            Ok(false) => ControlOutcome::fail("Pen not found"),
            Err(e) => ControlOutcome::fail(e.to_string()),
        }
    }

    /// Active pen id and every pen.
    pub fn reservoirs(&self) -> (Option<String>, BTreeMap<String, Reservoir>) {
        let inner = self.shared.lock();
        (
            inner.inventory.active_id().map(str::to_string),
            inner.inventory.reservoirs().clone(),
        )
    }
}
