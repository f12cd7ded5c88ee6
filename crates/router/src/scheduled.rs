//! ScheduledWorker - one background task driven by a timer or wake-up requests
//!
//! Both the dispatch loop and every consumer's delivery loop run on this
//! worker. The work itself decides when it wants to run again by calling
//! `start_after` on the handle it is given.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, instrument};

use crate::diagnostics::DiagnosticsHandle;
use crate::error::RouterError;

/// Why the work is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReason {
    /// A timer expired or a wake-up was requested
    Scheduled,
    /// Final run before the worker exits
    Disposing,
}

/// Work executed by a `ScheduledWorker`
///
/// Runs never overlap: the worker awaits each run before checking its
/// schedule again.
#[trait_variant::make(Work: Send)]
pub trait LocalWork {
    async fn run(&mut self, reason: RunReason, handle: &WorkerHandle) -> Result<(), RouterError>;
}

#[derive(Default)]
struct Trigger {
    /// Earliest requested run, if any
    next_run: Mutex<Option<Instant>>,
    notify: Notify,
    disposing: AtomicBool,
}

/// Cloneable handle used to schedule runs
#[derive(Clone, Default)]
pub struct WorkerHandle {
    trigger: Arc<Trigger>,
}

impl WorkerHandle {
    /// Request a run as soon as possible
    pub fn start(&self) {
        self.schedule(Instant::now());
    }

    /// Request a run after `delay`
    ///
    /// An earlier pending request wins.
    pub fn start_after(&self, delay: Duration) {
        self.schedule(Instant::now() + delay);
    }

    /// Check if the worker is shutting down
    pub fn is_disposing(&self) -> bool {
        self.trigger.disposing.load(Ordering::Acquire)
    }

    fn schedule(&self, at: Instant) {
        if self.is_disposing() {
            return;
        }
        {
            let mut next_run = self.trigger.next_run.lock();
            match *next_run {
                Some(existing) if existing <= at => return,
                _ => *next_run = Some(at),
            }
        }
        self.trigger.notify.notify_one();
    }

    fn stop(&self) {
        self.trigger.disposing.store(true, Ordering::Release);
        self.trigger.notify.notify_one();
    }

    /// Wait until the next requested run is due. Returns false once disposing.
    async fn wait_due(&self) -> bool {
        loop {
            if self.is_disposing() {
                return false;
            }
            let next_run = *self.trigger.next_run.lock();
            match next_run {
                None => self.trigger.notify.notified().await,
                Some(at) if at > Instant::now() => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => {}
                        // Rescheduled or stopped; re-read the schedule
                        _ = self.trigger.notify.notified() => continue,
                    }
                }
                Some(_) => {}
            }
            if self.is_disposing() {
                return false;
            }
            let mut next_run = self.trigger.next_run.lock();
            if matches!(*next_run, Some(at) if at <= Instant::now()) {
                *next_run = None;
                return true;
            }
        }
    }
}

/// A single background task that runs `Work` on demand
///
/// The task is spawned on an explicit runtime handle, so workers can be
/// created from threads outside that runtime.
pub struct ScheduledWorker {
    name: String,
    handle: WorkerHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduledWorker {
    /// Spawn the worker task. Nothing runs until a start is requested.
    pub fn spawn<W: Work + Send + 'static>(
        runtime: &Handle,
        name: impl Into<String>,
        work: W,
        diagnostics: DiagnosticsHandle,
    ) -> Self {
        let name = name.into();
        let handle = WorkerHandle::default();

        let task = runtime.spawn(worker_loop(
            name.clone(),
            work,
            handle.clone(),
            diagnostics,
        ));

        Self {
            name,
            handle,
            task: Mutex::new(Some(task)),
        }
    }

    /// Handle for scheduling runs from other components
    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Request a run as soon as possible
    pub fn start(&self) {
        self.handle.start();
    }

    /// Request a run after `delay`
    pub fn start_after(&self, delay: Duration) {
        self.handle.start_after(delay);
    }

    /// Stop scheduling without waiting
    ///
    /// The current run finishes, the work gets its `Disposing` run, then the
    /// task exits.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// True once the task has exited (after its `Disposing` run)
    pub fn is_finished(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map_or(true, |task| task.is_finished())
    }

    /// Stop and wait for the task to exit
    #[instrument(name = "scheduled_worker_dispose", skip(self), fields(worker = %self.name))]
    pub async fn dispose(&self) {
        self.stop();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(worker = %self.name, error = ?e, "Worker task failed");
            }
        }
        debug!(worker = %self.name, "Worker disposed");
    }
}

impl Drop for ScheduledWorker {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

async fn worker_loop<W: Work + Send>(
    name: String,
    mut work: W,
    handle: WorkerHandle,
    diagnostics: DiagnosticsHandle,
) {
    debug!(worker = %name, "Scheduled worker started");

    while handle.wait_due().await {
        run_guarded(&name, &mut work, RunReason::Scheduled, &handle, &diagnostics).await;
    }

    run_guarded(&name, &mut work, RunReason::Disposing, &handle, &diagnostics).await;

    debug!(worker = %name, "Scheduled worker stopped");
}

/// Run once, reporting errors and panics instead of ending the task
async fn run_guarded<W: Work + Send>(
    name: &str,
    work: &mut W,
    reason: RunReason,
    handle: &WorkerHandle,
    diagnostics: &DiagnosticsHandle,
) {
    let outcome = AssertUnwindSafe(work.run(reason, handle))
        .catch_unwind()
        .await;

    let err = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err,
        Err(panic) => RouterError::worker_panic(name, panic_message(panic.as_ref())),
    };

    error!(worker = %name, reason = ?reason, error = %err, "Worker run failed");
    diagnostics.exception(&err);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
