//! The run loop: ticks, queue drains, lifecycle events.
//!
//! One iteration runs every registered tick, then flushes the queue. The
//! loop announces itself with `Started` before the first drain and with
//! `Stopped` after the last regular one; after `Stopped` a bounded drain
//! (≤3 s) lets in-flight events complete.
//!
//! `start` runs the loop on a worker thread; `stop` clears the running flag
//! and waits up to 5 s for the thread to wind down. All handlers dispatched
//! by one root run sequentially on that loop's thread — there is no
//! parallel handler execution.

use std::fmt;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::component::{Component, Tick, lock};
use crate::config::RunConfig;
use crate::error::HandlerError;
use crate::event;

/// Wall-clock bound on the post-`Stopped` drain.
const DRAIN_LIMIT: Duration = Duration::from_secs(3);
/// Bound on the `stop()` wait for the worker thread.
const JOIN_LIMIT: Duration = Duration::from_secs(5);
const JOIN_POLL: Duration = Duration::from_millis(10);

// ── LoopState ─────────────────────────────────────────────────────────────────

/// Lifecycle state of a component's run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Not running.
    Stopped,
    /// Running, either caller-driven or on a live worker thread.
    Running,
    /// The running flag is set but the worker thread has died.
    Dead,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Stopped => "S",
            LoopState::Running => "R",
            LoopState::Dead => "D",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Run / start / stop ────────────────────────────────────────────────────────

impl Component {
    pub fn running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LoopState {
        if !self.running() {
            return LoopState::Stopped;
        }
        match lock(&self.shared.task).as_ref() {
            Some(task) if task.is_finished() => LoopState::Dead,
            _ => LoopState::Running,
        }
    }

    /// Drive the loop on the calling thread with default settings.
    pub fn run(&self) {
        let _ = self.run_with(&RunConfig::default());
    }

    /// Drive the loop on the calling thread until `running` clears.
    ///
    /// Returns `Err` only when `cfg.errors` re-raises a tick or handler
    /// failure; an interrupt exits cleanly. The `Stopped` event and the
    /// bounded drain run on every exit path.
    pub fn run_with(&self, cfg: &RunConfig) -> Result<(), HandlerError> {
        self.shared.running.store(true, Ordering::SeqCst);
        info!(component = %self.id(), "run loop started");
        self.push(event::started(self), event::STARTED);

        let mut outcome = Ok(());
        while self.running() {
            if let Err(e) = self.spin(cfg) {
                self.shared.running.store(false, Ordering::SeqCst);
                if !e.is_interrupt() && cfg.errors {
                    outcome = Err(e);
                }
                break;
            }
            if cfg.sleep_ms > 0 {
                thread::sleep(Duration::from_millis(cfg.sleep_ms));
            }
        }

        info!(component = %self.id(), "run loop stopping");
        self.push(event::stopped(self), event::STOPPED);

        let deadline = Instant::now() + DRAIN_LIMIT;
        let drain_cfg = RunConfig { errors: false, ..cfg.clone() };
        while self.queue_len() > 0 && Instant::now() < deadline {
            if self.spin(&drain_cfg).is_err() {
                break;
            }
            if cfg.sleep_ms > 0 {
                thread::sleep(Duration::from_millis(cfg.sleep_ms));
            }
        }

        outcome
    }

    /// One iteration: every tick (snapshot), then one flush.
    fn spin(&self, cfg: &RunConfig) -> Result<(), HandlerError> {
        let ticks: Vec<Tick> = lock(&self.shared.core).ticks.values().cloned().collect();
        for tick in ticks {
            match tick() {
                Ok(()) => {}
                Err(HandlerError::Interrupt) => return Err(HandlerError::Interrupt),
                Err(HandlerError::Failure { kind, message }) => {
                    warn!(%kind, %message, "tick failed");
                    if cfg.log {
                        self.push(event::error(&kind, &message, "in tick"), event::ERROR);
                    }
                    if cfg.errors {
                        return Err(HandlerError::Failure { kind, message });
                    }
                }
            }
        }
        self.flush_inner()
    }

    /// Launch the run loop on a worker thread with default settings.
    pub fn start(&self) {
        self.start_with(&RunConfig::default());
    }

    /// Launch the run loop on a worker thread.
    ///
    /// Idempotent: a no-op while the loop is already running.
    /// `cfg.process` is best-effort only — process isolation is not
    /// available, so the loop falls back to a thread.
    pub fn start_with(&self, cfg: &RunConfig) {
        let mut task = lock(&self.shared.task);
        if self.running() {
            debug!(component = %self.id(), "start ignored: already running");
            return;
        }
        if cfg.process {
            warn!("process isolation unavailable; using a worker thread");
        }
        // Set the flag before the thread exists so an immediate stop() is
        // not lost to the spawn race.
        self.shared.running.store(true, Ordering::SeqCst);
        let me = self.clone();
        let cfg = cfg.clone();
        *task = Some(thread::spawn(move || {
            let _ = me.run_with(&cfg);
        }));
    }

    /// Clear the running flag and wait (≤5 s) for the worker thread.
    ///
    /// The loop exits between iterations, then drains for up to 3 s; a
    /// thread still alive after the wait is released, not killed.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let task = lock(&self.shared.task).take();
        if let Some(task) = task {
            let deadline = Instant::now() + JOIN_LIMIT;
            while !task.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL);
            }
            if task.is_finished() {
                let _ = task.join();
            }
        }
    }
}
