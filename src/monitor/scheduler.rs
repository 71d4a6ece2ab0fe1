//! Fixed-interval driver for the lifecycle controller
//!
//! Ticks never overlap: the next one starts only after the previous tick,
//! including any stop and cleanup it triggered, has returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::classifier::Classifier;
use super::controller::{LifecycleController, TickReport};
use crate::error::{IdlewatchError, Result};
use crate::janitor::Janitor;
use crate::runtime::ContainerRuntime;

/// Sleep granularity while waiting for the next tick
const WAKE_STEP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The monitored container no longer exists
    ContainerMissing,
    /// Stop flag cleared (Ctrl+C / SIGTERM)
    Interrupted,
    /// Requested number of ticks reached
    TickLimit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSummary {
    pub ticks: u64,
    pub exit: ExitReason,
    pub last: Option<TickReport>,
}

pub struct Scheduler {
    interval: Duration,
    running: Arc<AtomicBool>,
    max_ticks: Option<u64>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Arc::new(AtomicBool::new(true)),
            max_ticks: None,
        }
    }

    /// Stop after `ticks` passes even if the container is still around
    pub fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Shared flag; storing `false` ends the loop at the next boundary
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Clear the stop flag on Ctrl+C or SIGTERM
    pub fn install_signal_handler(&self) -> Result<()> {
        let r = self.running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .map_err(|e| IdlewatchError::ExecutionError(format!("Failed to set signal handler: {}", e)))
    }

    /// Drive `controller` until it reaches its terminal state or the stop
    /// flag is cleared. `on_tick` sees every report.
    pub fn run<R, C, J, F>(
        &self,
        controller: &mut LifecycleController<R, C, J>,
        mut on_tick: F,
    ) -> SchedulerSummary
    where
        R: ContainerRuntime,
        C: Classifier,
        J: Janitor,
        F: FnMut(&TickReport),
    {
        let mut ticks = 0;
        let mut last = None;

        let exit = loop {
            if !self.running.load(Ordering::SeqCst) {
                break ExitReason::Interrupted;
            }

            let started = Instant::now();
            let report = controller.tick(Utc::now());
            ticks += 1;
            on_tick(&report);
            let terminal = report.is_terminal();
            last = Some(report);

            if terminal {
                break ExitReason::ContainerMissing;
            }
            if self.max_ticks.is_some_and(|max| ticks >= max) {
                break ExitReason::TickLimit;
            }

            self.sleep_until(started + self.interval);
        };

        info!(ticks, exit = ?exit, "monitor loop finished");
        SchedulerSummary { ticks, exit, last }
    }

    /// Sleep in short steps so a cleared stop flag is noticed promptly
    fn sleep_until(&self, deadline: Instant) {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(WAKE_STEP.min(deadline - now));
        }
    }
}
