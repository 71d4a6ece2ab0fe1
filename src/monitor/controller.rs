//! Lifecycle state machine
//!
//! One controller owns one container identity. Each call to
//! [`LifecycleController::tick`] performs exactly one pass: resolve the
//! container, read its status, and (while observing a running container)
//! sample, classify and feed the inactivity timer. When the timer crosses
//! the threshold the controller stops the container, runs the janitor once
//! and then only waits for somebody else to start the container again.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::classifier::{ActivityVerdict, Classifier, Verdict};
use super::sampler::LogSampler;
use super::timer::InactivityTimer;
use crate::config::Config;
use crate::error::IdlewatchError;
use crate::janitor::{CleanupReport, Janitor};
use crate::runtime::{ContainerHandle, ContainerRuntime, RuntimeError, RuntimeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Observing,
    Stopping,
    WaitingForRestart,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecyclePhase::Observing => write!(f, "observing"),
            LifecyclePhase::Stopping => write!(f, "stopping"),
            LifecyclePhase::WaitingForRestart => write!(f, "waiting for restart"),
        }
    }
}

/// Result of the cleanup that follows a stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupOutcome {
    Succeeded { report: CleanupReport },
    Failed { error: String },
    /// No cache target configured
    Skipped,
}

/// What happened during one tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TickEvent {
    Activity { verdict: ActivityVerdict },
    Inactive { verdict: ActivityVerdict, quiet_for_secs: u64 },
    /// Container exists but is not running; timer held at zero
    ContainerDown,
    Stopped { quiet_for_secs: u64, cleanup: CleanupOutcome },
    AwaitingRestart,
    RestartDetected,
    TransientError { message: String },
    /// Container name no longer resolves. Terminal.
    ContainerMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub phase: LifecyclePhase,
    pub event: TickEvent,
}

impl TickReport {
    pub fn is_terminal(&self) -> bool {
        matches!(self.event, TickEvent::ContainerMissing)
    }
}

/// The parts of [`Config`] the state machine needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    pub container_name: String,
    pub inactivity_threshold: Duration,
    pub poll_interval: Duration,
    pub log_tail: usize,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            container_name: config.container_name.clone(),
            inactivity_threshold: config.inactivity_threshold,
            poll_interval: config.poll_interval,
            log_tail: config.runtime.log_tail,
        }
    }
}

/// Counters kept over the controller's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStats {
    pub ticks: u64,
    pub stops: u64,
    pub cleanup_failures: u64,
    pub restarts_detected: u64,
    pub transient_errors: u64,
}

pub struct LifecycleController<R, C, J> {
    settings: ControllerSettings,
    runtime: R,
    classifier: C,
    janitor: Option<J>,
    sampler: LogSampler,
    timer: InactivityTimer,
    phase: LifecyclePhase,
    window_start: Option<DateTime<Utc>>,
    finished: bool,
    last_error: Option<String>,
    stats: ControllerStats,
}

impl<R, C, J> LifecycleController<R, C, J>
where
    R: ContainerRuntime,
    C: Classifier,
    J: Janitor,
{
    pub fn new(settings: ControllerSettings, runtime: R, classifier: C, janitor: Option<J>) -> Self {
        let sampler = LogSampler::new(settings.log_tail);
        Self {
            settings,
            runtime,
            classifier,
            janitor,
            sampler,
            timer: InactivityTimer::new(),
            phase: LifecyclePhase::Observing,
            window_start: None,
            finished: false,
            last_error: None,
            stats: ControllerStats::default(),
        }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn janitor(&self) -> Option<&J> {
        self.janitor.as_ref()
    }

    pub fn inactive_since(&self) -> Option<DateTime<Utc>> {
        self.timer.inactive_since()
    }

    /// Most recent transient error, cleared by the next clean tick
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    /// True once the container name stopped resolving while observing
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Run one full pass at time `now`
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let event = if self.finished {
            TickEvent::ContainerMissing
        } else {
            self.stats.ticks += 1;
            let event = match self.phase {
                LifecyclePhase::Observing | LifecyclePhase::Stopping => self.observe(now),
                LifecyclePhase::WaitingForRestart => self.await_restart(),
            };
            if !matches!(event, TickEvent::TransientError { .. }) {
                self.last_error = None;
            }
            event
        };

        TickReport {
            at: now,
            phase: self.phase,
            event,
        }
    }

    fn observe(&mut self, now: DateTime<Utc>) -> TickEvent {
        let (handle, status) = match self.resolve_status() {
            Ok(found) => found,
            Err(e) => {
                let err = IdlewatchError::from(e);
                if err.is_terminal() {
                    warn!(
                        container = %self.settings.container_name,
                        "container no longer exists, ending monitor"
                    );
                    self.timer.reset();
                    self.finished = true;
                    return TickEvent::ContainerMissing;
                }
                return self.transient(err);
            }
        };

        if status != RuntimeStatus::Running {
            if self.timer.is_running() {
                info!(container = %handle, "container stopped externally, inactivity timer reset");
            } else {
                debug!(container = %handle, %status, "container not running");
            }
            self.timer.reset();
            self.window_start = None;
            return TickEvent::ContainerDown;
        }

        let since = self
            .window_start
            .unwrap_or_else(|| now - to_chrono(self.settings.poll_interval));
        let sample = match self.sampler.sample(&self.runtime, &handle, since, now) {
            Ok(sample) => sample,
            Err(e) => {
                // Clock stepped back past the window start; start over next tick
                if matches!(e, RuntimeError::InvalidWindow { .. }) {
                    self.window_start = None;
                }
                return self.transient(e.into());
            }
        };
        self.window_start = Some(now);

        let verdict = self.classifier.classify(&sample);
        let elapsed = self.timer.observe(verdict.verdict, now);

        match verdict.verdict {
            Verdict::Active => {
                info!(
                    container = %handle,
                    lines = sample.len(),
                    reason = ?verdict.reason,
                    "activity detected"
                );
                TickEvent::Activity { verdict }
            }
            Verdict::Inactive => {
                // The sample that opened this run already covered one full window
                let quiet_for = elapsed + self.settings.poll_interval;
                if quiet_for >= self.settings.inactivity_threshold {
                    warn!(
                        container = %handle,
                        inactive_secs = quiet_for.as_secs(),
                        threshold_secs = self.settings.inactivity_threshold.as_secs(),
                        "inactivity threshold reached"
                    );
                    self.stop_and_clean(&handle, quiet_for)
                } else {
                    info!(
                        container = %handle,
                        inactive_secs = quiet_for.as_secs(),
                        threshold_secs = self.settings.inactivity_threshold.as_secs(),
                        reason = ?verdict.reason,
                        "inactivity accumulating"
                    );
                    TickEvent::Inactive {
                        verdict,
                        quiet_for_secs: quiet_for.as_secs(),
                    }
                }
            }
        }
    }

    fn stop_and_clean(&mut self, handle: &ContainerHandle, quiet_for: Duration) -> TickEvent {
        self.phase = LifecyclePhase::Stopping;
        info!(container = %handle, "stopping container");

        if let Err(e) = self.runtime.stop(handle) {
            // Timer stays armed so the next tick re-evaluates and retries
            self.phase = LifecyclePhase::Observing;
            return self.transient(e.into());
        }
        info!(container = %handle, "container stopped");
        self.stats.stops += 1;

        let cleanup = match self.janitor {
            None => {
                info!("no cache target configured, cleanup skipped");
                CleanupOutcome::Skipped
            }
            Some(ref janitor) => match janitor.clean() {
                Ok(report) => {
                    info!(
                        path = %report.target.display(),
                        removed = report.removed,
                        bytes_freed = report.bytes_freed,
                        "cache cleanup finished"
                    );
                    CleanupOutcome::Succeeded { report }
                }
                Err(e) => {
                    error!(error = %e, "cache cleanup failed");
                    self.stats.cleanup_failures += 1;
                    CleanupOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            },
        };

        self.phase = LifecyclePhase::WaitingForRestart;
        self.timer.reset();
        self.window_start = None;
        info!(container = %handle, "waiting for external restart");

        TickEvent::Stopped {
            quiet_for_secs: quiet_for.as_secs(),
            cleanup,
        }
    }

    fn await_restart(&mut self) -> TickEvent {
        match self.resolve_status() {
            Ok((handle, RuntimeStatus::Running)) => {
                info!(container = %handle, "restart detected, resuming observation");
                self.phase = LifecyclePhase::Observing;
                self.timer.reset();
                self.window_start = None;
                self.stats.restarts_detected += 1;
                TickEvent::RestartDetected
            }
            Ok((handle, status)) => {
                debug!(container = %handle, %status, "still waiting for restart");
                TickEvent::AwaitingRestart
            }
            Err(e) => {
                let err = IdlewatchError::from(e);
                if err.is_terminal() {
                    // Removed while stopped; the starter may recreate it under the same name
                    debug!(
                        container = %self.settings.container_name,
                        "container absent while waiting for restart"
                    );
                    TickEvent::AwaitingRestart
                } else {
                    self.transient(err)
                }
            }
        }
    }

    fn resolve_status(&self) -> Result<(ContainerHandle, RuntimeStatus), RuntimeError> {
        let handle = self.runtime.resolve(&self.settings.container_name)?;
        match self.runtime.status(&handle)? {
            RuntimeStatus::Missing => Err(RuntimeError::NotFound(handle.name)),
            status => Ok((handle, status)),
        }
    }

    fn transient(&mut self, err: IdlewatchError) -> TickEvent {
        warn!(
            container = %self.settings.container_name,
            phase = %self.phase,
            error = %err,
            "runtime call failed, retrying next tick"
        );
        self.stats.transient_errors += 1;
        let message = err.to_string();
        self.last_error = Some(message.clone());
        TickEvent::TransientError { message }
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IdlewatchError, Result};
    use crate::monitor::SignatureClassifier;
    use crate::runtime::RuntimeResult;
    use chrono::TimeZone;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct FakeRuntime {
        status: Cell<Option<RuntimeStatus>>,
        logs: RefCell<Vec<u8>>,
        fail_logs: Cell<bool>,
        fail_stop: Cell<bool>,
        stops: Cell<u32>,
        windows: RefCell<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl FakeRuntime {
        fn running(logs: &str) -> Self {
            let rt = Self::default();
            rt.status.set(Some(RuntimeStatus::Running));
            *rt.logs.borrow_mut() = logs.as_bytes().to_vec();
            rt
        }
    }

    impl ContainerRuntime for FakeRuntime {
        fn resolve(&self, name: &str) -> RuntimeResult<ContainerHandle> {
            match self.status.get() {
                Some(_) => Ok(ContainerHandle {
                    id: "c0ffee".to_string(),
                    name: name.to_string(),
                }),
                None => Err(RuntimeError::NotFound(name.to_string())),
            }
        }

        fn status(&self, handle: &ContainerHandle) -> RuntimeResult<RuntimeStatus> {
            self.status
                .get()
                .ok_or_else(|| RuntimeError::NotFound(handle.name.clone()))
        }

        fn logs(
            &self,
            _handle: &ContainerHandle,
            since: DateTime<Utc>,
            until: DateTime<Utc>,
            _tail: usize,
        ) -> RuntimeResult<Vec<u8>> {
            if self.fail_logs.get() {
                return Err(RuntimeError::Timeout {
                    operation: "logs".to_string(),
                    after_secs: 30,
                });
            }
            self.windows.borrow_mut().push((since, until));
            Ok(self.logs.borrow().clone())
        }

        fn stop(&self, _handle: &ContainerHandle) -> RuntimeResult<()> {
            if self.fail_stop.get() {
                return Err(RuntimeError::Unavailable("daemon busy".to_string()));
            }
            self.stops.set(self.stops.get() + 1);
            self.status.set(Some(RuntimeStatus::NotRunning));
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingJanitor {
        calls: Cell<u32>,
        fail: bool,
    }

    impl Janitor for CountingJanitor {
        fn clean(&self) -> Result<CleanupReport> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(IdlewatchError::CleanupFailure("disk on fire".to_string()));
            }
            Ok(CleanupReport {
                target: "/cache".into(),
                removed: 1,
                bytes_freed: 10,
                dry_run: false,
                details: Vec::new(),
            })
        }
    }

    fn settings() -> ControllerSettings {
        ControllerSettings {
            container_name: "web".to_string(),
            inactivity_threshold: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(60),
            log_tail: 100,
        }
    }

    fn controller(
        runtime: FakeRuntime,
        janitor: CountingJanitor,
    ) -> LifecycleController<FakeRuntime, SignatureClassifier, CountingJanitor> {
        let classifier = SignatureClassifier::new(["GET /stream/"], ["GET /health"]).unwrap();
        LifecycleController::new(settings(), runtime, classifier, Some(janitor))
    }

    fn minute(m: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + m * 60, 0).unwrap()
    }

    #[test]
    fn test_starts_observing() {
        let c = controller(FakeRuntime::running(""), CountingJanitor::default());
        assert_eq!(c.phase(), LifecyclePhase::Observing);
    }

    #[test]
    fn test_first_window_looks_back_one_interval() {
        let mut c = controller(FakeRuntime::running(""), CountingJanitor::default());
        c.tick(minute(10));
        c.tick(minute(11));
        let windows = c.runtime().windows.borrow().clone();
        assert_eq!(windows, vec![(minute(9), minute(10)), (minute(10), minute(11))]);
    }

    #[test]
    fn test_stops_after_threshold_and_cleans_once() {
        let mut c = controller(FakeRuntime::running("GET /health\n"), CountingJanitor::default());
        for m in 0..4 {
            assert!(matches!(c.tick(minute(m)).event, TickEvent::Inactive { .. }));
        }
        let report = c.tick(minute(4));
        assert!(matches!(
            report.event,
            TickEvent::Stopped { quiet_for_secs: 300, cleanup: CleanupOutcome::Succeeded { .. } }
        ));
        assert_eq!(report.phase, LifecyclePhase::WaitingForRestart);
        assert_eq!(c.runtime().stops.get(), 1);
        assert_eq!(c.janitor().unwrap().calls.get(), 1);
        assert!(c.inactive_since().is_none());
    }

    #[test]
    fn test_no_second_stop_while_waiting() {
        let mut c = controller(FakeRuntime::running(""), CountingJanitor::default());
        for m in 0..5 {
            c.tick(minute(m));
        }
        for m in 5..20 {
            assert_eq!(c.tick(minute(m)).event, TickEvent::AwaitingRestart);
        }
        assert_eq!(c.runtime().stops.get(), 1);
        assert_eq!(c.janitor().unwrap().calls.get(), 1);
    }

    #[test]
    fn test_log_failure_is_transient() {
        let rt = FakeRuntime::running("");
        rt.fail_logs.set(true);
        let mut c = controller(rt, CountingJanitor::default());

        let report = c.tick(minute(0));
        assert!(matches!(report.event, TickEvent::TransientError { .. }));
        assert_eq!(report.phase, LifecyclePhase::Observing);
        assert!(c.last_error().is_some());
        assert!(c.inactive_since().is_none());
    }

    #[test]
    fn test_failed_sample_does_not_advance_window() {
        let mut c = controller(FakeRuntime::running(""), CountingJanitor::default());
        c.tick(minute(0));
        c.runtime().fail_logs.set(true);
        c.tick(minute(1));
        c.runtime().fail_logs.set(false);
        c.tick(minute(2));
        let windows = c.runtime().windows.borrow().clone();
        assert_eq!(windows.last(), Some(&(minute(0), minute(2))));
    }

    #[test]
    fn test_clock_step_back_keeps_timer_and_restarts_window() {
        let mut c = controller(FakeRuntime::running("GET /health\n"), CountingJanitor::default());
        c.tick(minute(10));
        c.tick(minute(11));
        let inactive_since = c.inactive_since();
        assert_eq!(inactive_since, Some(minute(10)));

        let report = c.tick(minute(5));
        assert!(matches!(report.event, TickEvent::TransientError { .. }));
        assert_eq!(report.phase, LifecyclePhase::Observing);
        assert_eq!(c.inactive_since(), inactive_since);
        assert_eq!(c.runtime().windows.borrow().len(), 2);
        assert!(c.last_error().unwrap().contains("empty log window"));

        c.tick(minute(6));
        let windows = c.runtime().windows.borrow().clone();
        assert_eq!(windows.last(), Some(&(minute(5), minute(6))));
    }

    #[test]
    fn test_stop_failure_keeps_observing_and_retries() {
        let rt = FakeRuntime::running("");
        rt.fail_stop.set(true);
        let mut c = controller(rt, CountingJanitor::default());
        for m in 0..4 {
            c.tick(minute(m));
        }
        let report = c.tick(minute(4));
        assert!(matches!(report.event, TickEvent::TransientError { .. }));
        assert_eq!(report.phase, LifecyclePhase::Observing);
        assert_eq!(c.janitor().unwrap().calls.get(), 0);

        c.runtime().fail_stop.set(false);
        let report = c.tick(minute(5));
        assert!(matches!(report.event, TickEvent::Stopped { .. }));
        assert_eq!(c.janitor().unwrap().calls.get(), 1);
    }

    #[test]
    fn test_missing_while_waiting_keeps_waiting() {
        let mut c = controller(FakeRuntime::running(""), CountingJanitor::default());
        for m in 0..5 {
            c.tick(minute(m));
        }
        c.runtime().status.set(None);
        assert_eq!(c.tick(minute(6)).event, TickEvent::AwaitingRestart);
        assert!(!c.is_finished());

        c.runtime().status.set(Some(RuntimeStatus::Running));
        assert_eq!(c.tick(minute(7)).event, TickEvent::RestartDetected);
        assert_eq!(c.phase(), LifecyclePhase::Observing);
    }

    #[test]
    fn test_finished_controller_makes_no_calls() {
        let rt = FakeRuntime::default();
        let mut c = controller(rt, CountingJanitor::default());
        assert!(c.tick(minute(0)).is_terminal());
        assert!(c.tick(minute(1)).is_terminal());
        assert_eq!(c.stats().ticks, 1);
    }
}
