//! One-shot diagnostic pass
//!
//! Runs the same resolve / status / sample / classify steps as a tick but
//! never stops anything and keeps no state.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::{ActivityVerdict, Classifier};
use super::sampler::{LogSampler, SampleWindow};
use crate::runtime::{ContainerHandle, ContainerRuntime, RuntimeError, RuntimeStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub container: String,
    pub handle: Option<ContainerHandle>,
    pub status: Option<RuntimeStatus>,
    pub window: Option<SampleWindow>,
    pub lines: usize,
    pub verdict: Option<ActivityVerdict>,
    pub error: Option<String>,
}

impl CheckReport {
    fn new(container: &str) -> Self {
        Self {
            container: container.to_string(),
            handle: None,
            status: None,
            window: None,
            lines: 0,
            verdict: None,
            error: None,
        }
    }
}

/// Inspect `container` and classify the output of the last `lookback`
pub fn run_check<R, C>(
    runtime: &R,
    classifier: &C,
    sampler: &LogSampler,
    container: &str,
    lookback: Duration,
    now: DateTime<Utc>,
) -> CheckReport
where
    R: ContainerRuntime + ?Sized,
    C: Classifier + ?Sized,
{
    let mut report = CheckReport::new(container);

    let handle = match runtime.resolve(container) {
        Ok(handle) => handle,
        Err(RuntimeError::NotFound(_)) => {
            report.status = Some(RuntimeStatus::Missing);
            return report;
        }
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };
    report.handle = Some(handle.clone());

    let status = match runtime.status(&handle) {
        Ok(status) => status,
        Err(RuntimeError::NotFound(_)) => RuntimeStatus::Missing,
        Err(e) => {
            report.error = Some(e.to_string());
            return report;
        }
    };
    report.status = Some(status);
    if status != RuntimeStatus::Running {
        return report;
    }

    let since = now - ChronoDuration::from_std(lookback).unwrap_or_else(|_| ChronoDuration::zero());
    report.window = Some(SampleWindow::new(since, now));
    match sampler.sample(runtime, &handle, since, now) {
        Ok(sample) => {
            report.lines = sample.len();
            report.verdict = Some(classifier.classify(&sample));
        }
        Err(e) => report.error = Some(e.to_string()),
    }
    report
}
