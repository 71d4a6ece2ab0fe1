//! Pulls a bounded window of recent container output

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::runtime::{ContainerHandle, ContainerRuntime, RuntimeError, RuntimeResult};

/// Half-open time range `[since, until)` a sample was taken over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl SampleWindow {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self { since, until }
    }

    /// Zero when the clock went backwards between ticks
    pub fn span(&self) -> ChronoDuration {
        (self.until - self.since).max(ChronoDuration::zero())
    }
}

/// Output lines observed in one window. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySample {
    pub window: SampleWindow,
    pub lines: Vec<String>,
}

impl ActivitySample {
    pub fn new(window: SampleWindow, lines: Vec<String>) -> Self {
        Self { window, lines }
    }

    /// Build a sample from a raw log payload
    pub fn from_bytes(window: SampleWindow, payload: &[u8]) -> Self {
        Self::new(window, split_lines(payload))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

/// Fetches log windows through a [`ContainerRuntime`]
#[derive(Debug, Clone, Copy)]
pub struct LogSampler {
    tail: usize,
}

impl LogSampler {
    pub fn new(tail: usize) -> Self {
        Self { tail }
    }

    /// Read output produced in `[since, now)`.
    ///
    /// A runtime failure is returned as an error, never as an empty sample:
    /// "no output" is itself a signal to the classifier. The same holds for a
    /// window that does not move forward, which is refused without asking
    /// the runtime.
    pub fn sample<R>(
        &self,
        runtime: &R,
        handle: &ContainerHandle,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RuntimeResult<ActivitySample>
    where
        R: ContainerRuntime + ?Sized,
    {
        if since >= now {
            return Err(RuntimeError::InvalidWindow { since, until: now });
        }
        let window = SampleWindow::new(since, now);
        let payload = runtime.logs(handle, since, now, self.tail)?;
        Ok(ActivitySample::from_bytes(window, &payload))
    }
}

/// Lossy UTF-8 decode, one entry per non-blank line
pub fn split_lines(payload: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(payload)
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeStatus;
    use chrono::TimeZone;
    use std::cell::RefCell;

    struct LogsOnly {
        payload: Result<Vec<u8>, RuntimeError>,
        calls: RefCell<Vec<(DateTime<Utc>, DateTime<Utc>, usize)>>,
    }

    impl ContainerRuntime for LogsOnly {
        fn resolve(&self, name: &str) -> RuntimeResult<ContainerHandle> {
            Err(RuntimeError::NotFound(name.to_string()))
        }

        fn status(&self, _handle: &ContainerHandle) -> RuntimeResult<RuntimeStatus> {
            Ok(RuntimeStatus::Running)
        }

        fn logs(
            &self,
            _handle: &ContainerHandle,
            since: DateTime<Utc>,
            until: DateTime<Utc>,
            tail: usize,
        ) -> RuntimeResult<Vec<u8>> {
            self.calls.borrow_mut().push((since, until, tail));
            self.payload.clone()
        }

        fn stop(&self, _handle: &ContainerHandle) -> RuntimeResult<()> {
            Ok(())
        }
    }

    fn handle() -> ContainerHandle {
        ContainerHandle {
            id: "abc".to_string(),
            name: "web".to_string(),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_split_lines_drops_blank_and_cr() {
        let lines = split_lines(b"first\r\n\n   \nsecond\n");
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn test_split_lines_is_lossy() {
        let lines = split_lines(b"ok \xff bytes\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok "));
    }

    #[test]
    fn test_sample_passes_window_and_tail() {
        let runtime = LogsOnly {
            payload: Ok(b"-> GET /stream/abc\n".to_vec()),
            calls: RefCell::new(Vec::new()),
        };
        let sample = LogSampler::new(50)
            .sample(&runtime, &handle(), at(0), at(60))
            .unwrap();

        assert_eq!(sample.len(), 1);
        assert_eq!(sample.window, SampleWindow::new(at(0), at(60)));
        assert_eq!(runtime.calls.borrow().as_slice(), &[(at(0), at(60), 50)]);
    }

    #[test]
    fn test_sample_error_is_not_empty_sample() {
        let runtime = LogsOnly {
            payload: Err(RuntimeError::Unavailable("daemon down".to_string())),
            calls: RefCell::new(Vec::new()),
        };
        let result = LogSampler::new(50).sample(&runtime, &handle(), at(0), at(60));
        assert!(matches!(result, Err(RuntimeError::Unavailable(_))));
    }

    #[test]
    fn test_degenerate_window_is_an_error() {
        let runtime = LogsOnly {
            payload: Ok(b"anything\n".to_vec()),
            calls: RefCell::new(Vec::new()),
        };
        let sampler = LogSampler::new(50);

        let result = sampler.sample(&runtime, &handle(), at(60), at(60));
        assert_eq!(
            result,
            Err(RuntimeError::InvalidWindow {
                since: at(60),
                until: at(60)
            })
        );

        // Clock stepped back behind the window start
        let result = sampler.sample(&runtime, &handle(), at(60), at(30));
        assert!(matches!(result, Err(RuntimeError::InvalidWindow { .. })));
        assert!(runtime.calls.borrow().is_empty());
    }

    #[test]
    fn test_window_span_never_negative() {
        let window = SampleWindow::new(at(60), at(0));
        assert_eq!(window.span(), ChronoDuration::zero());
    }
}
