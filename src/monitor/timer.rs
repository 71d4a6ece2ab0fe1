//! Inactivity accumulator
//!
//! Pure state machine over (verdict, timestamp) pairs. Time is always
//! passed in, so tests drive it with synthetic timestamps.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::classifier::Verdict;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InactivityTimer {
    inactive_since: Option<DateTime<Utc>>,
    last_elapsed: Duration,
}

impl InactivityTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one verdict and get the inactive duration so far.
    ///
    /// Active clears the timer and yields zero. The first Inactive after a
    /// reset starts the timer at `now` and yields zero. Later Inactive
    /// verdicts yield `now - inactive_since`, never less than the previous
    /// result of the same run even if the wall clock stepped backwards.
    pub fn observe(&mut self, verdict: Verdict, now: DateTime<Utc>) -> Duration {
        match verdict {
            Verdict::Active => {
                self.reset();
                Duration::ZERO
            }
            Verdict::Inactive => match self.inactive_since {
                None => {
                    self.inactive_since = Some(now);
                    self.last_elapsed = Duration::ZERO;
                    Duration::ZERO
                }
                Some(since) => {
                    let elapsed = (now - since).to_std().unwrap_or(Duration::ZERO);
                    self.last_elapsed = self.last_elapsed.max(elapsed);
                    self.last_elapsed
                }
            },
        }
    }

    pub fn reset(&mut self) {
        self.inactive_since = None;
        self.last_elapsed = Duration::ZERO;
    }

    pub fn inactive_since(&self) -> Option<DateTime<Utc>> {
        self.inactive_since
    }

    pub fn is_running(&self) -> bool {
        self.inactive_since.is_some()
    }
}
