//! Activity classification from log lines
//!
//! A sample is Inactive only when it is empty or every line in it matches
//! an idle signature. A real-work line or any unrecognized line makes it
//! Active.

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use super::sampler::{ActivitySample, SampleWindow};
use crate::config::Config;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Active,
    Inactive,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Active => write!(f, "active"),
            Verdict::Inactive => write!(f, "inactive"),
        }
    }
}

/// Why a verdict was reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerdictReason {
    /// At least one line matched a real-work signature
    RealWork { line: String },
    /// No real work, but some lines matched no signature
    Unrecognized { lines: usize },
    /// No output in the window
    Empty,
    /// Every line matched an idle signature
    IdleOnly { idle_lines: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityVerdict {
    pub verdict: Verdict,
    pub reason: VerdictReason,
    pub window: SampleWindow,
}

impl ActivityVerdict {
    pub fn is_active(&self) -> bool {
        self.verdict == Verdict::Active
    }
}

/// Category of a single log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineClass {
    RealWork,
    Idle,
    Unrecognized,
}

/// One line with its category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedLine {
    pub class: LineClass,
    pub line: String,
}

/// Verdict plus the per-line breakdown behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub verdict: ActivityVerdict,
    pub lines: Vec<ClassifiedLine>,
}

/// Anything that can turn a sample into a verdict
pub trait Classifier {
    fn classify(&self, sample: &ActivitySample) -> ActivityVerdict;
}

/// Regex signature based classifier
#[derive(Debug, Clone)]
pub struct SignatureClassifier {
    activity: RegexSet,
    idle: RegexSet,
}

impl SignatureClassifier {
    pub fn new<A, I>(activity: A, idle: I) -> Result<Self>
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Ok(Self {
            activity: RegexSet::new(activity)?,
            idle: RegexSet::new(idle)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.activity_signatures, &config.idle_signatures)
    }

    /// Real work outranks idle when a line matches both
    pub fn classify_line(&self, line: &str) -> LineClass {
        if self.activity.is_match(line) {
            LineClass::RealWork
        } else if self.idle.is_match(line) {
            LineClass::Idle
        } else {
            LineClass::Unrecognized
        }
    }

    /// Classify and keep the category of every line
    pub fn explain(&self, sample: &ActivitySample) -> Classification {
        Classification {
            verdict: self.classify(sample),
            lines: sample
                .lines
                .iter()
                .map(|line| ClassifiedLine {
                    class: self.classify_line(line),
                    line: line.clone(),
                })
                .collect(),
        }
    }
}

impl Classifier for SignatureClassifier {
    fn classify(&self, sample: &ActivitySample) -> ActivityVerdict {
        let window = sample.window;
        if sample.is_empty() {
            return ActivityVerdict {
                verdict: Verdict::Inactive,
                reason: VerdictReason::Empty,
                window,
            };
        }

        let mut idle_lines = 0;
        for line in &sample.lines {
            match self.classify_line(line) {
                LineClass::RealWork => {
                    return ActivityVerdict {
                        verdict: Verdict::Active,
                        reason: VerdictReason::RealWork { line: line.clone() },
                        window,
                    };
                }
                LineClass::Idle => idle_lines += 1,
                LineClass::Unrecognized => {}
            }
        }

        if idle_lines == sample.len() {
            ActivityVerdict {
                verdict: Verdict::Inactive,
                reason: VerdictReason::IdleOnly { idle_lines },
                window,
            }
        } else {
            ActivityVerdict {
                verdict: Verdict::Active,
                reason: VerdictReason::Unrecognized {
                    lines: sample.len() - idle_lines,
                },
                window,
            }
        }
    }
}
