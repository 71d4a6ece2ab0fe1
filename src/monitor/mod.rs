//! Inactivity detection and lifecycle control
//!
//! Data flows one way per tick:
//! sampler -> classifier -> timer -> controller -> (stop, janitor).
//! The [`Scheduler`] is the only thing that drives the loop.

pub mod check;
pub mod classifier;
pub mod controller;
pub mod sampler;
pub mod scheduler;
pub mod timer;

pub use check::{run_check, CheckReport};
pub use classifier::{
    ActivityVerdict, ClassifiedLine, Classification, Classifier, LineClass, SignatureClassifier,
    Verdict, VerdictReason,
};
pub use controller::{
    CleanupOutcome, ControllerSettings, ControllerStats, LifecycleController, LifecyclePhase,
    TickEvent, TickReport,
};
pub use sampler::{split_lines, ActivitySample, LogSampler, SampleWindow};
pub use scheduler::{ExitReason, Scheduler, SchedulerSummary};
pub use timer::InactivityTimer;
