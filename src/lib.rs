//! Idlewatch - stop an on-demand container once it goes idle
//!
//! A [`LifecycleController`] samples the container's recent log output on a
//! fixed interval, classifies it as active or inactive, and once the
//! container has been continuously inactive for the configured threshold
//! stops it and clears its cache directory. Restarting is left to whatever
//! started the container in the first place.
//!
//! # Example
//!
//! ```no_run
//! use idlewatch::{Config, DockerApi, LifecycleController, ControllerSettings, Scheduler, SignatureClassifier};
//! use idlewatch::janitor::CacheJanitor;
//!
//! let config = Config::default();
//! let mut controller = LifecycleController::new(
//!     ControllerSettings::from_config(&config),
//!     DockerApi::new(&config.runtime).unwrap(),
//!     SignatureClassifier::from_config(&config).unwrap(),
//!     Some(CacheJanitor::new("/var/cache/media")),
//! );
//! let summary = Scheduler::new(config.poll_interval).run(&mut controller, |_| {});
//! println!("{:?}", summary.exit);
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod janitor;
pub mod logging;
pub mod monitor;
pub mod output;
pub mod runtime;

pub use config::{Config, RuntimeConfig};
pub use error::{IdlewatchError, Result};
pub use janitor::{CacheJanitor, CleanupReport, Janitor};
pub use monitor::{
    ActivityVerdict, Classifier, ControllerSettings, InactivityTimer, LifecycleController,
    LifecyclePhase, Scheduler, SignatureClassifier, TickEvent, TickReport, Verdict,
};
pub use output::{format_output, OutputFormat};
pub use runtime::{ContainerHandle, ContainerRuntime, DockerApi, RuntimeError, RuntimeStatus};
