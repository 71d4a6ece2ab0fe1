//! Container runtime client
//!
//! The monitor only ever talks to the runtime through [`ContainerRuntime`]:
//! resolve a name, query status, read a window of logs, stop. Starting a
//! container is not part of the trait.

mod docker;

pub use docker::DockerApi;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reference to one named container, resolved fresh every tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Runtime-assigned id (changes when the container is recreated)
    pub id: String,
    /// Container name without the leading slash
    pub name: String,
}

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let short = self.id.get(..12).unwrap_or(&self.id);
        write!(f, "{} ({})", self.name, short)
    }
}

/// Observed state of the monitored container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Running,
    NotRunning,
    /// The runtime has no object with that name
    Missing,
}

impl std::fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeStatus::Running => write!(f, "running"),
            RuntimeStatus::NotRunning => write!(f, "not running"),
            RuntimeStatus::Missing => write!(f, "missing"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("no container named '{0}'")]
    NotFound(String),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    #[error("runtime call '{operation}' timed out after {after_secs}s")]
    Timeout { operation: String, after_secs: u64 },

    #[error("malformed runtime response: {0}")]
    Malformed(String),

    /// Window start is not before its end, e.g. after the wall clock stepped back
    #[error("empty log window: {since} is not before {until}")]
    InvalidWindow { since: DateTime<Utc>, until: DateTime<Utc> },
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Minimal surface of a container runtime
pub trait ContainerRuntime {
    /// Look up a container by name
    fn resolve(&self, name: &str) -> RuntimeResult<ContainerHandle>;

    /// Running or not. A container removed since `resolve` yields `NotFound`.
    fn status(&self, handle: &ContainerHandle) -> RuntimeResult<RuntimeStatus>;

    /// Raw output produced in `[since, until)`, at most `tail` lines
    fn logs(
        &self,
        handle: &ContainerHandle,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        tail: usize,
    ) -> RuntimeResult<Vec<u8>>;

    fn stop(&self, handle: &ContainerHandle) -> RuntimeResult<()>;
}

impl<R: ContainerRuntime + ?Sized> ContainerRuntime for Box<R> {
    fn resolve(&self, name: &str) -> RuntimeResult<ContainerHandle> {
        (**self).resolve(name)
    }

    fn status(&self, handle: &ContainerHandle) -> RuntimeResult<RuntimeStatus> {
        (**self).status(handle)
    }

    fn logs(
        &self,
        handle: &ContainerHandle,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        tail: usize,
    ) -> RuntimeResult<Vec<u8>> {
        (**self).logs(handle, since, until, tail)
    }

    fn stop(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        (**self).stop(handle)
    }
}
