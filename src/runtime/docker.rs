//! Docker Engine API backed runtime
//!
//! Talks to the daemon with `bollard`. The monitor loop is synchronous, so
//! the client owns a current-thread tokio runtime and blocks on each call,
//! bounded by the configured timeout.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use bollard::container::{
    InspectContainerOptions, ListContainersOptions, LogOutput, LogsOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::{Docker, API_DEFAULT_VERSION};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

use super::{ContainerHandle, ContainerRuntime, RuntimeError, RuntimeResult, RuntimeStatus};
use crate::config::RuntimeConfig;

pub struct DockerApi {
    host: Option<String>,
    timeout: Duration,
    stop_grace: Duration,
    match_substring: bool,
    client: Mutex<Option<Docker>>,
    rt: Runtime,
}

impl DockerApi {
    pub fn new(config: &RuntimeConfig) -> RuntimeResult<Self> {
        let rt = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| RuntimeError::Unavailable(format!("cannot start I/O runtime: {}", e)))?;
        Ok(Self {
            host: config.host.clone(),
            timeout: config.timeout,
            stop_grace: config.stop_grace,
            match_substring: config.match_substring,
            client: Mutex::new(None),
            rt,
        })
    }

    /// Connect on first use so a daemon that is down at startup only costs
    /// a transient error per tick
    fn client(&self) -> RuntimeResult<Docker> {
        let mut slot = self
            .client
            .lock()
            .map_err(|_| RuntimeError::Unavailable("docker client lock poisoned".to_string()))?;
        if let Some(ref docker) = *slot {
            return Ok(docker.clone());
        }

        let _guard = self.rt.enter();
        let docker = connect(self.host.as_deref(), self.timeout)
            .map_err(|e| RuntimeError::Unavailable(format!("cannot connect to docker: {}", e)))?;
        *slot = Some(docker.clone());
        Ok(docker)
    }

    /// Block on `fut`, giving up after `timeout`
    fn call<T, F>(&self, operation: &str, timeout: Duration, fut: F) -> RuntimeResult<T>
    where
        F: Future<Output = RuntimeResult<T>>,
    {
        debug!(operation, host = ?self.host, "runtime call");
        self.rt
            .block_on(async move { tokio::time::timeout(timeout, fut).await })
            .unwrap_or_else(|_| {
                Err(RuntimeError::Timeout {
                    operation: operation.to_string(),
                    after_secs: timeout.as_secs(),
                })
            })
    }

    /// First container whose name contains `fragment`
    fn find_by_substring(&self, docker: &Docker, fragment: &str) -> RuntimeResult<String> {
        let filters: HashMap<String, Vec<String>> =
            [("name".to_string(), vec![fragment.to_string()])]
                .into_iter()
                .collect();
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.call("list", self.timeout, async {
            docker
                .list_containers(Some(options))
                .await
                .map_err(|e| classify_error(fragment, e))
        })?;

        containers
            .into_iter()
            .flat_map(|c| c.names.unwrap_or_default())
            .map(|name| name.trim_start_matches('/').to_string())
            .find(|name| name.contains(fragment))
            .ok_or_else(|| RuntimeError::NotFound(fragment.to_string()))
    }
}

impl ContainerRuntime for DockerApi {
    fn resolve(&self, name: &str) -> RuntimeResult<ContainerHandle> {
        let docker = self.client()?;
        let target = if self.match_substring {
            self.find_by_substring(&docker, name)?
        } else {
            name.to_string()
        };

        let inspect = self.call("inspect", self.timeout, async {
            docker
                .inspect_container(&target, None::<InspectContainerOptions>)
                .await
                .map_err(|e| classify_error(&target, e))
        })?;

        let id = inspect
            .id
            .ok_or_else(|| RuntimeError::Malformed("container inspect without Id".to_string()))?;
        let name = inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or(target);
        Ok(ContainerHandle { id, name })
    }

    fn status(&self, handle: &ContainerHandle) -> RuntimeResult<RuntimeStatus> {
        let docker = self.client()?;
        let inspect = self.call("inspect", self.timeout, async {
            docker
                .inspect_container(&handle.id, None::<InspectContainerOptions>)
                .await
                .map_err(|e| classify_error(&handle.name, e))
        })?;

        let state = inspect
            .state
            .ok_or_else(|| RuntimeError::Malformed("container inspect without State".to_string()))?;
        Ok(if state.running.unwrap_or(false) {
            RuntimeStatus::Running
        } else {
            RuntimeStatus::NotRunning
        })
    }

    fn logs(
        &self,
        handle: &ContainerHandle,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        tail: usize,
    ) -> RuntimeResult<Vec<u8>> {
        let docker = self.client()?;
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            since: since.timestamp(),
            until: until.timestamp(),
            tail: tail.to_string(),
            ..Default::default()
        };

        self.call("logs", self.timeout, async {
            let mut stream = docker.logs(&handle.id, Some(options));
            let mut payload = Vec::new();
            while let Some(chunk) = stream.next().await {
                match chunk.map_err(|e| classify_error(&handle.name, e))? {
                    LogOutput::StdOut { message }
                    | LogOutput::StdErr { message }
                    | LogOutput::Console { message } => payload.extend_from_slice(&message),
                    LogOutput::StdIn { .. } => {}
                }
            }
            Ok(payload)
        })
    }

    fn stop(&self, handle: &ContainerHandle) -> RuntimeResult<()> {
        let docker = self.client()?;
        let options = StopContainerOptions {
            t: self.stop_grace.as_secs() as i64,
        };

        self.call("stop", self.timeout + self.stop_grace, async {
            match docker.stop_container(&handle.id, Some(options)).await {
                Ok(()) => Ok(()),
                // Already stopped
                Err(BollardError::DockerResponseServerError {
                    status_code: 304, ..
                }) => Ok(()),
                Err(e) => Err(classify_error(&handle.name, e)),
            }
        })
    }
}

fn connect(host: Option<&str>, timeout: Duration) -> Result<Docker, BollardError> {
    let secs = timeout.as_secs().max(1);
    match host {
        None => Docker::connect_with_local_defaults(),
        Some(h) if h.starts_with("unix://") || h.starts_with('/') => {
            Docker::connect_with_socket(h.trim_start_matches("unix://"), secs, API_DEFAULT_VERSION)
        }
        Some(h) => Docker::connect_with_http(h, secs, API_DEFAULT_VERSION),
    }
}

fn classify_error(target: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(target.to_string()),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Unavailable(format!("daemon returned {}: {}", status_code, message)),
        other => RuntimeError::Unavailable(other.to_string()),
    }
}
