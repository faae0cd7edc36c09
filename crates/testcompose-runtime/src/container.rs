//! Per-service container lifecycle.

use std::thread;
use std::time::{Duration, Instant};

use testcompose_common::error::{Result, TestComposeError};
use testcompose_common::types::{ContainerId, ContainerState};
use testcompose_compose::service::ServiceDescriptor;

use crate::backend::{ContainerRuntime, RunRequest};
use crate::health::{self, HttpProbe};
use crate::ports::PortMap;

/// One service's container and where it is in its lifecycle.
#[derive(Debug, Clone)]
pub struct ServiceContainer {
    service: String,
    container_name: String,
    id: Option<ContainerId>,
    state: ContainerState,
    ports: PortMap,
}

impl ServiceContainer {
    /// A container that has not been started.
    #[must_use]
    pub fn new(service: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            container_name: container_name.into(),
            id: None,
            state: ContainerState::Created,
            ports: PortMap::default(),
        }
    }

    /// Service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Container name used with the runtime.
    #[must_use]
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Runtime identifier, once started.
    #[must_use]
    pub const fn id(&self) -> Option<&ContainerId> {
        self.id.as_ref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ContainerState {
        self.state
    }

    /// Published ports as of the last inspection.
    #[must_use]
    pub const fn ports(&self) -> &PortMap {
        &self.ports
    }

    fn transition(&mut self, next: ContainerState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                service = %self.service,
                from = %self.state,
                to = %next,
                "unexpected lifecycle transition"
            );
        }
        tracing::trace!(service = %self.service, from = %self.state, to = %next, "transition");
        self.state = next;
    }

    /// Issues the detached run request.
    ///
    /// If the run fails, whatever the runtime created under the container
    /// name is removed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeUnavailable` if the runtime does not answer and
    /// `ContainerStart` if the run request fails.
    pub fn start(&mut self, runtime: &dyn ContainerRuntime, request: &RunRequest) -> Result<()> {
        runtime.ping()?;
        self.transition(ContainerState::Starting);
        match runtime.run(request) {
            Ok(id) => {
                tracing::debug!(service = %self.service, id = %id.short(), "container started");
                self.id = Some(id);
                Ok(())
            }
            Err(e) => {
                let by_name = ContainerId::new(self.container_name.clone());
                if let Err(cleanup) = runtime.remove(&by_name, true, true) {
                    tracing::debug!(
                        service = %self.service,
                        error = %cleanup,
                        "nothing to clean up after failed run"
                    );
                }
                self.transition(ContainerState::Failed);
                Err(e.for_service_start(&self.service))
            }
        }
    }

    fn started_id(&self) -> Result<&ContainerId> {
        self.id.as_ref().ok_or_else(|| TestComposeError::ContainerStart {
            service: self.service.clone(),
            message: "container was never started".into(),
        })
    }

    /// Polls until the runtime reports the container as running, then
    /// records its port bindings.
    ///
    /// # Errors
    ///
    /// Returns `ContainerExited` if it exits first and `Timeout` if
    /// `timeout` passes.
    pub fn wait_until_running(
        &mut self,
        runtime: &dyn ContainerRuntime,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        let id = self.started_id()?.clone();
        let started = Instant::now();
        loop {
            let inspection = runtime.inspect(&id)?;
            if inspection.is_running() {
                self.ports = PortMap::from_bindings(&inspection.ports);
                self.transition(ContainerState::Running);
                return Ok(());
            }
            if inspection.has_exited() {
                return Err(TestComposeError::ContainerExited {
                    service: self.service.clone(),
                    status: format!("{} ({})", inspection.status, inspection.exit_code),
                });
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(TestComposeError::Timeout {
                    service: self.service.clone(),
                    waiting_for: "running state",
                    elapsed_secs: elapsed.as_secs_f64(),
                });
            }
            thread::sleep(poll_interval.min(timeout - elapsed));
        }
    }

    /// Evaluates the log gate, then every HTTP gate, of `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns the first gate failure.
    pub fn wait_for_health(
        &mut self,
        runtime: &dyn ContainerRuntime,
        descriptor: &ServiceDescriptor,
        host: &str,
        probe: &dyn HttpProbe,
    ) -> Result<()> {
        let id = self.started_id()?.clone();
        self.transition(ContainerState::HealthChecking);
        if let Some(params) = &descriptor.log_wait {
            health::wait_for_log(runtime, &id, &self.service, params)?;
        }
        for params in descriptor.http_gates() {
            health::wait_for_http(runtime, &id, &self.service, params, host, &self.ports, probe)?;
        }
        self.transition(ContainerState::Ready);
        Ok(())
    }

    /// Force-removes the container and its anonymous volumes.
    ///
    /// Idempotent; runtime errors are logged, never returned. Returns
    /// whether a container was removed by this call.
    pub fn stop(&mut self, runtime: &dyn ContainerRuntime) -> bool {
        if self.state == ContainerState::Removed {
            return false;
        }
        self.transition(ContainerState::Stopping);
        let removed = match self.id.take() {
            Some(id) => match runtime.remove(&id, true, true) {
                Ok(()) => true,
                Err(TestComposeError::NotFound { .. }) => {
                    tracing::debug!(service = %self.service, id = %id.short(), "container already gone");
                    false
                }
                Err(e) => {
                    tracing::warn!(service = %self.service, id = %id.short(), error = %e, "failed to remove container");
                    false
                }
            },
            None => false,
        };
        self.transition(ContainerState::Removed);
        removed
    }
}
