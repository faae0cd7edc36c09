//! Run orchestrator.
//!
//! [`Engine::start`] ranks the services, prepares the shared network and
//! brings every service up in rank order, one at a time. A service only
//! starts after every lower-ranked service is ready, so its placeholders
//! can read their environments and ports from the [`Registry`].
//!
//! Any failure tears down everything started so far before the error is
//! returned. [`Engine::teardown`] is idempotent.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use testcompose_common::config::RunOptions;
use testcompose_common::constants;
use testcompose_common::error::{Result, TestComposeError};
use testcompose_common::types::RunId;
use testcompose_compose::graph;
use testcompose_compose::host::{HostNetwork, SystemHost};
use testcompose_compose::resolver;
use testcompose_compose::service::{ServiceDescriptor, ServiceSet};

use crate::backend::{ContainerRuntime, RunRequest};
use crate::container::ServiceContainer;
use crate::event::{LifecycleEvent, LifecycleObserver, TracingObserver};
use crate::health::{HttpProbe, ReqwestProbe};
use crate::network::{self, NetworkHandle};
use crate::registry::{Registry, RunningService};

/// Drives one run from ranking to teardown.
pub struct Engine {
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn HttpProbe>,
    host: Arc<dyn HostNetwork>,
    observer: Arc<dyn LifecycleObserver>,
    options: RunOptions,
    run_id: RunId,
    network: Option<NetworkHandle>,
    registry: Registry,
    started: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("runtime", &self.runtime.name())
            .field("run_id", &self.run_id)
            .field("network", &self.network)
            .field("services", &self.registry.names())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine over `runtime` with a fresh run id, default
    /// options, the system host, a `reqwest` probe and tracing output.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Result<Self> {
        let probe = ReqwestProbe::new(Duration::from_millis(constants::HTTP_PROBE_TIMEOUT_MS))?;
        Ok(Self {
            runtime,
            probe: Arc::new(probe),
            host: Arc::new(SystemHost),
            observer: Arc::new(TracingObserver),
            options: RunOptions::default(),
            run_id: RunId::generate(),
            network: None,
            registry: Registry::default(),
            started: false,
        })
    }

    /// Replaces the HTTP probe used by health gates.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn HttpProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replaces the source of free ports and the host address.
    #[must_use]
    pub fn with_host(mut self, host: Arc<dyn HostNetwork>) -> Self {
        self.host = host;
        self
    }

    /// Replaces the lifecycle observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replaces the run options.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses a fixed run id instead of a generated one.
    #[must_use]
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    /// Identifier of this run.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The shared network, once prepared.
    #[must_use]
    pub const fn network(&self) -> Option<&NetworkHandle> {
        self.network.as_ref()
    }

    /// Services that are up, in rank order.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The runtime this engine drives.
    #[must_use]
    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    fn emit(&self, event: LifecycleEvent) {
        self.observer.on_event(&event);
    }

    /// Starts every service of `services` in rank order and waits for
    /// each to pass its health gates.
    ///
    /// An engine runs once; start a new engine for another run.
    ///
    /// # Errors
    ///
    /// Configuration errors are returned before any container is started.
    /// Start and health failures are returned after everything started so
    /// far has been torn down.
    pub fn start(&mut self, services: &ServiceSet) -> Result<&Registry> {
        if self.started {
            return Err(TestComposeError::Config {
                message: format!("run {} was already started", self.run_id),
            });
        }
        let ranked = graph::rank_services(services)?;
        let policy = self.options.network.policy()?;
        self.started = true;
        tracing::info!(run = %self.run_id, order = ?ranked.names(), "starting services");

        self.runtime.ping()?;
        let network_name = policy.network_name(&self.run_id);
        let handle = network::ensure_network(
            self.runtime.as_ref(),
            &policy,
            &network_name,
            self.run_labels(),
        )?;
        self.emit(LifecycleEvent::NetworkReady {
            name: handle.name.clone(),
            created: handle.created,
        });
        self.network = Some(handle);

        for (rank, name) in ranked.iter() {
            let descriptor = services.get(name).ok_or_else(|| TestComposeError::Config {
                message: format!("ranked service \"{name}\" is not declared"),
            })?;
            if let Err(e) = self.start_service(rank, descriptor) {
                self.emit(LifecycleEvent::ServiceFailed {
                    service: name.to_string(),
                    reason: e.to_string(),
                });
                self.teardown();
                return Err(e);
            }
        }
        Ok(&self.registry)
    }

    fn run_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(self.options.run_label_key(), self.run_id.to_string())])
    }

    fn start_service(&mut self, rank: usize, descriptor: &ServiceDescriptor) -> Result<()> {
        let name = descriptor.name.as_str();
        self.emit(LifecycleEvent::ServiceStarting {
            service: name.to_string(),
            rank,
        });

        let resolved = resolver::resolve_service(descriptor, &self.registry, self.host.as_ref())?;
        if self.options.pull_images {
            self.runtime
                .ensure_image(&descriptor.image)
                .map_err(|e| e.for_service_start(name))?;
        }

        let mut labels = self.run_labels();
        let _ = labels.insert(self.options.service_label_key(), name.to_string());
        let network = self
            .network
            .as_ref()
            .map(|n| n.name.clone())
            .unwrap_or_default();
        let request = RunRequest {
            name: self.run_id.container_name(name),
            hostname: name.to_string(),
            image: descriptor.image.clone(),
            command: descriptor.command.clone(),
            entrypoint: descriptor.entrypoint.clone(),
            environment: resolved.environment.clone(),
            ports: resolved.exposed_ports,
            volumes: descriptor.volumes.clone(),
            network,
            labels,
        };

        let mut container = ServiceContainer::new(name, request.name.clone());
        if let Err(e) = self.bring_up(&mut container, descriptor, &request) {
            let _ = container.stop(self.runtime.as_ref());
            return Err(e);
        }

        let id = container.id().cloned();
        self.registry.push(RunningService {
            rank,
            name: name.to_string(),
            environment: resolved.environment,
            container,
            started_at: Utc::now(),
        });
        if let Some(container) = id {
            self.emit(LifecycleEvent::ServiceReady {
                service: name.to_string(),
                container,
            });
        }
        Ok(())
    }

    fn bring_up(
        &self,
        container: &mut ServiceContainer,
        descriptor: &ServiceDescriptor,
        request: &RunRequest,
    ) -> Result<()> {
        let runtime = self.runtime.as_ref();
        container.start(runtime, request)?;
        container.wait_until_running(
            runtime,
            self.options.running_timeout,
            self.options.running_poll_interval,
        )?;
        let host = if descriptor.http_gates().next().is_some() {
            self.host.host_address()?.to_string()
        } else {
            String::new()
        };
        container.wait_for_health(runtime, descriptor, &host, self.probe.as_ref())
    }

    /// Stops every running service in reverse rank order, removes any
    /// container still labelled with this run, then removes the network.
    ///
    /// Errors are logged, never returned. Calling it again is a no-op.
    pub fn teardown(&mut self) {
        let runtime = Arc::clone(&self.runtime);
        while let Some(mut service) = self.registry.pop() {
            if service.container.stop(runtime.as_ref()) {
                self.emit(LifecycleEvent::ServiceStopped {
                    service: service.name,
                });
            }
        }

        let Some(handle) = self.network.take() else {
            return;
        };
        self.reap_orphans();
        if network::remove_network(runtime.as_ref(), &handle) {
            self.emit(LifecycleEvent::NetworkRemoved { name: handle.name });
        }
        tracing::info!(run = %self.run_id, "teardown complete");
    }

    fn reap_orphans(&self) {
        let label = format!("{}={}", self.options.run_label_key(), self.run_id);
        let orphans = match self.runtime.list_labelled_containers(&label) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(run = %self.run_id, error = %e, "failed to list run containers");
                return;
            }
        };
        for id in orphans {
            match self.runtime.remove(&id, true, true) {
                Ok(()) => self.emit(LifecycleEvent::OrphanReaped { container: id }),
                Err(e) => {
                    tracing::warn!(id = %id.short(), error = %e, "failed to remove orphaned container");
                }
            }
        }
    }
}
