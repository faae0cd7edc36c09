//! Container runtime abstraction.
//!
//! The orchestrator never talks to a container engine directly; it goes
//! through [`ContainerRuntime`]. [`docker::DockerRuntime`] speaks the
//! Docker Engine API and [`memory::InMemoryRuntime`] simulates an engine
//! in-process.

pub mod docker;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use testcompose_common::config::RunOptions;
use testcompose_common::error::Result;
use testcompose_common::types::{ContainerId, NetworkId};
use testcompose_compose::port::PortSpec;
use testcompose_compose::service::VolumeMount;

use crate::ports::RawPortBindings;

/// Everything needed to launch one detached container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Container name, unique per run.
    pub name: String,
    /// Hostname and network alias; the service name.
    pub hostname: String,
    /// Image reference.
    pub image: String,
    /// Command override.
    pub command: Option<String>,
    /// Entrypoint override.
    pub entrypoint: Option<String>,
    /// Resolved environment.
    pub environment: BTreeMap<String, String>,
    /// Ports to publish.
    pub ports: Vec<PortSpec>,
    /// Volume mounts.
    pub volumes: Vec<VolumeMount>,
    /// Network to attach to.
    pub network: String,
    /// Labels identifying the run and service.
    pub labels: BTreeMap<String, String>,
}

/// The subset of `inspect` output the orchestrator uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInspection {
    /// Runtime identifier.
    pub id: ContainerId,
    /// Status string (`created`, `running`, `exited`, ...).
    pub status: String,
    /// Exit code, meaningful once exited.
    pub exit_code: i64,
    /// Published ports per protocol.
    pub ports: RawPortBindings,
    /// Names of attached networks.
    pub networks: Vec<String>,
}

impl ContainerInspection {
    /// Returns whether the container is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    /// Returns whether the container can no longer become running.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        matches!(self.status.as_str(), "exited" | "dead" | "removing")
    }
}

/// A network known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Runtime identifier.
    pub id: NetworkId,
    /// Network name.
    pub name: String,
    /// Driver name.
    pub driver: String,
}

/// Parameters of a network to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCreateRequest {
    /// Network name.
    pub name: String,
    /// Driver; `bridge` for test networks.
    pub driver: String,
    /// Whether standalone containers may attach.
    pub attachable: bool,
    /// Whether IPv6 is enabled.
    pub enable_ipv6: bool,
    /// Labels identifying the run.
    pub labels: BTreeMap<String, String>,
}

impl NetworkCreateRequest {
    /// An isolated, host-scoped, attachable bridge network without IPv6.
    #[must_use]
    pub fn bridge(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            driver: "bridge".into(),
            attachable: true,
            enable_ipv6: false,
            labels,
        }
    }
}

/// Synchronous container engine client.
///
/// Implementors map engine failures onto the shared error type:
/// unreachable engines are [`RuntimeUnavailable`], missing objects are
/// [`NotFound`], everything else is [`Runtime`].
///
/// [`RuntimeUnavailable`]: testcompose_common::error::TestComposeError::RuntimeUnavailable
/// [`NotFound`]: testcompose_common::error::TestComposeError::NotFound
/// [`Runtime`]: testcompose_common::error::TestComposeError::Runtime
pub trait ContainerRuntime: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Checks that the engine answers.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeUnavailable` when it does not.
    fn ping(&self) -> Result<()>;

    /// Makes `image` available locally, pulling it when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails.
    fn ensure_image(&self, image: &str) -> Result<()>;

    /// Creates and starts a detached container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be created or started.
    /// A container may exist under `request.name` even then.
    fn run(&self, request: &RunRequest) -> Result<ContainerId>;

    /// Reads the current status and port bindings of a container.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown container.
    fn inspect(&self, id: &ContainerId) -> Result<ContainerInspection>;

    /// Returns everything the container wrote to stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown container.
    fn logs(&self, id: &ContainerId) -> Result<String>;

    /// Removes a container. `id` may also be a container name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the container is already gone.
    fn remove(&self, id: &ContainerId, force: bool, volumes: bool) -> Result<()>;

    /// Looks up a network by exact name.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn find_network(&self, name: &str) -> Result<Option<NetworkInfo>>;

    /// Creates a network.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    fn create_network(&self, request: &NetworkCreateRequest) -> Result<NetworkInfo>;

    /// Removes a network by name.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    fn remove_network(&self, name: &str) -> Result<()>;

    /// Lists containers, in any state, carrying the label `key=value`.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    fn list_labelled_containers(&self, label: &str) -> Result<Vec<ContainerId>>;
}

/// Connects to the engine named by `options.client`, logging in to
/// `options.registry_login` for pulls.
///
/// # Errors
///
/// Returns a configuration error for an invalid endpoint or login, and
/// `RuntimeUnavailable` if no client can be built.
pub fn connect_runtime(options: &RunOptions) -> Result<Arc<dyn ContainerRuntime>> {
    let runtime =
        docker::DockerRuntime::connect(&options.client, options.registry_login.as_ref())?;
    tracing::debug!(?runtime, "using docker engine runtime");
    Ok(Arc::new(runtime))
}

/// Connects to the engine found through `DOCKER_HOST` or the local
/// socket, without registry credentials.
///
/// # Errors
///
/// Returns `RuntimeUnavailable` if no client can be built.
pub fn detect_runtime() -> Result<Arc<dyn ContainerRuntime>> {
    connect_runtime(&RunOptions::default())
}
