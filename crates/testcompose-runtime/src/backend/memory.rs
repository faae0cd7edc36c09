//! In-process runtime simulation.
//!
//! Keeps containers and networks in a map, records every call, and lets
//! callers script how containers of a given image behave. Host ports are
//! handed out sequentially from 32768 unless pinned.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use testcompose_common::error::{Result, TestComposeError};
use testcompose_common::types::{ContainerId, NetworkId};

use super::{ContainerInspection, ContainerRuntime, NetworkCreateRequest, NetworkInfo, RunRequest};
use crate::ports::{HostBinding, RawPortBindings};

const FIRST_HOST_PORT: u16 = 32_768;

/// How containers started from one image behave.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageBehaviour {
    run_error: Option<String>,
    exit_code: Option<i64>,
    logs: String,
}

impl ImageBehaviour {
    /// `run` fails with `message` after the container was created.
    #[must_use]
    pub fn failing_run(mut self, message: impl Into<String>) -> Self {
        self.run_error = Some(message.into());
        self
    }

    /// The container exits with `code` right after starting.
    #[must_use]
    pub const fn exiting(mut self, code: i64) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// The container writes `logs` once started.
    #[must_use]
    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = logs.into();
        self
    }
}

/// One recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// `ping`
    Ping,
    /// `ensure_image(image)`
    EnsureImage(String),
    /// `run` of a container name.
    Run(String),
    /// `inspect(id)`
    Inspect(String),
    /// `logs(id)`
    Logs(String),
    /// `remove(id, force, volumes)`
    Remove {
        /// Container id or name.
        id: String,
        /// Force flag.
        force: bool,
        /// Volume cleanup flag.
        volumes: bool,
    },
    /// `find_network(name)`
    FindNetwork(String),
    /// `create_network(name)`
    CreateNetwork(String),
    /// `remove_network(name)`
    RemoveNetwork(String),
    /// `list_labelled_containers(label)`
    ListLabelled(String),
}

/// A simulated container.
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    /// Runtime identifier.
    pub id: ContainerId,
    /// The request it was started from.
    pub request: RunRequest,
    /// Current status.
    pub status: String,
    /// Exit code.
    pub exit_code: i64,
    /// Published ports.
    pub ports: RawPortBindings,
    logs: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    containers: BTreeMap<String, MemoryContainer>,
    networks: BTreeMap<String, NetworkInfo>,
    images: BTreeSet<String>,
    behaviours: HashMap<String, ImageBehaviour>,
    calls: Vec<RuntimeCall>,
    next_id: u64,
    next_host_port: u16,
    unavailable: bool,
}

impl MemoryState {
    fn key_of(&self, id: &ContainerId) -> Option<String> {
        if self.containers.contains_key(id.as_str()) {
            return Some(id.to_string());
        }
        self.containers
            .iter()
            .find(|(_, c)| c.request.name == id.as_str())
            .map(|(k, _)| k.clone())
    }

    fn container(&self, id: &ContainerId) -> Result<&MemoryContainer> {
        self.key_of(id)
            .and_then(|k| self.containers.get(&k))
            .ok_or_else(|| not_found("container", id.as_str()))
    }

    fn allocate_host_port(&mut self) -> u16 {
        let port = self.next_host_port;
        self.next_host_port = self.next_host_port.wrapping_add(1).max(FIRST_HOST_PORT);
        port
    }
}

/// Deterministic in-process [`ContainerRuntime`].
#[derive(Debug)]
pub struct InMemoryRuntime {
    state: Mutex<MemoryState>,
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRuntime {
    /// An empty runtime that answers pings and knows no networks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_host_port: FIRST_HOST_PORT,
                ..MemoryState::default()
            }),
        }
    }

    /// Adds a pre-existing network.
    #[must_use]
    pub fn with_network(self, name: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            let info = NetworkInfo {
                id: NetworkId::new(format!("net-{name}")),
                name: name.to_string(),
                driver: "bridge".into(),
            };
            let _ = state.networks.insert(name.to_string(), info);
        }
        self
    }

    /// Scripts the behaviour of containers started from `image`.
    #[must_use]
    pub fn with_image(self, image: &str, behaviour: ImageBehaviour) -> Self {
        if let Ok(mut state) = self.state.lock() {
            let _ = state.behaviours.insert(image.to_string(), behaviour);
        }
        self
    }

    /// Makes every call fail as if the engine were down.
    #[must_use]
    pub fn unavailable(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = true;
        }
        self
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Number of recorded calls matching `predicate`.
    #[must_use]
    pub fn count_calls(&self, predicate: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.lock()
            .map(|s| s.calls.iter().filter(|c| predicate(*c)).count())
            .unwrap_or_default()
    }

    /// Containers that still exist, keyed by id.
    #[must_use]
    pub fn containers(&self) -> Vec<MemoryContainer> {
        self.lock()
            .map(|s| s.containers.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of existing networks.
    #[must_use]
    pub fn network_names(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.networks.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Creates a container outside of any orchestrator, for orphan tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock is poisoned.
    pub fn insert_container(&self, request: RunRequest) -> Result<ContainerId> {
        let mut state = self.lock()?;
        Ok(create(&mut state, request, "running"))
    }

    /// Appends to the logs of a container.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown container.
    pub fn append_logs(&self, id: &ContainerId, text: &str) -> Result<()> {
        let mut state = self.lock()?;
        let key = state
            .key_of(id)
            .ok_or_else(|| not_found("container", id.as_str()))?;
        if let Some(container) = state.containers.get_mut(&key) {
            container.logs.push_str(text);
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| TestComposeError::Runtime {
            operation: "lock",
            message: "in-memory runtime lock poisoned".into(),
        })
    }

    /// Locks the state, records `call`, and fails if the engine is down.
    fn enter(&self, call: RuntimeCall) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock()?;
        state.calls.push(call);
        if state.unavailable {
            return Err(TestComposeError::RuntimeUnavailable {
                message: "in-memory runtime is marked unavailable".into(),
            });
        }
        Ok(state)
    }
}

fn not_found(kind: &'static str, id: &str) -> TestComposeError {
    TestComposeError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn create(state: &mut MemoryState, request: RunRequest, status: &str) -> ContainerId {
    state.next_id += 1;
    let id = ContainerId::new(format!("{:064x}", state.next_id));
    let mut ports = RawPortBindings::new();
    for spec in &request.ports {
        let host_port = spec.host.unwrap_or_else(|| state.allocate_host_port());
        let _ = ports.insert(
            format!("{}/tcp", spec.container),
            Some(vec![HostBinding::any_interface(host_port)]),
        );
    }
    let container = MemoryContainer {
        id: id.clone(),
        request,
        status: status.to_string(),
        exit_code: 0,
        ports,
        logs: String::new(),
    };
    let _ = state.containers.insert(id.to_string(), container);
    id
}

impl ContainerRuntime for InMemoryRuntime {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    fn ping(&self) -> Result<()> {
        let _state = self.enter(RuntimeCall::Ping)?;
        Ok(())
    }

    fn ensure_image(&self, image: &str) -> Result<()> {
        let mut state = self.enter(RuntimeCall::EnsureImage(image.to_string()))?;
        let _ = state.images.insert(image.to_string());
        Ok(())
    }

    fn run(&self, request: &RunRequest) -> Result<ContainerId> {
        let mut state = self.enter(RuntimeCall::Run(request.name.clone()))?;
        if state.containers.values().any(|c| c.request.name == request.name) {
            return Err(TestComposeError::Runtime {
                operation: "run",
                message: format!("container name \"{}\" is already in use", request.name),
            });
        }
        if !state.networks.contains_key(&request.network) {
            return Err(TestComposeError::Runtime {
                operation: "run",
                message: format!("network {} not found", request.network),
            });
        }
        let behaviour = state
            .behaviours
            .get(&request.image)
            .cloned()
            .unwrap_or_default();

        let id = create(&mut state, request.clone(), "created");
        if let Some(message) = behaviour.run_error {
            return Err(TestComposeError::Runtime {
                operation: "run",
                message,
            });
        }
        if let Some(container) = state.containers.get_mut(id.as_str()) {
            container.logs = behaviour.logs;
            match behaviour.exit_code {
                Some(code) => {
                    container.status = "exited".into();
                    container.exit_code = code;
                }
                None => container.status = "running".into(),
            }
        }
        Ok(id)
    }

    fn inspect(&self, id: &ContainerId) -> Result<ContainerInspection> {
        let state = self.enter(RuntimeCall::Inspect(id.to_string()))?;
        let container = state.container(id)?;
        Ok(ContainerInspection {
            id: container.id.clone(),
            status: container.status.clone(),
            exit_code: container.exit_code,
            ports: container.ports.clone(),
            networks: vec![container.request.network.clone()],
        })
    }

    fn logs(&self, id: &ContainerId) -> Result<String> {
        let state = self.enter(RuntimeCall::Logs(id.to_string()))?;
        Ok(state.container(id)?.logs.clone())
    }

    fn remove(&self, id: &ContainerId, force: bool, volumes: bool) -> Result<()> {
        let mut state = self.enter(RuntimeCall::Remove {
            id: id.to_string(),
            force,
            volumes,
        })?;
        let key = state
            .key_of(id)
            .ok_or_else(|| not_found("container", id.as_str()))?;
        let running = state.containers.get(&key).is_some_and(|c| c.status == "running");
        if running && !force {
            return Err(TestComposeError::Runtime {
                operation: "rm",
                message: format!("container {id} is running; stop it or force removal"),
            });
        }
        let _ = state.containers.remove(&key);
        Ok(())
    }

    fn find_network(&self, name: &str) -> Result<Option<NetworkInfo>> {
        let state = self.enter(RuntimeCall::FindNetwork(name.to_string()))?;
        Ok(state.networks.get(name).cloned())
    }

    fn create_network(&self, request: &NetworkCreateRequest) -> Result<NetworkInfo> {
        let mut state = self.enter(RuntimeCall::CreateNetwork(request.name.clone()))?;
        if state.networks.contains_key(&request.name) {
            return Err(TestComposeError::Runtime {
                operation: "network create",
                message: format!("network with name {} already exists", request.name),
            });
        }
        let info = NetworkInfo {
            id: NetworkId::new(format!("net-{}", request.name)),
            name: request.name.clone(),
            driver: request.driver.clone(),
        };
        let _ = state.networks.insert(request.name.clone(), info.clone());
        Ok(info)
    }

    fn remove_network(&self, name: &str) -> Result<()> {
        let mut state = self.enter(RuntimeCall::RemoveNetwork(name.to_string()))?;
        if state
            .containers
            .values()
            .any(|c| c.request.network == name)
        {
            return Err(TestComposeError::Runtime {
                operation: "network rm",
                message: format!("network {name} has active endpoints"),
            });
        }
        state
            .networks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("network", name))
    }

    fn list_labelled_containers(&self, label: &str) -> Result<Vec<ContainerId>> {
        let state = self.enter(RuntimeCall::ListLabelled(label.to_string()))?;
        let (key, value) = label.split_once('=').unwrap_or((label, ""));
        Ok(state
            .containers
            .values()
            .filter(|c| c.request.labels.get(key).is_some_and(|v| v == value))
            .map(|c| c.id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use testcompose_compose::port::PortSpec;

    use super::*;

    fn request(name: &str, image: &str) -> RunRequest {
        RunRequest {
            name: name.into(),
            hostname: name.into(),
            image: image.into(),
            command: None,
            entrypoint: None,
            environment: BTreeMap::new(),
            ports: vec![PortSpec::any(8080), PortSpec::pinned(15_432, 5432)],
            volumes: Vec::new(),
            network: "net".into(),
            labels: BTreeMap::from([("tc.run".into(), "r1".into())]),
        }
    }

    #[test]
    fn run_assigns_sequential_host_ports() {
        let rt = InMemoryRuntime::new().with_network("net");
        let id = rt.run(&request("a", "img")).expect("run");
        let inspection = rt.inspect(&id).expect("inspect");
        assert!(inspection.is_running());
        assert_eq!(
            inspection.ports["8080/tcp"].as_ref().expect("bound")[0].host_port,
            "32768"
        );
        assert_eq!(
            inspection.ports["5432/tcp"].as_ref().expect("bound")[0].host_port,
            "15432"
        );
    }

    #[test]
    fn failing_run_leaves_created_container() {
        let rt = InMemoryRuntime::new()
            .with_network("net")
            .with_image("bad", ImageBehaviour::default().failing_run("port is already allocated"));
        let err = rt.run(&request("a", "bad")).unwrap_err();
        assert!(err.to_string().contains("already allocated"));
        let containers = rt.containers();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].status, "created");
        rt.remove(&ContainerId::new("a"), true, true).expect("remove by name");
        assert!(rt.containers().is_empty());
    }

    #[test]
    fn unavailable_runtime_fails_ping() {
        let rt = InMemoryRuntime::new().unavailable();
        assert!(matches!(
            rt.ping().unwrap_err(),
            TestComposeError::RuntimeUnavailable { .. }
        ));
        assert_eq!(rt.calls(), vec![RuntimeCall::Ping]);
    }

    #[test]
    fn remove_missing_is_not_found() {
        let rt = InMemoryRuntime::new();
        let err = rt.remove(&ContainerId::new("nope"), true, true).unwrap_err();
        assert!(matches!(err, TestComposeError::NotFound { .. }));
    }

    #[test]
    fn labelled_containers_are_listed() {
        let rt = InMemoryRuntime::new().with_network("net");
        let _ = rt.run(&request("a", "img")).expect("run");
        assert_eq!(rt.list_labelled_containers("tc.run=r1").expect("list").len(), 1);
        assert!(rt.list_labelled_containers("tc.run=r2").expect("list").is_empty());
    }

    #[test]
    fn network_with_containers_cannot_be_removed() {
        let rt = InMemoryRuntime::new().with_network("net");
        let id = rt.run(&request("a", "img")).expect("run");
        assert!(rt.remove_network("net").is_err());
        rt.remove(&id, true, false).expect("remove");
        rt.remove_network("net").expect("remove network");
        assert!(rt.network_names().is_empty());
    }
}
