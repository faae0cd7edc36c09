//! Runtime backed by the Docker Engine API through `bollard`.
//!
//! [`ContainerRuntime`] is synchronous: every call is driven to
//! completion on a private current-thread tokio runtime. Engine failures
//! are classified by HTTP status and transport error, never by message
//! text.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, NetworkingConfig, RemoveContainerOptions, StartContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerInspectResponse, EndpointSettings, HostConfig, Network, PortBinding};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures::TryStreamExt;
use serde::Deserialize;
use testcompose_common::config::{ClientOptions, RegistryLogin};
use testcompose_common::constants;
use testcompose_common::error::{Result, TestComposeError};
use testcompose_common::types::{ContainerId, NetworkId};
use tokio::runtime::Runtime;

use super::{ContainerInspection, ContainerRuntime, NetworkCreateRequest, NetworkInfo, RunRequest};
use crate::ports::{HostBinding, RawPortBindings};

/// Where the engine is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    /// `DOCKER_HOST`, then the platform's local socket.
    Defaults,
    /// A unix socket or named pipe.
    Socket(String),
    /// Plain TCP.
    Http(String),
    /// TCP with client certificates from `cert_dir`.
    Tls { address: String, cert_dir: PathBuf },
}

impl Endpoint {
    fn from_options(options: &ClientOptions) -> Result<Self> {
        let host = options
            .docker_host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty());
        let Some(host) = host else {
            if options.tls {
                return Err(TestComposeError::Config {
                    message: "TLS needs an explicit docker host".into(),
                });
            }
            return Ok(Self::Defaults);
        };

        let scheme = host.split_once("://").map(|(scheme, _)| scheme);
        match scheme {
            Some("unix" | "npipe") if options.tls => Err(TestComposeError::Config {
                message: format!("TLS is not supported for socket endpoint {host}"),
            }),
            Some("unix" | "npipe") => Ok(Self::Socket(host.to_string())),
            Some("https") => Ok(Self::tls(host, options)),
            Some("tcp" | "http") | None if options.tls => Ok(Self::tls(host, options)),
            Some("tcp" | "http") | None => Ok(Self::Http(host.to_string())),
            Some(other) => Err(TestComposeError::Config {
                message: format!("unsupported docker host scheme \"{other}\" in {host}"),
            }),
        }
    }

    fn tls(host: &str, options: &ClientOptions) -> Self {
        Self::Tls {
            address: host.to_string(),
            cert_dir: options.cert_path.clone().unwrap_or_else(default_cert_dir),
        }
    }

    fn connect(&self, timeout: Duration) -> std::result::Result<Docker, DockerError> {
        let secs = timeout.as_secs().max(1);
        match self {
            Self::Defaults => Docker::connect_with_defaults().map(|d| d.with_timeout(timeout)),
            Self::Socket(path) => connect_socket(path, secs),
            Self::Http(address) => Docker::connect_with_http(address, secs, API_DEFAULT_VERSION),
            Self::Tls { address, cert_dir } => Docker::connect_with_ssl(
                address,
                &cert_dir.join("key.pem"),
                &cert_dir.join("cert.pem"),
                &cert_dir.join("ca.pem"),
                secs,
                API_DEFAULT_VERSION,
            ),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaults => f.write_str("local defaults"),
            Self::Socket(address) | Self::Http(address) => f.write_str(address),
            Self::Tls { address, .. } => write!(f, "{address} (tls)"),
        }
    }
}

#[cfg(unix)]
fn connect_socket(path: &str, secs: u64) -> std::result::Result<Docker, DockerError> {
    Docker::connect_with_unix(path, secs, API_DEFAULT_VERSION)
}

#[cfg(windows)]
fn connect_socket(path: &str, secs: u64) -> std::result::Result<Docker, DockerError> {
    Docker::connect_with_named_pipe(path, secs, API_DEFAULT_VERSION)
}

fn default_cert_dir() -> PathBuf {
    std::env::var_os("DOCKER_CERT_PATH").map_or_else(
        || {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(".docker")
        },
        PathBuf::from,
    )
}

/// Credentials sent with pulls from one registry.
#[derive(Clone)]
struct RegistryCredentials {
    registry: String,
    credentials: DockerCredentials,
}

impl RegistryCredentials {
    fn from_login(login: &RegistryLogin) -> Result<Self> {
        login.validate()?;
        let credentials = if let Some(username) = &login.username {
            DockerCredentials {
                username: Some(username.clone()),
                password: login.password.clone(),
                email: login.email.clone(),
                serveraddress: Some(login.registry().to_string()),
                ..DockerCredentials::default()
            }
        } else if let Some(path) = &login.dockercfg_path {
            read_stored_credentials(path, login.registry())?
        } else {
            return Err(TestComposeError::Config {
                message: "registry login has no credentials".into(),
            });
        };
        Ok(Self {
            registry: normalize_registry(login.registry()),
            credentials,
        })
    }

    fn applies_to(&self, image: &str) -> bool {
        image_registry(image) == self.registry
    }
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: BTreeMap<String, StoredAuth>,
}

#[derive(Debug, Default, Deserialize)]
struct StoredAuth {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default, rename = "identitytoken")]
    identity_token: Option<String>,
}

fn read_stored_credentials(path: &Path, registry: &str) -> Result<DockerCredentials> {
    let content = fs::read_to_string(path).map_err(|source| TestComposeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    stored_credentials(&content, registry).map_err(|e| match e {
        TestComposeError::Config { message } => TestComposeError::Config {
            message: format!("{}: {message}", path.display()),
        },
        other => other,
    })
}

/// Picks the `auths` entry of a docker `config.json` for `registry`.
fn stored_credentials(content: &str, registry: &str) -> Result<DockerCredentials> {
    let file: DockerConfigFile = serde_json::from_str(content)?;
    let wanted = normalize_registry(registry);
    let (server, stored) = file
        .auths
        .into_iter()
        .find(|(server, _)| normalize_registry(server) == wanted)
        .ok_or_else(|| TestComposeError::Config {
            message: format!("no stored credentials for registry {registry}"),
        })?;
    if stored.auth.is_none() && stored.identity_token.is_none() {
        return Err(TestComposeError::Config {
            message: format!("stored credentials for {server} are empty"),
        });
    }
    Ok(DockerCredentials {
        auth: stored.auth,
        identitytoken: stored.identity_token,
        serveraddress: Some(server),
        ..DockerCredentials::default()
    })
}

/// Reduces a registry address to a bare lower-case host; every Docker
/// Hub alias becomes [`constants::DEFAULT_REGISTRY`].
fn normalize_registry(address: &str) -> String {
    let host = address
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = host.split('/').next().unwrap_or(host).to_ascii_lowercase();
    match host.as_str() {
        "" | "index.docker.io" | "registry-1.docker.io" | "registry.hub.docker.com" => {
            constants::DEFAULT_REGISTRY.to_string()
        }
        _ => host,
    }
}

/// Registry an image reference is pulled from.
fn image_registry(image: &str) -> String {
    match image.split_once('/') {
        Some((first, _)) if first.contains(['.', ':']) || first == "localhost" => {
            normalize_registry(first)
        }
        _ => constants::DEFAULT_REGISTRY.to_string(),
    }
}

/// Splits an image reference into repository and tag. A reference
/// without a tag gets `latest`, since an empty tag pulls every tag.
fn split_reference(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

/// Drives containers through the Docker Engine API.
pub struct DockerRuntime {
    docker: Docker,
    runtime: Runtime,
    credentials: Option<RegistryCredentials>,
}

impl fmt::Debug for DockerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerRuntime")
            .field(
                "registry",
                &self.credentials.as_ref().map(|c| c.registry.as_str()),
            )
            .finish_non_exhaustive()
    }
}

impl DockerRuntime {
    /// Connects to the engine described by `client`.
    ///
    /// Nothing is sent yet; [`ContainerRuntime::ping`] checks that the
    /// engine answers.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unusable endpoint or login,
    /// and `RuntimeUnavailable` if no client can be built.
    pub fn connect(client: &ClientOptions, login: Option<&RegistryLogin>) -> Result<Self> {
        let endpoint = Endpoint::from_options(client)?;
        let credentials = login.map(RegistryCredentials::from_login).transpose()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TestComposeError::RuntimeUnavailable {
                message: format!("failed to start I/O runtime: {e}"),
            })?;
        let docker = {
            let _guard = runtime.enter();
            endpoint.connect(client.timeout)
        }
        .map_err(|e| TestComposeError::RuntimeUnavailable {
            message: format!("cannot connect to docker at {endpoint}: {e}"),
        })?;
        tracing::debug!(
            %endpoint,
            registry = credentials.as_ref().map(|c| c.registry.as_str()),
            "docker client ready"
        );
        Ok(Self {
            docker,
            runtime,
            credentials,
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn credentials_for(&self, image: &str) -> Option<DockerCredentials> {
        self.credentials
            .as_ref()
            .filter(|c| c.applies_to(image))
            .map(|c| c.credentials.clone())
    }
}

impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn ping(&self) -> Result<()> {
        match self.block_on(self.docker.ping()) {
            Ok(reply) => {
                tracing::debug!(%reply, "docker engine reachable");
                Ok(())
            }
            Err(e) => Err(TestComposeError::RuntimeUnavailable {
                message: e.to_string(),
            }),
        }
    }

    fn ensure_image(&self, image: &str) -> Result<()> {
        match self.block_on(self.docker.inspect_image(image)) {
            Ok(_) => {
                tracing::debug!(image, "image present locally");
                return Ok(());
            }
            Err(e) => match lookup_error("image inspect", "image", image, e) {
                TestComposeError::NotFound { .. } => {}
                other => return Err(other),
            },
        }

        let (repository, tag) = split_reference(image);
        let credentials = self.credentials_for(image);
        tracing::info!(image, authenticated = credentials.is_some(), "pulling image");
        let options = CreateImageOptions {
            from_image: repository.to_string(),
            tag: tag.to_string(),
            ..CreateImageOptions::default()
        };
        let progress: Vec<_> = self
            .block_on(
                self.docker
                    .create_image(Some(options), None, credentials)
                    .try_collect(),
            )
            .map_err(|e| engine_error("pull", e))?;
        tracing::debug!(image, updates = progress.len(), "image pulled");
        Ok(())
    }

    fn run(&self, request: &RunRequest) -> Result<ContainerId> {
        let options = CreateContainerOptions {
            name: request.name.clone(),
            platform: None,
        };
        let created = self
            .block_on(
                self.docker
                    .create_container(Some(options), container_config(request)),
            )
            .map_err(|e| engine_error("create", e))?;
        for warning in &created.warnings {
            tracing::warn!(container = %request.name, %warning, "engine warning");
        }
        self.block_on(
            self.docker
                .start_container(&created.id, None::<StartContainerOptions<String>>),
        )
        .map_err(|e| engine_error("start", e))?;
        Ok(ContainerId::new(created.id))
    }

    fn inspect(&self, id: &ContainerId) -> Result<ContainerInspection> {
        let details = self
            .block_on(
                self.docker
                    .inspect_container(id.as_str(), None::<InspectContainerOptions>),
            )
            .map_err(|e| lookup_error("inspect", "container", id.as_str(), e))?;
        Ok(inspection_from(details, id))
    }

    fn logs(&self, id: &ContainerId) -> Result<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: "all".into(),
            ..LogsOptions::default()
        };
        let chunks: Vec<LogOutput> = self
            .block_on(self.docker.logs(id.as_str(), Some(options)).try_collect())
            .map_err(|e| lookup_error("logs", "container", id.as_str(), e))?;
        Ok(chunks.iter().map(ToString::to_string).collect())
    }

    fn remove(&self, id: &ContainerId, force: bool, volumes: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            v: volumes,
            ..RemoveContainerOptions::default()
        };
        self.block_on(self.docker.remove_container(id.as_str(), Some(options)))
            .map_err(|e| lookup_error("rm", "container", id.as_str(), e))
    }

    fn find_network(&self, name: &str) -> Result<Option<NetworkInfo>> {
        let options = ListNetworksOptions {
            filters: HashMap::from([("name".to_string(), vec![name.to_string()])]),
        };
        let networks = self
            .block_on(self.docker.list_networks(Some(options)))
            .map_err(|e| engine_error("network list", e))?;
        // The name filter also matches substrings.
        Ok(networks
            .into_iter()
            .find(|n| n.name.as_deref() == Some(name))
            .map(network_info))
    }

    fn create_network(&self, request: &NetworkCreateRequest) -> Result<NetworkInfo> {
        let options = CreateNetworkOptions {
            name: request.name.clone(),
            driver: request.driver.clone(),
            attachable: request.attachable,
            enable_ipv6: request.enable_ipv6,
            labels: request.labels.clone().into_iter().collect(),
            ..CreateNetworkOptions::default()
        };
        let created = self
            .block_on(self.docker.create_network(options))
            .map_err(|e| engine_error("network create", e))?;
        Ok(NetworkInfo {
            id: NetworkId::new(created.id),
            name: request.name.clone(),
            driver: request.driver.clone(),
        })
    }

    fn remove_network(&self, name: &str) -> Result<()> {
        self.block_on(self.docker.remove_network(name))
            .map_err(|e| lookup_error("network rm", "network", name, e))
    }

    fn list_labelled_containers(&self, label: &str) -> Result<Vec<ContainerId>> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([("label".to_string(), vec![label.to_string()])]),
            ..ListContainersOptions::default()
        };
        let containers = self
            .block_on(self.docker.list_containers(Some(options)))
            .map_err(|e| engine_error("ps", e))?;
        Ok(containers
            .into_iter()
            .filter_map(|c| c.id)
            .map(ContainerId::new)
            .collect())
    }
}

/// Maps a failed engine call. Transport failures mean the engine is
/// unreachable.
fn engine_error(operation: &'static str, err: DockerError) -> TestComposeError {
    match &err {
        DockerError::DockerResponseServerError { message, .. } => TestComposeError::Runtime {
            operation,
            message: message.clone(),
        },
        DockerError::SocketNotFoundError(_)
        | DockerError::IOError { .. }
        | DockerError::HyperResponseError { .. }
        | DockerError::RequestTimeoutError => TestComposeError::RuntimeUnavailable {
            message: format!("{operation}: {err}"),
        },
        _ => TestComposeError::Runtime {
            operation,
            message: err.to_string(),
        },
    }
}

/// Like [`engine_error`], with a 404 reported as [`TestComposeError::NotFound`].
fn lookup_error(
    operation: &'static str,
    kind: &'static str,
    id: &str,
    err: DockerError,
) -> TestComposeError {
    if matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    ) {
        TestComposeError::NotFound {
            kind,
            id: id.to_string(),
        }
    } else {
        engine_error(operation, err)
    }
}

fn port_key(container_port: u16) -> String {
    format!("{container_port}/tcp")
}

/// Builds the create-container body for `request`.
fn container_config(request: &RunRequest) -> Config<String> {
    let exposed_ports = request
        .ports
        .iter()
        .map(|p| (port_key(p.container), HashMap::new()))
        .collect();
    let port_bindings = request
        .ports
        .iter()
        .map(|p| {
            let binding = PortBinding {
                host_ip: None,
                host_port: Some(p.host.map_or_else(String::new, |h| h.to_string())),
            };
            (port_key(p.container), Some(vec![binding]))
        })
        .collect();
    let binds: Vec<String> = request
        .volumes
        .iter()
        .map(|v| format!("{}:{}:{}", v.host_binding(), v.container, v.mode.as_str()))
        .collect();

    // Aliases are only accepted on user-defined networks, and the host
    // network rejects a hostname.
    let networking_config = (!constants::is_permanent_network(&request.network)).then(|| {
        NetworkingConfig {
            endpoints_config: HashMap::from([(
                request.network.clone(),
                EndpointSettings {
                    aliases: Some(vec![request.hostname.clone()]),
                    ..EndpointSettings::default()
                },
            )]),
        }
    });
    let hostname = (request.network != "host").then(|| request.hostname.clone());

    Config {
        image: Some(request.image.clone()),
        hostname,
        env: Some(
            request
                .environment
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect(),
        ),
        labels: Some(request.labels.clone().into_iter().collect()),
        cmd: request.command.as_deref().map(split_command),
        entrypoint: request.entrypoint.as_deref().map(split_command),
        exposed_ports: Some(exposed_ports),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            network_mode: Some(request.network.clone()),
            binds: (!binds.is_empty()).then_some(binds),
            ..HostConfig::default()
        }),
        networking_config,
        ..Config::default()
    }
}

fn inspection_from(details: ContainerInspectResponse, requested: &ContainerId) -> ContainerInspection {
    let state = details.state.unwrap_or_default();
    let settings = details.network_settings.unwrap_or_default();
    ContainerInspection {
        id: details
            .id
            .map_or_else(|| requested.clone(), ContainerId::new),
        status: state.status.map(|s| s.to_string()).unwrap_or_default(),
        exit_code: state.exit_code.unwrap_or_default(),
        ports: settings.ports.map(raw_bindings).unwrap_or_default(),
        networks: settings
            .networks
            .map(|n| n.into_keys().collect())
            .unwrap_or_default(),
    }
}

fn raw_bindings(ports: HashMap<String, Option<Vec<PortBinding>>>) -> RawPortBindings {
    ports
        .into_iter()
        .map(|(key, bindings)| {
            let bindings = bindings.map(|list| {
                list.into_iter()
                    .map(|b| HostBinding {
                        host_ip: b.host_ip.unwrap_or_default(),
                        host_port: b.host_port.unwrap_or_default(),
                    })
                    .collect()
            });
            (key, bindings)
        })
        .collect()
}

fn network_info(network: Network) -> NetworkInfo {
    NetworkInfo {
        id: NetworkId::new(network.id.unwrap_or_default()),
        name: network.name.unwrap_or_default(),
        driver: network.driver.unwrap_or_default(),
    }
}

/// Splits a command line on whitespace, keeping quoted runs together.
fn split_command(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;
    for c in command.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
