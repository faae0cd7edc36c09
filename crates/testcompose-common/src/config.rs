//! Run options shared by the orchestrator, the SDK, and the CLI.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, TestComposeError};
use crate::types::RunId;

/// How the shared network of a run is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkPolicy {
    /// Create a fresh network named after the run.
    Random,
    /// Use the named network; create it when missing and `auto_create` is set.
    Named {
        /// Network name.
        name: String,
        /// Whether a missing network is created.
        auto_create: bool,
    },
}

impl NetworkPolicy {
    /// Returns the network name this policy targets for `run`.
    #[must_use]
    pub fn network_name(&self, run: &RunId) -> String {
        match self {
            Self::Random => run.network_name(),
            Self::Named { name, .. } => name.clone(),
        }
    }

    /// Returns whether a missing network may be created.
    #[must_use]
    pub const fn creates_missing(&self) -> bool {
        match self {
            Self::Random => true,
            Self::Named { auto_create, .. } => *auto_create,
        }
    }
}

/// Network section of a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkOptions {
    /// Name of the network to attach every container to.
    #[serde(rename = "name")]
    pub network_name: Option<String>,
    /// Create the named network when it does not exist.
    #[serde(rename = "auto_create")]
    pub auto_create_network: bool,
    /// Create a fresh network for this run.
    pub use_random_network: bool,
}

impl NetworkOptions {
    /// Resolves the options into a [`NetworkPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`TestComposeError::ConflictingNetworkOptions`] when a
    /// network name and a random network are both requested, and a
    /// configuration error for a blank network name.
    pub fn policy(&self) -> Result<NetworkPolicy> {
        match (&self.network_name, self.use_random_network) {
            (Some(name), true) => Err(TestComposeError::ConflictingNetworkOptions {
                name: name.clone(),
            }),
            (Some(name), false) if name.trim().is_empty() => Err(TestComposeError::Config {
                message: "network name must not be empty".into(),
            }),
            (Some(name), false) => Ok(NetworkPolicy::Named {
                name: name.clone(),
                auto_create: self.auto_create_network,
            }),
            (None, _) => Ok(NetworkPolicy::Random),
        }
    }

    /// Returns whether a network mode (named or random) is chosen.
    #[must_use]
    pub const fn selects_network(&self) -> bool {
        self.network_name.is_some() || self.use_random_network
    }

    /// Overlays `other` on top of `self`.
    ///
    /// When `other` chooses a network, named or random, its choice
    /// replaces `self`'s entirely. Otherwise only `auto_create_network`
    /// is added.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        if other.selects_network() {
            return other.clone();
        }
        Self {
            auto_create_network: self.auto_create_network || other.auto_create_network,
            ..self.clone()
        }
    }
}

/// Where the container engine is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Engine endpoint (`unix://`, `tcp://`, `http://`, `https://`).
    /// `None` uses `DOCKER_HOST`, then the local socket.
    pub docker_host: Option<String>,
    /// Connect over TLS.
    pub tls: bool,
    /// Directory holding `key.pem`, `cert.pem` and `ca.pem` for TLS.
    /// `None` uses `DOCKER_CERT_PATH`, then `~/.docker`.
    pub cert_path: Option<PathBuf>,
    /// Bound on each engine request.
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            docker_host: None,
            tls: false,
            cert_path: None,
            timeout: Duration::from_secs(constants::DEFAULT_ENGINE_TIMEOUT_SECS),
        }
    }
}

/// Credentials used when pulling images from a private registry.
///
/// Either `username`/`password` are given, or `dockercfg_path` points at
/// a docker `config.json` whose `auths` entry for `registry` is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryLogin {
    /// Account name.
    pub username: Option<String>,
    /// Account password or token.
    pub password: Option<String>,
    /// Account e-mail.
    pub email: Option<String>,
    /// Registry host; `None` is Docker Hub.
    pub registry: Option<String>,
    /// Docker client config file to read stored credentials from.
    pub dockercfg_path: Option<PathBuf>,
}

impl RegistryLogin {
    /// Registry these credentials apply to.
    #[must_use]
    pub fn registry(&self) -> &str {
        self.registry.as_deref().unwrap_or(constants::DEFAULT_REGISTRY)
    }

    /// Checks that the login names a source of credentials.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a username without a password,
    /// a password without a username, or neither credentials nor a
    /// config file.
    pub fn validate(&self) -> Result<()> {
        match (&self.username, &self.password, &self.dockercfg_path) {
            (Some(_), Some(_), _) | (None, None, Some(_)) => Ok(()),
            (Some(user), None, _) => Err(TestComposeError::Config {
                message: format!("registry login for \"{user}\" has no password"),
            }),
            (None, Some(_), _) => Err(TestComposeError::Config {
                message: "registry password given without a username".into(),
            }),
            (None, None, None) => Err(TestComposeError::Config {
                message: "registry login needs a username and password or a dockercfg path"
                    .into(),
            }),
        }
    }
}

/// Options governing one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Network selection.
    pub network: NetworkOptions,
    /// Bound on the wait for a container to report `running`.
    pub running_timeout: Duration,
    /// Delay between `running` state polls.
    pub running_poll_interval: Duration,
    /// Pull images that are missing locally before running them.
    pub pull_images: bool,
    /// Prefix of the labels put on containers and networks.
    pub label_prefix: String,
    /// Engine endpoint.
    pub client: ClientOptions,
    /// Credentials for pulling private images.
    pub registry_login: Option<RegistryLogin>,
}

impl RunOptions {
    /// Label key carrying the run identifier.
    #[must_use]
    pub fn run_label_key(&self) -> String {
        format!("{}.run", self.label_prefix)
    }

    /// Label key carrying the service name.
    #[must_use]
    pub fn service_label_key(&self) -> String {
        format!("{}.service", self.label_prefix)
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            network: NetworkOptions::default(),
            running_timeout: Duration::from_millis(constants::DEFAULT_RUNNING_TIMEOUT_MS),
            running_poll_interval: Duration::from_millis(
                constants::DEFAULT_RUNNING_POLL_INTERVAL_MS,
            ),
            pull_images: true,
            label_prefix: constants::DEFAULT_LABEL_PREFIX.to_string(),
            client: ClientOptions::default(),
            registry_login: None,
        }
    }
}
