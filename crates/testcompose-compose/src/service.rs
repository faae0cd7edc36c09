//! Service descriptors: one declared container under test.
//!
//! Descriptors are parsed once per run and never mutated afterwards; a
//! [`ServiceSet`] only hands out shared references.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use testcompose_common::constants;
use testcompose_common::error::Result;

use crate::port::PortSpec;

/// Access mode of a volume mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeMode {
    /// Read-only.
    #[default]
    #[serde(rename = "ro")]
    ReadOnly,
    /// Read-write.
    #[serde(rename = "rw")]
    ReadWrite,
}

impl VolumeMode {
    /// Mode suffix understood by the runtime.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
        }
    }
}

/// Where the host side of a volume mount comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeSource {
    /// A file or directory on the host.
    #[serde(rename = "filesystem")]
    Filesystem,
    /// A named runtime volume (existing or created on demand).
    #[default]
    #[serde(rename = "dockervolume")]
    DockerVolume,
}

/// A volume mounted into a service container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Host path or volume name.
    pub host: String,
    /// Mount point inside the container.
    pub container: String,
    /// Access mode.
    pub mode: VolumeMode,
    /// Kind of host side.
    pub source: VolumeSource,
}

impl VolumeMount {
    /// Returns the host side as the runtime expects it.
    ///
    /// File-system sources are made absolute against the current
    /// directory; volume names pass through.
    #[must_use]
    pub fn host_binding(&self) -> String {
        match self.source {
            VolumeSource::DockerVolume => self.host.clone(),
            VolumeSource::Filesystem => {
                let path = Path::new(&self.host);
                if path.is_absolute() {
                    self.host.clone()
                } else {
                    std::env::current_dir()
                        .map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
                        .to_string_lossy()
                        .into_owned()
                }
            }
        }
    }
}

/// Log-pattern health gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogWaitParameters {
    /// Regular expression searched in the container logs.
    pub regex: String,
    /// Bound on the whole wait.
    pub timeout: Duration,
    /// Delay between log reads.
    pub poll_interval: Duration,
}

impl LogWaitParameters {
    /// Creates log-wait parameters with the default timeout and interval.
    #[must_use]
    pub fn new(regex: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            timeout: Duration::from_millis(constants::DEFAULT_LOG_WAIT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(constants::DEFAULT_LOG_POLL_INTERVAL_MS),
        }
    }

    /// Compiles the pattern with `^` and `$` anchoring at line boundaries.
    ///
    /// # Errors
    ///
    /// Returns the regex syntax error.
    pub fn pattern(&self) -> std::result::Result<Regex, regex::Error> {
        RegexBuilder::new(&self.regex).multi_line(true).build()
    }
}

/// HTTP or HTTPS health gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpWaitParameters {
    /// Container port the probe targets.
    pub port: u16,
    /// Status code that marks the service healthy.
    pub expected_status: u16,
    /// Request path.
    pub path: String,
    /// Delay before every attempt.
    pub startup_delay: Duration,
    /// Probe with `https://`.
    pub use_tls: bool,
}

impl HttpWaitParameters {
    /// Creates HTTP wait parameters for `port` with defaults for the rest.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            expected_status: constants::DEFAULT_HTTP_STATUS,
            path: constants::DEFAULT_HTTP_ENDPOINT.to_string(),
            startup_delay: Duration::from_millis(constants::DEFAULT_HTTP_STARTUP_DELAY_MS),
            use_tls: false,
        }
    }

    /// URL scheme of the probe.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        if self.use_tls { "https" } else { "http" }
    }

    /// Builds the probe URL for a host address and mapped port.
    ///
    /// A bare `/` path yields no trailing slash.
    #[must_use]
    pub fn url(&self, host: &str, mapped_port: u16) -> String {
        let path = self.path.trim_start_matches('/');
        let url = format!("{}://{host}:{mapped_port}/{path}", self.scheme());
        url.trim_end_matches('/').to_string()
    }
}

/// Declarative description of one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Unique service name; also the container hostname.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Command override.
    pub command: Option<String>,
    /// Entrypoint override.
    pub entrypoint: Option<String>,
    /// Exposed ports, in declaration order.
    pub exposed_ports: Vec<PortSpec>,
    /// Raw environment; values may contain `${container.variable}` tokens.
    pub environment: BTreeMap<String, String>,
    /// Volume mounts.
    pub volumes: Vec<VolumeMount>,
    /// Names of services that must be ready first.
    pub depends_on: BTreeSet<String>,
    /// Optional log-pattern gate.
    pub log_wait: Option<LogWaitParameters>,
    /// Optional HTTP gate.
    pub http_wait: Option<HttpWaitParameters>,
    /// Optional HTTPS gate.
    pub https_wait: Option<HttpWaitParameters>,
}

impl ServiceDescriptor {
    /// Creates a descriptor with only a name and image.
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: None,
            entrypoint: None,
            exposed_ports: Vec::new(),
            environment: BTreeMap::new(),
            volumes: Vec::new(),
            depends_on: BTreeSet::new(),
            log_wait: None,
            http_wait: None,
            https_wait: None,
        }
    }

    /// Returns the configured HTTP and HTTPS gates.
    pub fn http_gates(&self) -> impl Iterator<Item = &HttpWaitParameters> {
        self.http_wait.iter().chain(self.https_wait.iter())
    }
}

/// A validated set of service descriptors keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSet {
    services: BTreeMap<String, ServiceDescriptor>,
}

impl ServiceSet {
    /// Validates `descriptors` and collects them into a set.
    ///
    /// Dependency existence and cycles are left to the ranker.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure; see
    /// [`validator::validate`](crate::parser::validator::validate).
    pub fn new(descriptors: Vec<ServiceDescriptor>) -> Result<Self> {
        crate::parser::validator::validate(&descriptors)?;
        let services = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Ok(Self { services })
    }

    /// Looks up a descriptor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    /// Returns whether a service with that name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Iterates descriptors in lexical name order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values()
    }

    /// Iterates service names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Number of services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_url_strips_duplicate_slashes() {
        let mut wait = HttpWaitParameters::new(8080);
        wait.path = "/ping".into();
        assert_eq!(wait.url("10.0.0.5", 49153), "http://10.0.0.5:49153/ping");
    }

    #[test]
    fn http_url_for_root_has_no_trailing_slash() {
        let wait = HttpWaitParameters::new(8080);
        assert_eq!(wait.url("127.0.0.1", 1), "http://127.0.0.1:1");
    }

    #[test]
    fn log_pattern_anchors_at_line_boundaries() {
        let wait = LogWaitParameters::new("^ready to accept connections$");
        let pattern = wait.pattern().expect("valid");
        assert!(pattern.is_match("booting\nready to accept connections\nlistening\n"));
        assert!(!pattern.is_match("not ready to accept connections yet\n"));
    }

    #[test]
    fn https_gate_uses_tls_scheme() {
        let mut wait = HttpWaitParameters::new(8443);
        wait.use_tls = true;
        assert!(wait.url("h", 2).starts_with("https://"));
    }

    #[test]
    fn docker_volume_binding_is_the_name() {
        let vol = VolumeMount {
            host: "pgdata".into(),
            container: "/var/lib/postgresql/data".into(),
            mode: VolumeMode::ReadWrite,
            source: VolumeSource::DockerVolume,
        };
        assert_eq!(vol.host_binding(), "pgdata");
    }

    #[test]
    fn relative_filesystem_binding_becomes_absolute() {
        let vol = VolumeMount {
            host: "fixtures".into(),
            container: "/data".into(),
            mode: VolumeMode::ReadOnly,
            source: VolumeSource::Filesystem,
        };
        assert!(Path::new(&vol.host_binding()).is_absolute());
    }

    #[test]
    fn service_set_is_keyed_by_name() {
        let set = ServiceSet::new(vec![
            ServiceDescriptor::new("web", "nginx"),
            ServiceDescriptor::new("db", "postgres"),
        ])
        .expect("valid set");
        assert_eq!(set.len(), 2);
        assert!(set.contains("db"));
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["db", "web"]);
    }

    #[test]
    fn http_gates_chain_both_kinds() {
        let mut svc = ServiceDescriptor::new("api", "img");
        svc.http_wait = Some(HttpWaitParameters::new(80));
        svc.https_wait = Some(HttpWaitParameters::new(443));
        assert_eq!(svc.http_gates().count(), 2);
    }
}
