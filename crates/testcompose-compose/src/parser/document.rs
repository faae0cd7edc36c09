//! Serde model of a YAML config document.
//!
//! Mirrors the file layout one-to-one; conversion into validated
//! [`ServiceDescriptor`]s happens in [`super::parse_config`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use testcompose_common::config::NetworkOptions;
use testcompose_common::constants;

use crate::service::{VolumeMode, VolumeSource};

/// Root node of a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Network selection.
    #[serde(default, skip_serializing_if = "is_default_network")]
    pub network: NetworkOptions,
    /// Declared services.
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

/// A scalar that YAML may spell as a string, number, or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One entry of the `services` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Service name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Command override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Entrypoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    /// Exposed port specs.
    #[serde(default)]
    pub exposed_ports: Vec<Scalar>,
    /// Environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, Scalar>,
    /// Dependencies.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Volume mounts.
    #[serde(default)]
    pub volumes: Vec<VolumeEntry>,
    /// Log-pattern gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_wait_parameters: Option<LogWaitEntry>,
    /// HTTP gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_wait_parameters: Option<HttpWaitEntry>,
    /// HTTPS gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_wait_parameters: Option<HttpWaitEntry>,
}

/// A volume mount entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeEntry {
    /// Host path or volume name.
    pub host: String,
    /// Mount point inside the container.
    pub container: String,
    /// Access mode (`ro` or `rw`).
    #[serde(default)]
    pub mode: VolumeMode,
    /// Host side kind (`filesystem` or `dockervolume`).
    #[serde(default)]
    pub source: VolumeSource,
}

/// Log-pattern gate entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogWaitEntry {
    /// Pattern searched in the logs.
    pub log_line_regex: String,
    /// Bound on the wait in milliseconds.
    #[serde(default = "default_log_timeout")]
    pub wait_timeout_ms: u64,
    /// Delay between log reads in milliseconds.
    #[serde(default = "default_log_poll")]
    pub poll_interval_ms: u64,
}

/// HTTP/HTTPS gate entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpWaitEntry {
    /// Container port to probe.
    pub http_port: u16,
    /// Expected status code.
    #[serde(default = "default_status")]
    pub response_status_code: u16,
    /// Request path.
    #[serde(default = "default_endpoint")]
    pub end_point: String,
    /// Delay before each attempt in milliseconds.
    #[serde(default = "default_startup_delay")]
    pub startup_delay_time_ms: u64,
    /// Probe with TLS.
    #[serde(default)]
    pub use_https: bool,
}

fn is_default_network(options: &NetworkOptions) -> bool {
    *options == NetworkOptions::default()
}

const fn default_log_timeout() -> u64 {
    constants::DEFAULT_LOG_WAIT_TIMEOUT_MS
}

const fn default_log_poll() -> u64 {
    constants::DEFAULT_LOG_POLL_INTERVAL_MS
}

const fn default_status() -> u16 {
    constants::DEFAULT_HTTP_STATUS
}

fn default_endpoint() -> String {
    constants::DEFAULT_HTTP_ENDPOINT.to_string()
}

const fn default_startup_delay() -> u64 {
    constants::DEFAULT_HTTP_STARTUP_DELAY_MS
}
