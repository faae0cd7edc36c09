//! System-wide constants and defaults.

/// Application name used in CLI output and labels.
pub const APP_NAME: &str = "testcompose";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "testcompose";

/// Default config file looked up by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "testcompose.yaml";

/// Default prefix of the labels put on every container and network.
pub const DEFAULT_LABEL_PREFIX: &str = "testcompose";

/// Container name used in placeholders to refer to the current service.
pub const SELF_PLACEHOLDER: &str = "self";

/// Placeholder variable resolving to a service's hostname.
pub const CONTAINER_HOSTNAME: &str = "container_hostname";

/// Placeholder variable prefix resolving to a host-facing port.
pub const EXTERNAL_PORT: &str = "external_port";

/// Alternate spelling of [`EXTERNAL_PORT`].
pub const HOST_PORT: &str = "hostport";

/// Placeholder variable resolving to the host's reachable address.
pub const CONTAINER_HOST_ADDRESS: &str = "container_host_address";

/// Networks provided by the runtime that are never removed.
pub const PERMANENT_NETWORKS: [&str; 3] = ["bridge", "host", "none"];

/// Default log-wait timeout in milliseconds.
pub const DEFAULT_LOG_WAIT_TIMEOUT_MS: u64 = 60_000;

/// Default log-wait poll interval in milliseconds.
pub const DEFAULT_LOG_POLL_INTERVAL_MS: u64 = 10_000;

/// Default expected HTTP status of a health probe.
pub const DEFAULT_HTTP_STATUS: u16 = 200;

/// Default HTTP health endpoint.
pub const DEFAULT_HTTP_ENDPOINT: &str = "/";

/// Default delay before each HTTP probe attempt in milliseconds.
pub const DEFAULT_HTTP_STARTUP_DELAY_MS: u64 = 20_000;

/// Number of HTTP probe attempts before the gate fails.
pub const HTTP_WAIT_ATTEMPTS: u32 = 3;

/// Per-request timeout of an HTTP probe in milliseconds.
pub const HTTP_PROBE_TIMEOUT_MS: u64 = 10_000;

/// Default bound on the wait for a container to report `running`.
pub const DEFAULT_RUNNING_TIMEOUT_MS: u64 = 40_000;

/// Default delay between `running` state polls in milliseconds.
pub const DEFAULT_RUNNING_POLL_INTERVAL_MS: u64 = 2_000;

/// Default timeout of requests to the container engine in seconds.
pub const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 60;

/// Registry that image references without a registry host resolve to.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Returns whether `name` is a runtime-provided network.
#[must_use]
pub fn is_permanent_network(name: &str) -> bool {
    PERMANENT_NETWORKS.contains(&name)
}
