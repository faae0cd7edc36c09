//! Unified error types for the testcompose workspace.
//!
//! Every fatal condition carries the offending service (or network) name
//! so a failed start-up can be traced back to a single descriptor.

use std::path::PathBuf;

use thiserror::Error;

/// Broad classification of a [`TestComposeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed descriptor, dependency or placeholder problem, or
    /// conflicting options. Never retried.
    Configuration,
    /// The container engine could not be reached.
    RuntimeUnavailable,
    /// A container could not be created or never reached `running`.
    ContainerStart,
    /// A log or HTTP health gate timed out or failed.
    HealthCheck,
    /// Any other runtime command failure.
    Runtime,
    /// Local file-system failure.
    Io,
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum TestComposeError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The descriptor set contains no services.
    #[error("invalid configuration: no services declared")]
    EmptyServiceSet,

    /// Two descriptors share one name.
    #[error("duplicate service name: \"{service}\"")]
    DuplicateService {
        /// The repeated name.
        service: String,
    },

    /// A service lists itself in `depends_on`.
    #[error("service \"{service}\" depends on itself")]
    SelfDependency {
        /// Offending service.
        service: String,
    },

    /// A service depends on a name absent from the descriptor set.
    #[error("invalid dependency: service \"{service}\" depends on undefined {missing:?}")]
    InvalidDependency {
        /// Offending service.
        service: String,
        /// Dependency names that are not declared.
        missing: Vec<String>,
    },

    /// The `depends_on` edges form at least one cycle.
    #[error("cyclic dependency detected between services {services:?}")]
    CyclicDependency {
        /// Every service that takes part in a cycle, sorted.
        services: Vec<String>,
    },

    /// A `${...}` token is not of the form `container.variable`.
    #[error("malformed placeholder \"{placeholder}\" in service \"{service}\"")]
    MalformedPlaceholder {
        /// Service whose environment holds the token.
        service: String,
        /// Raw token content.
        placeholder: String,
    },

    /// A `self` port placeholder names a port the service never exposes.
    #[error("invalid self port reference \"{port}\" in service \"{service}\": not an exposed port")]
    InvalidSelfPortReference {
        /// Service whose environment holds the token.
        service: String,
        /// The referenced container port, as written.
        port: String,
    },

    /// A placeholder names a variable the referenced service does not define.
    #[error("unknown variable reference ${{{container}.{variable}}} in service \"{service}\"")]
    UnknownVariableReference {
        /// Service whose environment holds the token.
        service: String,
        /// Referenced service.
        container: String,
        /// Referenced variable.
        variable: String,
    },

    /// A placeholder names a service that is neither running nor a dependency.
    #[error("service \"{service}\" references \"{referenced}\" which is not running")]
    UnknownServiceReference {
        /// Service whose environment holds the token.
        service: String,
        /// The referenced name.
        referenced: String,
    },

    /// A placeholder refers to the service itself, or to a dependency that
    /// has not been started yet.
    #[error("cyclic self dependency: service \"{service}\" references \"{referenced}\" before it is running")]
    CyclicSelfDependency {
        /// Service whose environment holds the token.
        service: String,
        /// The referenced name.
        referenced: String,
    },

    /// A named network and a random network were both requested.
    #[error("invalid configuration: network name \"{name}\" and random network are mutually exclusive")]
    ConflictingNetworkOptions {
        /// The configured network name.
        name: String,
    },

    /// A named network does not exist and auto-create is off.
    #[error("network not found: {name}")]
    NetworkNotFound {
        /// Network name.
        name: String,
    },

    /// The container engine is not reachable.
    #[error("container runtime unavailable: {message}")]
    RuntimeUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// A runtime command failed.
    #[error("runtime operation `{operation}` failed: {message}")]
    Runtime {
        /// Operation name (`run`, `inspect`, ...).
        operation: &'static str,
        /// Error output of the runtime.
        message: String,
    },

    /// A container could not be started.
    #[error("container for service \"{service}\" failed to start: {message}")]
    ContainerStart {
        /// Offending service.
        service: String,
        /// Description of the failure.
        message: String,
    },

    /// The container exited while a health gate was pending.
    #[error("container for service \"{service}\" exited with status \"{status}\" before becoming ready")]
    ContainerExited {
        /// Offending service.
        service: String,
        /// Last observed container status.
        status: String,
    },

    /// A blocking wait exceeded its bound.
    #[error("service \"{service}\" timed out waiting for {waiting_for} after {elapsed_secs:.3} seconds")]
    Timeout {
        /// Offending service.
        service: String,
        /// What was being waited for.
        waiting_for: &'static str,
        /// Elapsed time in seconds.
        elapsed_secs: f64,
    },

    /// The HTTP/HTTPS health gate never saw the expected status.
    #[error("health check failed for service \"{service}\" on port {port}: {reason}")]
    HealthCheckFailed {
        /// Offending service.
        service: String,
        /// Container port that was probed.
        port: u16,
        /// Last observed outcome.
        reason: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl TestComposeError {
    /// Returns the broad class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::Config { .. }
            | Self::EmptyServiceSet
            | Self::DuplicateService { .. }
            | Self::SelfDependency { .. }
            | Self::InvalidDependency { .. }
            | Self::CyclicDependency { .. }
            | Self::MalformedPlaceholder { .. }
            | Self::InvalidSelfPortReference { .. }
            | Self::UnknownVariableReference { .. }
            | Self::UnknownServiceReference { .. }
            | Self::CyclicSelfDependency { .. }
            | Self::ConflictingNetworkOptions { .. }
            | Self::Serialization { .. } => ErrorKind::Configuration,
            Self::RuntimeUnavailable { .. } => ErrorKind::RuntimeUnavailable,
            Self::ContainerStart { .. } => ErrorKind::ContainerStart,
            Self::ContainerExited { .. }
            | Self::Timeout { .. }
            | Self::HealthCheckFailed { .. } => ErrorKind::HealthCheck,
            Self::Runtime { .. } | Self::NetworkNotFound { .. } | Self::NotFound { .. } => {
                ErrorKind::Runtime
            }
        }
    }

    /// Returns whether the error was raised before any container had to start.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self.kind(), ErrorKind::Configuration)
    }

    /// Wraps an error raised by the runtime while starting `service`.
    ///
    /// Errors that already name a service, and runtime unavailability,
    /// pass through unchanged.
    #[must_use]
    pub fn for_service_start(self, service: &str) -> Self {
        match self {
            Self::Runtime { message, .. } => Self::ContainerStart {
                service: service.to_string(),
                message,
            },
            Self::Io { path, source } => Self::ContainerStart {
                service: service.to_string(),
                message: format!("{}: {source}", path.display()),
            },
            other => other,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, TestComposeError>;
