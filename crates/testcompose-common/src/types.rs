//! Domain primitive types used across the testcompose workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier assigned to a container by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the short form (first 12 characters) used in log output.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned to a network by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(String);

impl NetworkId {
    /// Creates a new network ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one orchestrator run.
///
/// Used to name the random network, to prefix container names, and as
/// the label value that lets teardown find leftover containers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Generates a fresh run identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Creates a run identifier from a fixed value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the network created for this run.
    #[must_use]
    pub fn network_name(&self) -> String {
        format!("{}_network", self.0)
    }

    /// Name given to the container of `service` in this run.
    #[must_use]
    pub fn container_name(&self, service: &str) -> String {
        format!("{}_{service}", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a service container.
///
/// ```text
/// Created -> Starting -> Running -> HealthChecking -> Ready
///               |                        |
///               v                        v
///             Failed                  Stopping -> Removed
/// ```
///
/// Every non-terminal state may also move to `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    /// Launch parameters are built, nothing exists in the runtime yet.
    Created,
    /// The run request has been issued.
    Starting,
    /// The runtime reports the container as running.
    Running,
    /// Health gates are being evaluated.
    HealthChecking,
    /// All health gates passed.
    Ready,
    /// The run request failed.
    Failed,
    /// Removal has been requested.
    Stopping,
    /// The container is gone.
    Removed,
}

impl ContainerState {
    /// Returns whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Starting)
                | (Self::Starting, Self::Running | Self::Failed)
                | (Self::Running, Self::HealthChecking)
                | (Self::HealthChecking, Self::Ready)
                | (
                    Self::Created
                        | Self::Starting
                        | Self::Running
                        | Self::HealthChecking
                        | Self::Ready
                        | Self::Failed,
                    Self::Stopping
                )
                | (Self::Stopping, Self::Removed)
        )
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Removed)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::HealthChecking => write!(f, "health-checking"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
            Self::Stopping => write!(f, "stopping"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        let path = [
            ContainerState::Created,
            ContainerState::Starting,
            ContainerState::Running,
            ContainerState::HealthChecking,
            ContainerState::Ready,
            ContainerState::Stopping,
            ContainerState::Removed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn failed_start_can_only_be_stopped() {
        assert!(ContainerState::Starting.can_transition_to(ContainerState::Failed));
        assert!(ContainerState::Failed.can_transition_to(ContainerState::Stopping));
        assert!(!ContainerState::Failed.can_transition_to(ContainerState::Running));
    }

    #[test]
    fn removed_is_terminal() {
        assert!(ContainerState::Removed.is_terminal());
        assert!(!ContainerState::Removed.can_transition_to(ContainerState::Stopping));
    }

    #[test]
    fn ready_cannot_skip_back_to_running() {
        assert!(!ContainerState::Ready.can_transition_to(ContainerState::Running));
        assert!(!ContainerState::Created.can_transition_to(ContainerState::Ready));
    }

    #[test]
    fn run_id_derives_names() {
        let run = RunId::new("abc123");
        assert_eq!(run.network_name(), "abc123_network");
        assert_eq!(run.container_name("db"), "abc123_db");
    }

    #[test]
    fn generated_run_ids_differ() {
        assert_ne!(RunId::generate(), RunId::generate());
    }

    #[test]
    fn short_container_id_truncates() {
        let id = ContainerId::new("0123456789abcdef");
        assert_eq!(id.short(), "0123456789ab");
        assert_eq!(ContainerId::new("abc").short(), "abc");
    }
}
