//! Services that are up, in start order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use testcompose_compose::resolver::ResolutionScope;

use crate::container::ServiceContainer;

/// A service that passed its health gates.
#[derive(Debug, Clone)]
pub struct RunningService {
    /// Position in the start order.
    pub rank: usize,
    /// Service name.
    pub name: String,
    /// Environment after placeholder substitution.
    pub environment: BTreeMap<String, String>,
    /// The container backing it.
    pub container: ServiceContainer,
    /// When it became ready.
    pub started_at: DateTime<Utc>,
}

impl RunningService {
    /// Host port published for `container_port`.
    #[must_use]
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.container.ports().host_port(container_port)
    }
}

/// Running services, kept in rank order.
///
/// Later services resolve their placeholders against this registry, so
/// it only ever holds services that are already ready.
#[derive(Debug, Default)]
pub struct Registry {
    services: Vec<RunningService>,
}

impl Registry {
    /// Looks up a running service by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RunningService> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Host port of `container_port` on service `name`.
    #[must_use]
    pub fn host_port(&self, name: &str, container_port: u16) -> Option<u16> {
        self.get(name).and_then(|s| s.host_port(container_port))
    }

    /// Iterates services in rank order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RunningService> {
        self.services.iter()
    }

    /// Names in rank order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }

    /// Number of running services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns whether nothing is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub(crate) fn push(&mut self, service: RunningService) {
        self.services.push(service);
    }

    /// Removes the highest-ranked service.
    pub(crate) fn pop(&mut self) -> Option<RunningService> {
        self.services.pop()
    }
}

impl ResolutionScope for Registry {
    fn environment(&self, service: &str) -> Option<&BTreeMap<String, String>> {
        self.get(service).map(|s| &s.environment)
    }

    fn host_port(&self, service: &str, container_port: u16) -> Option<u16> {
        Self::host_port(self, service, container_port)
    }
}
