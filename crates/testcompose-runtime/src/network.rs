//! Shared network management.
//!
//! Every container of a run joins one network. An existing network of
//! the requested name is reused; a missing one is created only when the
//! policy allows it.

use std::collections::BTreeMap;

use testcompose_common::config::NetworkPolicy;
use testcompose_common::constants;
use testcompose_common::error::{Result, TestComposeError};
use testcompose_common::types::NetworkId;

use crate::backend::{ContainerRuntime, NetworkCreateRequest};

/// The network a run is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    /// Runtime identifier.
    pub id: NetworkId,
    /// Network name.
    pub name: String,
    /// Whether this run created it.
    pub created: bool,
}

/// Returns the network `name`, reusing it if present.
///
/// # Errors
///
/// Returns [`TestComposeError::NetworkNotFound`] if it is missing and
/// `policy` does not create missing networks, or any runtime error.
pub fn ensure_network(
    runtime: &dyn ContainerRuntime,
    policy: &NetworkPolicy,
    name: &str,
    labels: BTreeMap<String, String>,
) -> Result<NetworkHandle> {
    if let Some(existing) = runtime.find_network(name)? {
        tracing::debug!(network = %name, id = %existing.id, "reusing network");
        return Ok(NetworkHandle {
            id: existing.id,
            name: existing.name,
            created: false,
        });
    }
    if !policy.creates_missing() {
        return Err(TestComposeError::NetworkNotFound {
            name: name.to_string(),
        });
    }
    let info = runtime.create_network(&NetworkCreateRequest::bridge(name, labels))?;
    tracing::info!(network = %name, id = %info.id, "network created");
    Ok(NetworkHandle {
        id: info.id,
        name: info.name,
        created: true,
    })
}

/// Removes the network unless it is one of the runtime's permanent ones.
///
/// Returns whether the network was removed. Failures are logged.
pub fn remove_network(runtime: &dyn ContainerRuntime, handle: &NetworkHandle) -> bool {
    if constants::is_permanent_network(&handle.name) {
        tracing::debug!(network = %handle.name, "keeping permanent network");
        return false;
    }
    match runtime.remove_network(&handle.name) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(network = %handle.name, error = %e, "failed to remove network");
            false
        }
    }
}
