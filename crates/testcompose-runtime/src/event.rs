//! Lifecycle observation.
//!
//! The [`Engine`](crate::engine::Engine) reports progress through a
//! [`LifecycleObserver`] handed to it at construction instead of a
//! process-wide logger.

use std::sync::Mutex;

use testcompose_common::types::ContainerId;

/// A step of a run as seen from outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The shared network is ready.
    NetworkReady {
        /// Network name.
        name: String,
        /// Whether this run created it.
        created: bool,
    },
    /// A container is about to be started.
    ServiceStarting {
        /// Service name.
        service: String,
        /// Rank in the start order.
        rank: usize,
    },
    /// A service passed its health gates.
    ServiceReady {
        /// Service name.
        service: String,
        /// Container identifier.
        container: ContainerId,
    },
    /// A service failed to start or become healthy.
    ServiceFailed {
        /// Service name.
        service: String,
        /// Rendered error.
        reason: String,
    },
    /// A service container was removed.
    ServiceStopped {
        /// Service name.
        service: String,
    },
    /// The shared network was removed.
    NetworkRemoved {
        /// Network name.
        name: String,
    },
    /// A labelled container left behind by the run was removed.
    OrphanReaped {
        /// Container identifier.
        container: ContainerId,
    },
}

/// Receives lifecycle events.
pub trait LifecycleObserver: Send + Sync {
    /// Called once per event, in order.
    fn on_event(&self, event: &LifecycleEvent);
}

/// Forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::NetworkReady { name, created } => {
                tracing::info!(network = %name, created, "network ready");
            }
            LifecycleEvent::ServiceStarting { service, rank } => {
                tracing::info!(service = %service, rank, "starting service");
            }
            LifecycleEvent::ServiceReady { service, container } => {
                tracing::info!(service = %service, id = %container.short(), "service ready");
            }
            LifecycleEvent::ServiceFailed { service, reason } => {
                tracing::error!(service = %service, %reason, "service failed");
            }
            LifecycleEvent::ServiceStopped { service } => {
                tracing::info!(service = %service, "service stopped");
            }
            LifecycleEvent::NetworkRemoved { name } => {
                tracing::info!(network = %name, "network removed");
            }
            LifecycleEvent::OrphanReaped { container } => {
                tracing::warn!(id = %container.short(), "removed orphaned container");
            }
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_event(&self, event: &LifecycleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
