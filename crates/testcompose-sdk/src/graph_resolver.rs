//! Start-order planning for config files.
//!
//! Wraps `testcompose-compose`'s loader and ranker into a high-level API
//! that never touches a container runtime.

use std::path::Path;

use testcompose_common::config::NetworkOptions;
use testcompose_common::error::Result;
use testcompose_compose::graph::{self, RankedServices};
use testcompose_compose::parser;
use testcompose_compose::service::{ServiceDescriptor, ServiceSet};

/// A validated config file together with its start order.
#[derive(Debug, Clone)]
pub struct GraphResolver {
    network: NetworkOptions,
    services: ServiceSet,
    ranked: RankedServices,
}

impl GraphResolver {
    /// Loads, validates and ranks the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// services cannot be ranked.
    pub fn load(path: &Path) -> Result<Self> {
        let file = parser::load_config(path)?;
        Self::from_services(file.network, file.services)
    }

    /// Ranks an already-validated service set.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or cyclic dependencies.
    pub fn from_services(network: NetworkOptions, services: ServiceSet) -> Result<Self> {
        let ranked = graph::rank_services(&services)?;
        tracing::debug!(order = ?ranked.names(), "start order resolved");
        Ok(Self {
            network,
            services,
            ranked,
        })
    }

    /// Service names in start order.
    #[must_use]
    pub fn start_order(&self) -> &[String] {
        self.ranked.names()
    }

    /// Descriptors in start order, with their rank.
    pub fn ranked(&self) -> impl Iterator<Item = (usize, &ServiceDescriptor)> {
        self.ranked
            .iter()
            .filter_map(|(rank, name)| self.services.get(name).map(|d| (rank, d)))
    }

    /// Network section of the file.
    #[must_use]
    pub const fn network(&self) -> &NetworkOptions {
        &self.network
    }

    /// The validated services.
    #[must_use]
    pub const fn services(&self) -> &ServiceSet {
        &self.services
    }

    /// Gives up the validated services, e.g. to start them.
    #[must_use]
    pub fn into_parts(self) -> (NetworkOptions, ServiceSet) {
        (self.network, self.services)
    }
}
