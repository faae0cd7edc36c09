//! Scoped test environments.
//!
//! A [`TestEnvironment`] owns a started [`Engine`]. Dropping it tears the
//! run down, whether the test passed, failed or panicked.

use std::collections::BTreeMap;

use testcompose_common::error::Result;
use testcompose_common::types::RunId;
use testcompose_compose::service::ServiceSet;
use testcompose_runtime::engine::Engine;
use testcompose_runtime::registry::{Registry, RunningService};

/// Running services that are torn down when the guard goes out of scope.
#[derive(Debug)]
pub struct TestEnvironment {
    engine: Engine,
    torn_down: bool,
}

impl TestEnvironment {
    /// Starts `services` with `engine` and returns the guard.
    ///
    /// # Errors
    ///
    /// Returns the start error; the engine has already released whatever
    /// it started by then.
    pub fn start(mut engine: Engine, services: &ServiceSet) -> Result<Self> {
        let _ = engine.start(services)?;
        tracing::info!(
            run = %engine.run_id(),
            services = engine.registry().len(),
            "test environment ready"
        );
        Ok(Self {
            engine,
            torn_down: false,
        })
    }

    /// Identifier of the run.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        self.engine.run_id()
    }

    /// Name of the shared network.
    #[must_use]
    pub fn network_name(&self) -> Option<&str> {
        self.engine.network().map(|n| n.name.as_str())
    }

    /// All running services, in start order.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        self.engine.registry()
    }

    /// A running service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&RunningService> {
        self.engine.registry().get(name)
    }

    /// Resolved environment of a running service.
    #[must_use]
    pub fn environment(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        self.service(name).map(|s| &s.environment)
    }

    /// Host port published for `container_port` of service `name`.
    #[must_use]
    pub fn host_port(&self, name: &str, container_port: u16) -> Option<u16> {
        self.engine.registry().host_port(name, container_port)
    }

    /// Stops every service and removes the network. Safe to call twice.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.engine.teardown();
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use testcompose_common::config::RunOptions;
    use testcompose_compose::host::StaticHost;
    use testcompose_runtime::backend::memory::{InMemoryRuntime, RuntimeCall};

    use super::*;
    use crate::builder::ServiceBuilder;

    fn engine(rt: &Arc<InMemoryRuntime>) -> Engine {
        Engine::new(rt.clone())
            .expect("engine")
            .with_host(Arc::new(StaticHost::default()))
            .with_run_id(RunId::new("sdk"))
            .with_options(RunOptions {
                running_timeout: Duration::from_millis(50),
                running_poll_interval: Duration::from_millis(5),
                ..RunOptions::default()
            })
    }

    fn services() -> ServiceSet {
        let db = ServiceBuilder::new("db")
            .image("postgres:15")
            .expose("5432")
            .expect("ports")
            .env("POSTGRES_USER", "admin")
            .build()
            .expect("db");
        let app = ServiceBuilder::new("app")
            .image("my-app")
            .env("DB_HOST", "${db.container_hostname}")
            .env("DB_USER", "${db.postgres_user}")
            .depends_on("db")
            .build()
            .expect("app");
        ServiceSet::new(vec![db, app]).expect("set")
    }

    #[test]
    fn drop_tears_down_once() {
        let rt = Arc::new(InMemoryRuntime::new());
        {
            let env = TestEnvironment::start(engine(&rt), &services()).expect("start");
            assert_eq!(rt.containers().len(), 2);
            assert_eq!(env.network_name(), Some("sdk_network"));
            assert_eq!(
                env.environment("app").map(|e| e["DB_USER"].as_str()),
                Some("admin")
            );
            assert_eq!(env.host_port("db", 5432), Some(32_768));
        }
        assert!(rt.containers().is_empty());
        assert!(rt.network_names().is_empty());
        assert_eq!(rt.count_calls(|c| matches!(c, RuntimeCall::RemoveNetwork(_))), 1);
    }

    #[test]
    fn explicit_teardown_then_drop() {
        let rt = Arc::new(InMemoryRuntime::new());
        let mut env = TestEnvironment::start(engine(&rt), &services()).expect("start");
        env.teardown();
        let calls = rt.calls().len();
        drop(env);
        assert_eq!(rt.calls().len(), calls);
    }

    #[test]
    fn failed_start_leaves_nothing_behind() {
        let rt = Arc::new(InMemoryRuntime::new().unavailable());
        assert!(TestEnvironment::start(engine(&rt), &services()).is_err());
        assert!(rt.containers().is_empty());
    }
}
