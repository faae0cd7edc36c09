//! # testcompose-sdk
//!
//! Public SDK for using testcompose as a Rust library.
//!
//! Provides three main entry points:
//! - [`ServiceBuilder`](builder::ServiceBuilder): Consuming builder for service descriptors.
//! - [`TestEnvironment`](environment::TestEnvironment): Scoped guard that starts a set of
//!   services and tears them down exactly once.
//! - [`GraphResolver`](graph_resolver::GraphResolver): Loads a config file and reports the
//!   start order without touching a container runtime.
//!
//! # Example
//!
//! ```rust,no_run
//! use testcompose_compose::service::ServiceSet;
//! use testcompose_runtime::backend::detect_runtime;
//! use testcompose_runtime::engine::Engine;
//! use testcompose_sdk::builder::ServiceBuilder;
//! use testcompose_sdk::environment::TestEnvironment;
//!
//! # fn main() -> testcompose_common::error::Result<()> {
//! let db = ServiceBuilder::new("db")
//!     .image("postgres:15")
//!     .expose("5432")?
//!     .env("POSTGRES_PASSWORD", "secret")
//!     .build()?;
//! let app = ServiceBuilder::new("app")
//!     .image("my-app:latest")
//!     .expose("8080")?
//!     .env("DB_HOST", "${db.container_hostname}")
//!     .depends_on("db")
//!     .build()?;
//!
//! let engine = Engine::new(detect_runtime()?)?;
//! let env = TestEnvironment::start(engine, &ServiceSet::new(vec![db, app])?)?;
//! let port = env.host_port("app", 8080);
//! # let _ = port;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod builder;
pub mod environment;
pub mod graph_resolver;
