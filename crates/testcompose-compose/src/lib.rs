//! # testcompose-compose
//!
//! Declarative side of a test environment: everything that can be
//! computed before a single container starts.
//!
//! Handles:
//! - **Service**: Immutable service descriptors and validated service sets.
//! - **Port**: Exposed-port specs (`8080`, `49153:8080`, `9000-9002`).
//! - **Parser**: YAML config loading and semantic validation.
//! - **Graph**: Dependency ranking with cycle and unknown-name detection.
//! - **Resolver**: `${container.variable}` placeholder substitution.
//! - **Host**: Free-port allocation and host address discovery.
//! - **Templates**: Config scaffolding for common service combinations.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod graph;
pub mod host;
pub mod parser;
pub mod port;
pub mod resolver;
pub mod service;
pub mod templates;
