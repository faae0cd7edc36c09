//! # testcompose-runtime
//!
//! Drives containers through a [`ContainerRuntime`](backend::ContainerRuntime):
//! starting them in dependency order on a shared network, gating each on
//! its health checks, and tearing everything down in reverse.
//!
//! - [`engine::Engine`]: the run orchestrator.
//! - [`container::ServiceContainer`]: per-service lifecycle state machine.
//! - [`health`]: log and HTTP wait gates.
//! - [`network`]: shared network creation, reuse, and removal.
//! - [`backend`]: the Docker Engine API runtime and an in-memory runtime.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod container;
pub mod engine;
pub mod event;
pub mod health;
pub mod network;
pub mod ports;
pub mod registry;
