//! Formatted output helpers for CLI commands.
//!
//! Provides consistent port, health-gate and duration formatting plus
//! the ANSI styles shared by the commands.

use std::time::Duration;

use testcompose_compose::port::PortSpec;
use testcompose_compose::service::ServiceDescriptor;

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const CYAN: &str = "\x1b[36m";
pub const YELLOW: &str = "\x1b[33m";
pub const RESET: &str = "\x1b[0m";

/// Formats container → host port pairs as `8080->32768, 5432->15432`.
#[must_use]
pub fn format_port_map(ports: impl Iterator<Item = (u16, u16)>) -> String {
    let pairs: Vec<String> = ports
        .map(|(container, host)| format!("{container}->{host}"))
        .collect();
    if pairs.is_empty() {
        "-".to_string()
    } else {
        pairs.join(", ")
    }
}

/// Formats declared ports as written in a config file.
#[must_use]
pub fn format_exposed(ports: &[PortSpec]) -> String {
    if ports.is_empty() {
        return "-".to_string();
    }
    ports
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Formats a duration in seconds with one decimal (e.g., "2.5s").
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

/// One line per health gate of `descriptor`.
#[must_use]
pub fn describe_gates(descriptor: &ServiceDescriptor) -> Vec<String> {
    let mut gates = Vec::new();
    if let Some(log) = &descriptor.log_wait {
        gates.push(format!(
            "log /{}/ within {}",
            log.regex,
            format_duration(log.timeout)
        ));
    }
    for http in descriptor.http_gates() {
        gates.push(format!(
            "{} :{}{} -> {} ({} attempts, {} apart)",
            http.scheme(),
            http.port,
            http.path,
            http.expected_status,
            testcompose_common::constants::HTTP_WAIT_ATTEMPTS,
            format_duration(http.startup_delay)
        ));
    }
    gates
}
