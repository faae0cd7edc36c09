//! YAML config loader built on `serde_yaml`.
//!
//! Transforms raw config text into a validated [`ComposeFile`] through
//! deserialization, conversion, and static analysis phases.

pub mod document;
pub mod validator;

use std::path::Path;
use std::time::Duration;

use testcompose_common::config::NetworkOptions;
use testcompose_common::error::{Result, TestComposeError};

use self::document::{ConfigDocument, HttpWaitEntry, ServiceEntry};
use crate::port::PortSpec;
use crate::service::{
    HttpWaitParameters, LogWaitParameters, ServiceDescriptor, ServiceSet, VolumeMount,
};

/// A loaded and validated config file.
#[derive(Debug, Clone)]
pub struct ComposeFile {
    /// Network section.
    pub network: NetworkOptions,
    /// Validated services.
    pub services: ServiceSet,
}

/// Reads and parses a config file from disk.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, and any error of
/// [`parse_config`].
pub fn load_config(path: &Path) -> Result<ComposeFile> {
    tracing::info!(path = %path.display(), "loading config file");
    let content = std::fs::read_to_string(path).map_err(|e| TestComposeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_config(&content)
}

/// Parses config text into a validated [`ComposeFile`].
///
/// # Errors
///
/// Returns a configuration error for empty content, YAML syntax errors,
/// malformed port specs, or any validation failure.
pub fn parse_config(content: &str) -> Result<ComposeFile> {
    if content.trim().is_empty() {
        return Err(TestComposeError::Config {
            message: "config content can not be empty".into(),
        });
    }
    let document: ConfigDocument =
        serde_yaml::from_str(content).map_err(|e| TestComposeError::Config {
            message: format!("malformed config file: {e}"),
        })?;
    from_document(document)
}

/// Converts a deserialized document into a validated [`ComposeFile`].
///
/// # Errors
///
/// Returns a configuration error for malformed port specs or any
/// validation failure.
pub fn from_document(document: ConfigDocument) -> Result<ComposeFile> {
    let descriptors = document
        .services
        .into_iter()
        .map(into_descriptor)
        .collect::<Result<Vec<_>>>()?;
    let services = ServiceSet::new(descriptors)?;
    tracing::debug!(services = services.len(), "config parsed");
    Ok(ComposeFile {
        network: document.network,
        services,
    })
}

fn into_descriptor(entry: ServiceEntry) -> Result<ServiceDescriptor> {
    let ports: Vec<String> = entry.exposed_ports.iter().map(ToString::to_string).collect();
    let exposed_ports = PortSpec::parse_all(&ports).map_err(|e| TestComposeError::Config {
        message: format!("service \"{}\": {e}", entry.name),
    })?;

    Ok(ServiceDescriptor {
        command: entry.command.filter(|c| !c.trim().is_empty()),
        entrypoint: entry.entrypoint.filter(|e| !e.trim().is_empty()),
        exposed_ports,
        environment: entry
            .environment
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect(),
        volumes: entry
            .volumes
            .into_iter()
            .map(|v| VolumeMount {
                host: v.host,
                container: v.container,
                mode: v.mode,
                source: v.source,
            })
            .collect(),
        depends_on: entry.depends_on.into_iter().collect(),
        log_wait: entry.log_wait_parameters.map(|w| LogWaitParameters {
            regex: w.log_line_regex,
            timeout: Duration::from_millis(w.wait_timeout_ms),
            poll_interval: Duration::from_millis(w.poll_interval_ms),
        }),
        http_wait: entry.http_wait_parameters.map(|w| http_wait(w, false)),
        https_wait: entry.https_wait_parameters.map(|w| http_wait(w, true)),
        name: entry.name,
        image: entry.image,
    })
}

fn http_wait(entry: HttpWaitEntry, force_tls: bool) -> HttpWaitParameters {
    HttpWaitParameters {
        port: entry.http_port,
        expected_status: entry.response_status_code,
        path: entry.end_point,
        startup_delay: Duration::from_millis(entry.startup_delay_time_ms),
        use_tls: force_tls || entry.use_https,
    }
}
