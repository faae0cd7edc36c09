//! Exposed-port specifications.
//!
//! A service exposes a list of container ports. Each entry is either a
//! bare container port (the runtime picks a free host port), a pinned
//! `host:container` pair, or a `start-end` range that expands into
//! consecutive bare ports.

use std::fmt;

use testcompose_common::error::{Result, TestComposeError};

/// One exposed container port and its optional pinned host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortSpec {
    /// Port inside the container.
    pub container: u16,
    /// Host port bound to it, or `None` for any free port.
    pub host: Option<u16>,
}

impl PortSpec {
    /// A bare container port published on any free host port.
    #[must_use]
    pub const fn any(container: u16) -> Self {
        Self {
            container,
            host: None,
        }
    }

    /// A container port published on a fixed host port.
    #[must_use]
    pub const fn pinned(host: u16, container: u16) -> Self {
        Self {
            container,
            host: Some(host),
        }
    }

    /// Returns a copy pinned to `host`.
    #[must_use]
    pub const fn pin(self, host: u16) -> Self {
        Self::pinned(host, self.container)
    }

    /// Parses one spec entry, expanding ranges.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for non-numeric ports, port `0`,
    /// empty or reversed ranges.
    pub fn parse_list(spec: &str) -> Result<Vec<Self>> {
        let spec = spec.trim();
        if let Some((host, container)) = spec.split_once(':') {
            return Ok(vec![Self::pinned(
                parse_port(host, spec)?,
                parse_port(container, spec)?,
            )]);
        }
        if let Some((start, end)) = spec.split_once('-') {
            let start = parse_port(start, spec)?;
            let end = parse_port(end, spec)?;
            if start > end {
                return Err(invalid(spec, "range start is greater than range end"));
            }
            return Ok((start..=end).map(Self::any).collect());
        }
        Ok(vec![Self::any(parse_port(spec, spec)?)])
    }

    /// Parses every entry of `specs` and concatenates the results.
    ///
    /// # Errors
    ///
    /// Returns the first entry that fails to parse, or a configuration
    /// error when one container port is declared twice.
    pub fn parse_all<S: AsRef<str>>(specs: &[S]) -> Result<Vec<Self>> {
        let mut ports: Vec<Self> = Vec::new();
        for spec in specs {
            for port in Self::parse_list(spec.as_ref())? {
                if ports.iter().any(|p| p.container == port.container) {
                    return Err(invalid(spec.as_ref(), "container port declared twice"));
                }
                ports.push(port);
            }
        }
        Ok(ports)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host {
            Some(host) => write!(f, "{host}:{}", self.container),
            None => write!(f, "{}", self.container),
        }
    }
}

fn parse_port(value: &str, spec: &str) -> Result<u16> {
    match value.trim().parse::<u16>() {
        Ok(0) => Err(invalid(spec, "port 0 is not allowed")),
        Ok(port) => Ok(port),
        Err(_) => Err(invalid(spec, "not a port number")),
    }
}

fn invalid(spec: &str, reason: &str) -> TestComposeError {
    TestComposeError::Config {
        message: format!("invalid exposed port \"{spec}\": {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_port_is_unpinned() {
        assert_eq!(PortSpec::parse_list("8080").unwrap(), vec![PortSpec::any(8080)]);
    }

    #[test]
    fn host_container_pair_is_pinned() {
        assert_eq!(
            PortSpec::parse_list("49153:80").unwrap(),
            vec![PortSpec::pinned(49153, 80)]
        );
    }

    #[test]
    fn range_expands_to_consecutive_bare_ports() {
        let ports = PortSpec::parse_list("9000-9002").unwrap();
        assert_eq!(
            ports,
            vec![PortSpec::any(9000), PortSpec::any(9001), PortSpec::any(9002)]
        );
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = PortSpec::parse_list("9002-9000").unwrap_err();
        assert!(err.to_string().contains("range start"), "got: {err}");
    }

    #[test]
    fn garbage_and_zero_are_rejected() {
        assert!(PortSpec::parse_list("http").is_err());
        assert!(PortSpec::parse_list("0").is_err());
        assert!(PortSpec::parse_list("70000").is_err());
    }

    #[test]
    fn duplicate_container_port_is_rejected() {
        let err = PortSpec::parse_all(&["8080", "1234:8080"]).unwrap_err();
        assert!(err.to_string().contains("declared twice"), "got: {err}");
    }

    #[test]
    fn display_matches_input_form() {
        assert_eq!(PortSpec::any(5432).to_string(), "5432");
        assert_eq!(PortSpec::pinned(1, 2).to_string(), "1:2");
        assert_eq!(PortSpec::any(8080).pin(40000), PortSpec::pinned(40000, 8080));
    }
}
