//! Static validation of service descriptors.
//!
//! Checks for empty sets, duplicate names, self-dependencies, and
//! malformed health-gate or volume parameters before anything is ranked
//! or started.

use std::collections::HashSet;

use testcompose_common::error::{Result, TestComposeError};

use crate::service::ServiceDescriptor;

/// Validates a list of descriptors for semantic correctness.
///
/// # Checks performed
///
/// 1. At least one service is declared.
/// 2. Every service has a non-empty name and image.
/// 3. No duplicate service names.
/// 4. No service depends on itself.
/// 5. Log-wait patterns compile and intervals are non-zero.
/// 6. HTTP/HTTPS wait ports are exposed by the service.
/// 7. Volume host and container paths are non-empty.
///
/// Whether dependencies name declared services, and whether they form a
/// cycle, is decided by [`rank_services`](crate::graph::rank_services).
///
/// # Errors
///
/// Returns an error if any check fails.
pub fn validate(services: &[ServiceDescriptor]) -> Result<()> {
    tracing::debug!(count = services.len(), "validating service descriptors");
    if services.is_empty() {
        return Err(TestComposeError::EmptyServiceSet);
    }
    check_required_fields(services)?;
    check_duplicate_names(services)?;
    check_self_dependency(services)?;
    for service in services {
        check_log_wait(service)?;
        check_http_waits(service)?;
        check_volumes(service)?;
    }
    Ok(())
}

fn check_required_fields(services: &[ServiceDescriptor]) -> Result<()> {
    for service in services {
        if service.name.trim().is_empty() {
            return Err(TestComposeError::Config {
                message: "service name is required".into(),
            });
        }
        if service.image.trim().is_empty() {
            return Err(TestComposeError::Config {
                message: format!("service \"{}\" has no image", service.name),
            });
        }
    }
    Ok(())
}

fn check_duplicate_names(services: &[ServiceDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for service in services {
        if !seen.insert(service.name.as_str()) {
            return Err(TestComposeError::DuplicateService {
                service: service.name.clone(),
            });
        }
    }
    Ok(())
}

fn check_self_dependency(services: &[ServiceDescriptor]) -> Result<()> {
    match services.iter().find(|s| s.depends_on.contains(&s.name)) {
        Some(service) => Err(TestComposeError::SelfDependency {
            service: service.name.clone(),
        }),
        None => Ok(()),
    }
}

fn check_log_wait(service: &ServiceDescriptor) -> Result<()> {
    let Some(wait) = &service.log_wait else {
        return Ok(());
    };
    if wait.regex.is_empty() {
        return Err(config(service, "log_line_regex must be set"));
    }
    if let Err(e) = wait.pattern() {
        return Err(config(service, &format!("invalid log_line_regex: {e}")));
    }
    if wait.poll_interval.is_zero() {
        return Err(config(service, "log poll interval must be positive"));
    }
    Ok(())
}

fn check_http_waits(service: &ServiceDescriptor) -> Result<()> {
    for wait in service.http_gates() {
        if wait.port == 0 {
            return Err(config(service, "http wait port must be non-zero"));
        }
        if !service.exposed_ports.iter().any(|p| p.container == wait.port) {
            return Err(config(
                service,
                &format!("http wait port {} is not an exposed port", wait.port),
            ));
        }
    }
    Ok(())
}

fn check_volumes(service: &ServiceDescriptor) -> Result<()> {
    for volume in &service.volumes {
        if volume.host.trim().is_empty() || volume.container.trim().is_empty() {
            return Err(config(service, "volume host and container paths must be set"));
        }
    }
    Ok(())
}

fn config(service: &ServiceDescriptor, reason: &str) -> TestComposeError {
    TestComposeError::Config {
        message: format!("service \"{}\": {reason}", service.name),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::port::PortSpec;
    use crate::service::{HttpWaitParameters, LogWaitParameters, VolumeMount};

    fn make_service(name: &str, image: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(name, image)
    }

    #[test]
    fn validate_empty_list_fails() {
        let err = validate(&[]).unwrap_err();
        assert!(matches!(err, TestComposeError::EmptyServiceSet));
    }

    #[test]
    fn validate_valid_services_succeeds() {
        let mut api = make_service("api", "api:latest");
        let _ = api.depends_on.insert("db".into());
        assert!(validate(&[api, make_service("db", "postgres:15")]).is_ok());
    }

    #[test]
    fn validate_duplicate_service_name_fails() {
        let err = validate(&[make_service("api", "a"), make_service("api", "b")]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("duplicate service name"), "got: {msg}");
    }

    #[test]
    fn validate_missing_image_fails() {
        let err = validate(&[make_service("broken", "")]).unwrap_err();
        assert!(err.to_string().contains("no image"), "got: {err}");
    }

    #[test]
    fn validate_blank_name_fails() {
        let err = validate(&[make_service(" ", "img")]).unwrap_err();
        assert!(err.to_string().contains("name is required"), "got: {err}");
    }

    #[test]
    fn validate_self_dependency_fails() {
        let mut svc = make_service("loop", "img");
        let _ = svc.depends_on.insert("loop".into());
        let err = validate(&[svc]).unwrap_err();
        assert!(matches!(err, TestComposeError::SelfDependency { ref service } if service == "loop"));
    }

    #[test]
    fn validate_unknown_dependency_is_left_to_ranker() {
        let mut svc = make_service("api", "img");
        let _ = svc.depends_on.insert("ghost".into());
        assert!(validate(&[svc]).is_ok());
    }

    #[test]
    fn validate_bad_log_regex_fails() {
        let mut svc = make_service("api", "img");
        svc.log_wait = Some(LogWaitParameters::new("(unclosed"));
        let err = validate(&[svc]).unwrap_err();
        assert!(err.to_string().contains("invalid log_line_regex"), "got: {err}");
    }

    #[test]
    fn validate_zero_poll_interval_fails() {
        let mut svc = make_service("api", "img");
        let mut wait = LogWaitParameters::new("ready");
        wait.poll_interval = Duration::ZERO;
        svc.log_wait = Some(wait);
        assert!(validate(&[svc]).is_err());
    }

    #[test]
    fn validate_http_port_must_be_exposed() {
        let mut svc = make_service("api", "img");
        svc.http_wait = Some(HttpWaitParameters::new(8080));
        let err = validate(std::slice::from_ref(&svc)).unwrap_err();
        assert!(err.to_string().contains("not an exposed port"), "got: {err}");

        svc.exposed_ports.push(PortSpec::any(8080));
        assert!(validate(&[svc]).is_ok());
    }

    #[test]
    fn validate_empty_volume_path_fails() {
        let mut svc = make_service("api", "img");
        svc.volumes.push(VolumeMount {
            host: String::new(),
            container: "/data".into(),
            mode: crate::service::VolumeMode::ReadOnly,
            source: crate::service::VolumeSource::DockerVolume,
        });
        assert!(validate(&[svc]).is_err());
    }
}
