//! Consuming builder for service descriptors.

use std::time::Duration;

use testcompose_common::error::{Result, TestComposeError};
use testcompose_compose::port::PortSpec;
use testcompose_compose::service::{
    HttpWaitParameters, LogWaitParameters, ServiceDescriptor, VolumeMode, VolumeMount,
    VolumeSource,
};

/// Builder for one service descriptor.
///
/// Every step takes the builder by value and returns it, so no two
/// descriptors ever share a collection.
#[derive(Debug, Clone)]
pub struct ServiceBuilder {
    descriptor: ServiceDescriptor,
}

impl ServiceBuilder {
    /// Creates a builder for the service `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: ServiceDescriptor::new(name, String::new()),
        }
    }

    /// Sets the image reference.
    #[must_use]
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.descriptor.image = image.into();
        self
    }

    /// Overrides the container command.
    #[must_use]
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.descriptor.command = Some(command.into());
        self
    }

    /// Overrides the container entrypoint.
    #[must_use]
    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.descriptor.entrypoint = Some(entrypoint.into());
        self
    }

    /// Exposes ports given as `"8080"`, `"9000-9002"` or `"8081:80"`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed port spec.
    pub fn expose(mut self, spec: &str) -> Result<Self> {
        self.descriptor.exposed_ports.extend(PortSpec::parse_list(spec)?);
        Ok(self)
    }

    /// Exposes one already-parsed port.
    #[must_use]
    pub fn port(mut self, port: PortSpec) -> Self {
        self.descriptor.exposed_ports.push(port);
        self
    }

    /// Adds an environment variable; the value may hold placeholders.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.descriptor.environment.insert(key.into(), value.into());
        self
    }

    /// Mounts a host path.
    #[must_use]
    pub fn bind(
        mut self,
        host: impl Into<String>,
        container: impl Into<String>,
        mode: VolumeMode,
    ) -> Self {
        self.descriptor.volumes.push(VolumeMount {
            host: host.into(),
            container: container.into(),
            mode,
            source: VolumeSource::Filesystem,
        });
        self
    }

    /// Mounts a named runtime volume.
    #[must_use]
    pub fn volume(
        mut self,
        name: impl Into<String>,
        container: impl Into<String>,
        mode: VolumeMode,
    ) -> Self {
        self.descriptor.volumes.push(VolumeMount {
            host: name.into(),
            container: container.into(),
            mode,
            source: VolumeSource::DockerVolume,
        });
        self
    }

    /// Requires `service` to be ready before this one starts.
    #[must_use]
    pub fn depends_on(mut self, service: impl Into<String>) -> Self {
        let _ = self.descriptor.depends_on.insert(service.into());
        self
    }

    /// Waits for `regex` in the container logs.
    #[must_use]
    pub fn wait_for_log(mut self, regex: impl Into<String>, timeout: Duration) -> Self {
        let mut params = LogWaitParameters::new(regex);
        params.timeout = timeout;
        self.descriptor.log_wait = Some(params);
        self
    }

    /// Waits for an HTTP endpoint.
    #[must_use]
    pub fn wait_for_http(mut self, params: HttpWaitParameters) -> Self {
        self.descriptor.http_wait = Some(HttpWaitParameters {
            use_tls: false,
            ..params
        });
        self
    }

    /// Waits for an HTTPS endpoint.
    #[must_use]
    pub fn wait_for_https(mut self, params: HttpWaitParameters) -> Self {
        self.descriptor.https_wait = Some(HttpWaitParameters {
            use_tls: true,
            ..params
        });
        self
    }

    /// Returns the finished descriptor.
    ///
    /// Cross-service checks happen when descriptors are collected into a
    /// `ServiceSet`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or the image is empty.
    pub fn build(self) -> Result<ServiceDescriptor> {
        if self.descriptor.name.trim().is_empty() {
            return Err(TestComposeError::Config {
                message: "service name is required".to_string(),
            });
        }
        if self.descriptor.image.trim().is_empty() {
            return Err(TestComposeError::Config {
                message: format!("service \"{}\": image is required", self.descriptor.name),
            });
        }
        Ok(self.descriptor)
    }
}
