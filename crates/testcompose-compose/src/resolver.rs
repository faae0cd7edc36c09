//! Placeholder substitution for service environments.
//!
//! Environment values may embed `${container.variable}` tokens. They are
//! resolved right before a service starts, against the services already
//! running (a [`ResolutionScope`]) and the host (a [`HostNetwork`]).
//!
//! | variable                  | `self`                          | other service              |
//! |---------------------------|---------------------------------|----------------------------|
//! | `container_hostname`      | own name                        | that service's name        |
//! | `external_port_<p>`       | host port, pinned on demand     | its mapped host port       |
//! | `hostport_<p>`            | same as `external_port_<p>`     | same as `external_port_<p>`|
//! | `container_host_address`  | host address                    | host address               |
//! | anything else             | error                           | its env var, upper-cased   |
//!
//! `self` and the reserved variable names match in any case.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use testcompose_common::constants;
use testcompose_common::error::{Result, TestComposeError};

use crate::host::HostNetwork;
use crate::port::PortSpec;
use crate::service::ServiceDescriptor;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder regex is valid"));

/// The already-running services a placeholder may refer to.
pub trait ResolutionScope {
    /// Resolved environment of a running service.
    fn environment(&self, service: &str) -> Option<&BTreeMap<String, String>>;

    /// Host port mapped to `container_port` of a running service.
    fn host_port(&self, service: &str, container_port: u16) -> Option<u16>;
}

/// A scope of environments only; no port mappings are known.
impl ResolutionScope for BTreeMap<String, BTreeMap<String, String>> {
    fn environment(&self, service: &str) -> Option<&BTreeMap<String, String>> {
        self.get(service)
    }

    fn host_port(&self, _service: &str, _container_port: u16) -> Option<u16> {
        None
    }
}

/// Runtime parameters of a service after substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    /// Environment with every placeholder replaced.
    pub environment: BTreeMap<String, String>,
    /// Exposed ports; self port references are pinned.
    pub exposed_ports: Vec<PortSpec>,
}

/// A parsed `${container.variable}` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placeholder<'a> {
    container: &'a str,
    variable: &'a str,
}

impl<'a> Placeholder<'a> {
    fn parse(raw: &'a str, service: &str) -> Result<Self> {
        let mut parts = raw.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(container), Some(variable), None)
                if !container.is_empty() && !variable.is_empty() =>
            {
                Ok(Self {
                    container,
                    variable,
                })
            }
            _ => Err(TestComposeError::MalformedPlaceholder {
                service: service.to_string(),
                placeholder: raw.to_string(),
            }),
        }
    }

    fn is_self(&self) -> bool {
        self.container.eq_ignore_ascii_case(constants::SELF_PLACEHOLDER)
    }
}

/// What a placeholder variable asks for. Reserved names match in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable<'a> {
    Hostname,
    HostAddress,
    /// `external_port_<p>` or `hostport_<p>`.
    Port(u16),
    /// A port variable whose suffix is not a port number.
    BadPort(&'a str),
    /// An environment variable of another service.
    Env(&'a str),
}

impl<'a> Variable<'a> {
    fn classify(variable: &'a str) -> Self {
        if variable.eq_ignore_ascii_case(constants::CONTAINER_HOSTNAME) {
            return Self::Hostname;
        }
        if variable.eq_ignore_ascii_case(constants::CONTAINER_HOST_ADDRESS) {
            return Self::HostAddress;
        }
        let Some(suffix) = [constants::EXTERNAL_PORT, constants::HOST_PORT]
            .iter()
            .find_map(|prefix| strip_prefix_ignore_case(variable, prefix))
        else {
            return Self::Env(variable);
        };
        if suffix.is_empty() {
            return Self::BadPort("");
        }
        let Some(digits) = suffix.strip_prefix('_') else {
            return Self::Env(variable);
        };
        match digits.parse::<u16>() {
            Ok(port) if port != 0 => Self::Port(port),
            _ => Self::BadPort(digits),
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

/// Resolves every placeholder in `descriptor`'s environment.
///
/// Every reference is checked before any value is substituted, so a bad
/// token never leaves a half-allocated port list behind.
///
/// # Errors
///
/// - [`TestComposeError::MalformedPlaceholder`] for tokens that are not
///   exactly `container.variable`.
/// - [`TestComposeError::CyclicSelfDependency`] when the token names the
///   service itself, or a dependency that is not running yet.
/// - [`TestComposeError::UnknownServiceReference`] for any other service
///   that is not running.
/// - [`TestComposeError::InvalidSelfPortReference`] for a self port that
///   is not exposed.
/// - [`TestComposeError::UnknownVariableReference`] when the referenced
///   service has no such variable or port.
pub fn resolve_service(
    descriptor: &ServiceDescriptor,
    scope: &dyn ResolutionScope,
    host: &dyn HostNetwork,
) -> Result<ResolvedService> {
    let mut resolver = Resolver {
        descriptor,
        scope,
        host,
        exposed_ports: descriptor.exposed_ports.clone(),
    };

    for value in descriptor.environment.values() {
        for caps in PLACEHOLDER.captures_iter(value) {
            let placeholder = Placeholder::parse(&caps[1], &descriptor.name)?;
            resolver.check_reference(placeholder)?;
        }
    }

    let mut environment = BTreeMap::new();
    for (key, value) in &descriptor.environment {
        let _ = environment.insert(key.clone(), resolver.substitute(value)?);
    }

    tracing::debug!(
        service = %descriptor.name,
        variables = environment.len(),
        "placeholders resolved"
    );
    Ok(ResolvedService {
        environment,
        exposed_ports: resolver.exposed_ports,
    })
}

struct Resolver<'a> {
    descriptor: &'a ServiceDescriptor,
    scope: &'a dyn ResolutionScope,
    host: &'a dyn HostNetwork,
    exposed_ports: Vec<PortSpec>,
}

impl Resolver<'_> {
    fn service(&self) -> &str {
        &self.descriptor.name
    }

    fn check_reference(&self, placeholder: Placeholder<'_>) -> Result<()> {
        if placeholder.is_self() {
            return Ok(());
        }
        let referenced = placeholder.container;
        let cyclic = || TestComposeError::CyclicSelfDependency {
            service: self.service().to_string(),
            referenced: referenced.to_string(),
        };
        if referenced == self.service() {
            return Err(cyclic());
        }
        if self.scope.environment(referenced).is_none() {
            if self.descriptor.depends_on.contains(referenced) {
                return Err(cyclic());
            }
            return Err(TestComposeError::UnknownServiceReference {
                service: self.service().to_string(),
                referenced: referenced.to_string(),
            });
        }
        Ok(())
    }

    fn substitute(&mut self, value: &str) -> Result<String> {
        let mut out = String::with_capacity(value.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(value) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let placeholder = Placeholder::parse(&caps[1], &self.descriptor.name)?;
            out.push_str(&value[last..whole.start()]);
            out.push_str(&self.value_of(placeholder)?);
            last = whole.end();
        }
        out.push_str(&value[last..]);
        Ok(out)
    }

    fn value_of(&mut self, placeholder: Placeholder<'_>) -> Result<String> {
        if placeholder.is_self() {
            self.self_value(placeholder.variable)
        } else {
            self.other_value(placeholder)
        }
    }

    fn self_value(&mut self, variable: &str) -> Result<String> {
        match Variable::classify(variable) {
            Variable::Hostname => Ok(self.service().to_string()),
            Variable::HostAddress => Ok(self.host.host_address()?.to_string()),
            Variable::Port(port) => self.pin_self_port(port).map(|p| p.to_string()),
            Variable::BadPort(raw) => Err(TestComposeError::InvalidSelfPortReference {
                service: self.service().to_string(),
                port: raw.to_string(),
            }),
            Variable::Env(_) => Err(TestComposeError::CyclicSelfDependency {
                service: self.service().to_string(),
                referenced: format!("{}.{variable}", constants::SELF_PLACEHOLDER),
            }),
        }
    }

    fn pin_self_port(&mut self, container_port: u16) -> Result<u16> {
        let Some(index) = self
            .exposed_ports
            .iter()
            .position(|p| p.container == container_port)
        else {
            return Err(TestComposeError::InvalidSelfPortReference {
                service: self.service().to_string(),
                port: container_port.to_string(),
            });
        };
        if let Some(host_port) = self.exposed_ports[index].host {
            return Ok(host_port);
        }
        let host_port = self.host.free_port()?;
        self.exposed_ports[index] = self.exposed_ports[index].pin(host_port);
        tracing::debug!(
            service = %self.service(),
            container_port,
            host_port,
            "pinned self port"
        );
        Ok(host_port)
    }

    fn other_value(&self, placeholder: Placeholder<'_>) -> Result<String> {
        let Placeholder {
            container,
            variable,
        } = placeholder;
        let unknown = || TestComposeError::UnknownVariableReference {
            service: self.service().to_string(),
            container: container.to_string(),
            variable: variable.to_string(),
        };
        match Variable::classify(variable) {
            Variable::Hostname => Ok(container.to_string()),
            Variable::HostAddress => Ok(self.host.host_address()?.to_string()),
            Variable::Port(port) => self
                .scope
                .host_port(container, port)
                .map(|p| p.to_string())
                .ok_or_else(unknown),
            Variable::BadPort(_) => Err(unknown()),
            Variable::Env(name) => self
                .scope
                .environment(container)
                .and_then(|env| env.get(&name.to_uppercase()))
                .cloned()
                .ok_or_else(unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::host::StaticHost;

    fn scope(entries: &[(&str, &[(&str, &str)])]) -> BTreeMap<String, BTreeMap<String, String>> {
        entries
            .iter()
            .map(|(name, env)| {
                (
                    (*name).to_string(),
                    env.iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                )
            })
            .collect()
    }

    fn service(name: &str, env: &[(&str, &str)]) -> ServiceDescriptor {
        let mut svc = ServiceDescriptor::new(name, "img");
        svc.environment = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        svc
    }

    fn host() -> StaticHost {
        StaticHost::new(41_000, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)))
    }

    #[test]
    fn other_hostname_is_the_service_name() {
        let mut app = service("app", &[("DB_HOST", "${db.container_hostname}")]);
        let _ = app.depends_on.insert("db".into());
        let resolved = resolve_service(&app, &scope(&[("db", &[])]), &host()).expect("resolve");
        assert_eq!(resolved.environment["DB_HOST"], "db");
    }

    #[test]
    fn self_hostname_is_own_name() {
        let app = service("app", &[("ME", "${self.container_hostname}")]);
        let resolved = resolve_service(&app, &scope(&[]), &host()).expect("resolve");
        assert_eq!(resolved.environment["ME"], "app");
    }

    #[test]
    fn reserved_words_match_in_any_case() {
        let mut app = service(
            "app",
            &[
                ("ME", "${SELF.Container_Hostname}"),
                ("DB", "${db.CONTAINER_HOSTNAME}"),
                ("PORT", "${Self.EXTERNAL_PORT_8080}"),
                ("HOST", "${db.Container_Host_Address}"),
            ],
        );
        let _ = app.depends_on.insert("db".into());
        app.exposed_ports = vec![PortSpec::any(8080)];
        let resolved = resolve_service(&app, &scope(&[("db", &[])]), &host()).expect("resolve");
        assert_eq!(resolved.environment["ME"], "app");
        assert_eq!(resolved.environment["DB"], "db");
        assert_eq!(resolved.environment["PORT"], "41000");
        assert_eq!(resolved.environment["HOST"], "192.168.1.20");
    }

    #[test]
    fn other_variable_is_looked_up_upper_cased() {
        let app = service(
            "app",
            &[("DB_URL", "${db.db_user}:${db.db_password}@${db.container_hostname}:5432")],
        );
        let running = scope(&[("db", &[("DB_USER", "user"), ("DB_PASSWORD", "pw")])]);
        let resolved = resolve_service(&app, &running, &host()).expect("resolve");
        assert_eq!(resolved.environment["DB_URL"], "user:pw@db:5432");
    }

    #[test]
    fn self_external_port_pins_free_port() {
        let mut app = service("app", &[("PORT", "${self.external_port_8080}")]);
        app.exposed_ports = vec![PortSpec::any(8080), PortSpec::any(9090)];
        let resolved = resolve_service(&app, &scope(&[]), &host()).expect("resolve");
        assert_eq!(resolved.environment["PORT"], "41000");
        assert_eq!(
            resolved.exposed_ports,
            vec![PortSpec::pinned(41_000, 8080), PortSpec::any(9090)]
        );
    }

    #[test]
    fn same_self_port_twice_yields_same_value() {
        let mut app = service(
            "app",
            &[
                ("A", "${self.external_port_8080}"),
                ("B", "http://localhost:${self.hostport_8080}/"),
            ],
        );
        app.exposed_ports = vec![PortSpec::any(8080)];
        let resolved = resolve_service(&app, &scope(&[]), &host()).expect("resolve");
        assert_eq!(resolved.environment["A"], "41000");
        assert_eq!(resolved.environment["B"], "http://localhost:41000/");
    }

    #[test]
    fn already_pinned_self_port_is_kept() {
        let mut app = service("app", &[("PORT", "${self.external_port_8080}")]);
        app.exposed_ports = vec![PortSpec::pinned(18_080, 8080)];
        let resolved = resolve_service(&app, &scope(&[]), &host()).expect("resolve");
        assert_eq!(resolved.environment["PORT"], "18080");
    }

    #[test]
    fn self_port_not_exposed_is_invalid() {
        let mut app = service("app", &[("PORT", "${self.external_port_9999}")]);
        app.exposed_ports = vec![PortSpec::any(8080)];
        let err = resolve_service(&app, &scope(&[]), &host()).unwrap_err();
        assert!(
            matches!(err, TestComposeError::InvalidSelfPortReference { ref port, .. } if port == "9999")
        );
    }

    #[test]
    fn bare_external_port_is_invalid() {
        let app = service("app", &[("PORT", "${self.external_port}")]);
        let err = resolve_service(&app, &scope(&[]), &host()).unwrap_err();
        assert!(matches!(err, TestComposeError::InvalidSelfPortReference { .. }));
    }

    #[test]
    fn self_host_address_is_host_ip() {
        let app = service("app", &[("HOST", "${self.container_host_address}")]);
        let resolved = resolve_service(&app, &scope(&[]), &host()).expect("resolve");
        assert_eq!(resolved.environment["HOST"], "192.168.1.20");
    }

    #[test]
    fn one_segment_token_is_malformed() {
        let app = service("app", &[("X", "${onlyonepart}")]);
        let err = resolve_service(&app, &scope(&[]), &host()).unwrap_err();
        assert!(
            matches!(err, TestComposeError::MalformedPlaceholder { ref placeholder, .. } if placeholder == "onlyonepart")
        );
    }

    #[test]
    fn three_segment_token_is_malformed() {
        let app = service("app", &[("X", "${a.b.c}")]);
        let err = resolve_service(&app, &scope(&[]), &host()).unwrap_err();
        assert!(matches!(err, TestComposeError::MalformedPlaceholder { .. }));
    }

    #[test]
    fn unknown_variable_is_fatal() {
        let app = service("app", &[("X", "${db.missing}")]);
        let err = resolve_service(&app, &scope(&[("db", &[])]), &host()).unwrap_err();
        assert!(matches!(
            err,
            TestComposeError::UnknownVariableReference { ref variable, .. } if variable == "missing"
        ));
    }

    #[test]
    fn dependency_not_yet_running_is_cyclic() {
        let mut app = service("app", &[("X", "${db.container_hostname}")]);
        let _ = app.depends_on.insert("db".into());
        let err = resolve_service(&app, &scope(&[]), &host()).unwrap_err();
        assert!(matches!(err, TestComposeError::CyclicSelfDependency { .. }));
    }

    #[test]
    fn referencing_own_name_is_cyclic() {
        let app = service("app", &[("X", "${app.container_hostname}")]);
        let err = resolve_service(&app, &scope(&[]), &host()).unwrap_err();
        assert!(matches!(err, TestComposeError::CyclicSelfDependency { .. }));
    }

    #[test]
    fn non_dependency_not_running_is_unknown_service() {
        let app = service("app", &[("X", "${cache.container_hostname}")]);
        let err = resolve_service(&app, &scope(&[]), &host()).unwrap_err();
        assert!(matches!(err, TestComposeError::UnknownServiceReference { .. }));
    }

    #[test]
    fn bad_token_leaves_ports_unpinned() {
        let mut app = service(
            "app",
            &[("A", "${self.external_port_8080}"), ("B", "${nope}")],
        );
        app.exposed_ports = vec![PortSpec::any(8080)];
        let host = host();
        assert!(resolve_service(&app, &scope(&[]), &host).is_err());
        // Validation runs first, so no port was consumed.
        assert_eq!(host.free_port().expect("port"), 41_000);
    }

    #[test]
    fn text_without_placeholders_is_untouched() {
        let app = service("app", &[("PLAIN", "no tokens here"), ("OPEN", "${unterminated")]);
        let resolved = resolve_service(&app, &scope(&[]), &host()).expect("resolve");
        assert_eq!(resolved.environment["PLAIN"], "no tokens here");
        assert_eq!(resolved.environment["OPEN"], "${unterminated");
    }

    struct PortScope;

    impl ResolutionScope for PortScope {
        fn environment(&self, service: &str) -> Option<&BTreeMap<String, String>> {
            static EMPTY: BTreeMap<String, String> = BTreeMap::new();
            (service == "db").then_some(&EMPTY)
        }

        fn host_port(&self, service: &str, container_port: u16) -> Option<u16> {
            (service == "db" && container_port == 5432).then_some(49_153)
        }
    }

    #[test]
    fn other_external_port_uses_mapped_port() {
        let app = service("app", &[("DB_PORT", "${db.external_port_5432}")]);
        let resolved = resolve_service(&app, &PortScope, &host()).expect("resolve");
        assert_eq!(resolved.environment["DB_PORT"], "49153");

        let app = service("app", &[("DB_PORT", "${db.hostport_6543}")]);
        let err = resolve_service(&app, &PortScope, &host()).unwrap_err();
        assert!(matches!(err, TestComposeError::UnknownVariableReference { .. }));
    }
}
