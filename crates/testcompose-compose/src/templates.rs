//! Config scaffolding for common service combinations.
//!
//! Components are picked on the command line (`app`, `broker`, `db`) and
//! folded into a [`TemplateKind`]. Each kind maps to exactly one builder
//! in [`TEMPLATES`]; combinations without an entry are rejected.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use testcompose_common::error::{Result, TestComposeError};

use crate::parser::document::{
    ConfigDocument, HttpWaitEntry, LogWaitEntry, Scalar, ServiceEntry, VolumeEntry,
};
use crate::service::{VolumeMode, VolumeSource};

/// A building block of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    /// An application under test.
    App,
    /// A message broker.
    Broker,
    /// A database.
    Db,
}

impl FromStr for Component {
    type Err = TestComposeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "app" => Ok(Self::App),
            "broker" => Ok(Self::Broker),
            "db" => Ok(Self::Db),
            other => Err(TestComposeError::Config {
                message: format!(
                    "unknown component \"{other}\"; allowed values are [app, broker, db]"
                ),
            }),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::App => "app",
            Self::Broker => "broker",
            Self::Db => "db",
        })
    }
}

/// Every supported component combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// `app`
    App,
    /// `db`
    Db,
    /// `broker`
    Broker,
    /// `app` + `db`
    AppDb,
    /// `app` + `broker`
    AppBroker,
    /// `broker` + `db`
    BrokerDb,
    /// `app` + `broker` + `db`
    AppBrokerDb,
}

impl TemplateKind {
    /// Folds a component list into a kind. Order and repetition are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty list.
    pub fn from_components(components: &[Component]) -> Result<Self> {
        let set: BTreeSet<Component> = components.iter().copied().collect();
        let has = |c: Component| set.contains(&c);
        match (has(Component::App), has(Component::Broker), has(Component::Db)) {
            (true, false, false) => Ok(Self::App),
            (false, false, true) => Ok(Self::Db),
            (false, true, false) => Ok(Self::Broker),
            (true, false, true) => Ok(Self::AppDb),
            (true, true, false) => Ok(Self::AppBroker),
            (false, true, true) => Ok(Self::BrokerDb),
            (true, true, true) => Ok(Self::AppBrokerDb),
            (false, false, false) => Err(TestComposeError::Config {
                message: "at least one component is required; allowed values are [app, broker, db]"
                    .into(),
            }),
        }
    }

    /// Builds the template document for this kind.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the kind has no registered builder.
    pub fn build(self) -> Result<ConfigDocument> {
        TEMPLATES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, build)| build())
            .ok_or_else(|| TestComposeError::Config {
                message: format!("no template registered for {self:?}"),
            })
    }
}

/// Template builders keyed by kind.
pub const TEMPLATES: &[(TemplateKind, fn() -> ConfigDocument)] = &[
    (TemplateKind::App, app_template),
    (TemplateKind::Db, db_template),
    (TemplateKind::Broker, broker_template),
    (TemplateKind::AppDb, app_db_template),
    (TemplateKind::AppBroker, app_broker_template),
    (TemplateKind::BrokerDb, broker_db_template),
    (TemplateKind::AppBrokerDb, app_broker_db_template),
];

/// Serializes a template document to YAML.
///
/// # Errors
///
/// Returns a configuration error if serialization fails.
pub fn render_yaml(document: &ConfigDocument) -> Result<String> {
    serde_yaml::to_string(document).map_err(|e| TestComposeError::Config {
        message: format!("failed to render template: {e}"),
    })
}

fn env(pairs: &[(&str, &str)]) -> std::collections::BTreeMap<String, Scalar> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), Scalar::from(*v)))
        .collect()
}

/// The generic single-service skeleton every template starts from.
fn skeleton(name: &str) -> ServiceEntry {
    ServiceEntry {
        name: name.to_string(),
        image: "some-valid-image-name".into(),
        command: None,
        entrypoint: None,
        exposed_ports: Vec::new(),
        environment: env(&[
            ("ENV_VARIABLE_1", "VALUE_1"),
            ("ENV_VARIABLE_2", "VALUE_2"),
        ]),
        depends_on: Vec::new(),
        volumes: vec![
            VolumeEntry {
                host: "/some-valid-location-on-host".into(),
                container: "/data".into(),
                mode: VolumeMode::ReadWrite,
                source: VolumeSource::Filesystem,
            },
            VolumeEntry {
                host: "/another-valid-location-on-host".into(),
                container: "/data2".into(),
                mode: VolumeMode::ReadOnly,
                source: VolumeSource::Filesystem,
            },
        ],
        log_wait_parameters: Some(LogWaitEntry {
            log_line_regex: ".*Some regex to check for in the container log.*".into(),
            wait_timeout_ms: 30_000,
            poll_interval_ms: 1_000,
        }),
        http_wait_parameters: None,
        https_wait_parameters: None,
    }
}

fn app() -> ServiceEntry {
    let mut app = skeleton("app");
    app.exposed_ports = vec![Scalar::Integer(8080)];
    app.http_wait_parameters = Some(HttpWaitEntry {
        http_port: 8080,
        response_status_code: 200,
        end_point: "/ping".into(),
        startup_delay_time_ms: 20_000,
        use_https: false,
    });
    app
}

fn db() -> ServiceEntry {
    let mut db = skeleton("db");
    db.exposed_ports = vec![Scalar::Integer(5432)];
    db.environment = env(&[
        ("DB_USER", "user"),
        ("DB_PASSWORD", "very-secret"),
        ("DB_NAME", "some_db_name"),
    ]);
    db
}

fn broker() -> ServiceEntry {
    let mut broker = skeleton("broker");
    broker.image = "some-valid-broker-image".into();
    broker.exposed_ports = vec![Scalar::Integer(9092)];
    broker.environment = env(&[
        ("BROKER_ID", "1"),
        (
            "ADVERTISED_LISTENERS",
            "PLAINTEXT://${self.container_hostname}:9092,EXTERNAL://${self.container_host_address}:${self.external_port_9092}",
        ),
    ]);
    broker.volumes.clear();
    broker
}

/// `app` reaching the database through placeholders.
fn db_client_app() -> ServiceEntry {
    let mut app = app();
    app.environment = env(&[(
        "DB_URL",
        "${db.db_user}:${db.db_password}@${db.container_hostname}:5432/${db.db_name}",
    )]);
    app.depends_on = vec!["db".into()];
    app
}

fn document(services: Vec<ServiceEntry>) -> ConfigDocument {
    ConfigDocument {
        services,
        ..ConfigDocument::default()
    }
}

fn app_template() -> ConfigDocument {
    document(vec![app()])
}

fn db_template() -> ConfigDocument {
    document(vec![db()])
}

fn broker_template() -> ConfigDocument {
    document(vec![broker()])
}

fn app_db_template() -> ConfigDocument {
    document(vec![db(), db_client_app()])
}

fn app_broker_template() -> ConfigDocument {
    let mut app = app();
    app.depends_on = vec!["broker".into()];
    document(vec![broker(), app])
}

fn broker_db_template() -> ConfigDocument {
    document(vec![broker(), db()])
}

fn app_broker_db_template() -> ConfigDocument {
    let mut app = db_client_app();
    app.depends_on.push("broker".into());
    document(vec![broker(), db(), app])
}
