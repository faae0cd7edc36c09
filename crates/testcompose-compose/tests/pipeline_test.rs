//! Config file to resolved environments, without a container runtime.
//!
//! Loads a config from disk, ranks it, and resolves every service in
//! rank order against the environments of the services before it.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};

use testcompose_common::config::NetworkPolicy;
use testcompose_common::error::TestComposeError;
use testcompose_common::types::RunId;
use testcompose_compose::graph::rank_services;
use testcompose_compose::host::StaticHost;
use testcompose_compose::parser::load_config;
use testcompose_compose::resolver::resolve_service;
use testcompose_compose::templates::{Component, TemplateKind, render_yaml};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write");
    file
}

const STACK: &str = r#"
network:
  name: stack-net
  auto_create: true
services:
  - name: app
    image: my-app:latest
    exposed_ports: ["8080"]
    depends_on: [db, broker]
    environment:
      DB_URL: "${db.db_user}:${db.db_password}@${db.container_hostname}:5432"
      KAFKA: "${broker.container_hostname}:9092"
    http_wait_parameters:
      http_port: 8080
      end_point: /ping
  - name: broker
    image: kafka:3
    exposed_ports: ["9092"]
    depends_on: [db]
    environment:
      ADVERTISED: "${self.container_host_address}:${self.external_port_9092}"
  - name: db
    image: postgres:15
    exposed_ports: ["5432"]
    environment:
      DB_USER: user
      DB_PASSWORD: very-secret
"#;

#[test]
fn stack_resolves_in_rank_order() {
    let file = write_config(STACK);
    let config = load_config(file.path()).expect("load");

    let policy = config.network.policy().expect("policy");
    assert_eq!(
        policy,
        NetworkPolicy::Named {
            name: "stack-net".into(),
            auto_create: true
        }
    );
    assert_eq!(policy.network_name(&RunId::new("x")), "stack-net");

    let ranked = rank_services(&config.services).expect("rank");
    assert_eq!(ranked.names(), ["db", "broker", "app"]);

    let host = StaticHost::new(45_000, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)));
    let mut scope: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut pinned = BTreeMap::new();
    for (_, name) in ranked.iter() {
        let descriptor = config.services.get(name).expect("declared");
        let resolved = resolve_service(descriptor, &scope, &host).expect("resolve");
        let _ = pinned.insert(name.to_string(), resolved.exposed_ports);
        let _ = scope.insert(name.to_string(), resolved.environment);
    }

    assert_eq!(scope["broker"]["ADVERTISED"], "192.168.1.20:45000");
    assert_eq!(pinned["broker"][0].host, Some(45_000));
    assert_eq!(pinned["db"][0].host, None);
    assert_eq!(scope["app"]["DB_URL"], "user:very-secret@db:5432");
    assert_eq!(scope["app"]["KAFKA"], "broker:9092");
}

#[test]
fn out_of_order_reference_is_cyclic_self_dependency() {
    let file = write_config(STACK);
    let config = load_config(file.path()).expect("load");
    let app = config.services.get("app").expect("app");
    let scope: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let err = resolve_service(app, &scope, &StaticHost::default()).unwrap_err();
    assert!(matches!(err, TestComposeError::CyclicSelfDependency { .. }));
}

#[test]
fn every_template_round_trips_through_the_loader() {
    for components in [
        vec![Component::App],
        vec![Component::Db, Component::App],
        vec![Component::App, Component::Broker, Component::Db],
    ] {
        let kind = TemplateKind::from_components(&components).expect("kind");
        let yaml = render_yaml(&kind.build().expect("build")).expect("render");
        let file = write_config(&yaml);
        let config = load_config(file.path()).expect("load");
        let ranked = rank_services(&config.services).expect("rank");
        assert_eq!(ranked.len(), components.len());
    }
}
