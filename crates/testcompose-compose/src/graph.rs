//! Dependency ranking of services.
//!
//! Assigns every service a rank such that all of its `depends_on`
//! entries have strictly smaller ranks. Ranks are handed out in layered
//! passes: each pass ranks, in lexical name order, every service whose
//! dependencies were all ranked by earlier passes. A pass that ranks
//! nothing means an undeclared dependency or a cycle; `petgraph`'s
//! strongly connected components pinpoint the cycle members.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::DiGraph;
use testcompose_common::error::{Result, TestComposeError};

use crate::service::ServiceSet;

/// A total start order over service names; index is the rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedServices {
    order: Vec<String>,
}

impl RankedServices {
    /// Iterates `(rank, name)` in ascending rank order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &str)> {
        self.order.iter().map(String::as_str).enumerate()
    }

    /// Returns the rank of `name`, if ranked.
    #[must_use]
    pub fn rank_of(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }

    /// Returns the name holding `rank`.
    #[must_use]
    pub fn name_at(&self, rank: usize) -> Option<&str> {
        self.order.get(rank).map(String::as_str)
    }

    /// Returns names in start order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Number of ranked services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns whether nothing is ranked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Ranks `services` by their `depends_on` edges.
///
/// The result is deterministic: identical input always yields the
/// identical order.
///
/// # Errors
///
/// - [`TestComposeError::EmptyServiceSet`] for an empty set.
/// - [`TestComposeError::InvalidDependency`] when a stalled service
///   depends on an undeclared name.
/// - [`TestComposeError::CyclicDependency`] listing every service that
///   takes part in a cycle.
pub fn rank_services(services: &ServiceSet) -> Result<RankedServices> {
    if services.is_empty() {
        return Err(TestComposeError::EmptyServiceSet);
    }

    let mut ranked: BTreeMap<&str, usize> = BTreeMap::new();
    let mut unranked: BTreeSet<&str> = services.names().collect();
    let mut order: Vec<String> = Vec::with_capacity(services.len());

    while !unranked.is_empty() {
        let layer: Vec<&str> = unranked
            .iter()
            .copied()
            .filter(|name| {
                services.get(name).is_some_and(|svc| {
                    svc.depends_on
                        .iter()
                        .all(|dep| ranked.contains_key(dep.as_str()))
                })
            })
            .collect();

        if layer.is_empty() {
            return Err(diagnose_stall(services, &unranked));
        }

        for name in layer {
            let _ = ranked.insert(name, order.len());
            let _ = unranked.remove(name);
            order.push(name.to_string());
        }
    }

    tracing::info!(?order, "service start order resolved");
    Ok(RankedServices { order })
}

/// Explains why no remaining service could be ranked.
fn diagnose_stall(services: &ServiceSet, unranked: &BTreeSet<&str>) -> TestComposeError {
    for name in unranked {
        let Some(svc) = services.get(name) else {
            continue;
        };
        let missing: Vec<String> = svc
            .depends_on
            .iter()
            .filter(|dep| !services.contains(dep))
            .cloned()
            .collect();
        if !missing.is_empty() {
            tracing::error!(service = %name, ?missing, "invalid dependency");
            return TestComposeError::InvalidDependency {
                service: (*name).to_string(),
                missing,
            };
        }
    }

    let services_in_cycles = cycle_members(services, unranked);
    tracing::error!(services = ?services_in_cycles, "cyclic dependency");
    TestComposeError::CyclicDependency {
        services: services_in_cycles,
    }
}

/// Returns the sorted names of services that sit on a dependency cycle
/// among `unranked`. Services merely blocked behind a cycle are left out.
fn cycle_members(services: &ServiceSet, unranked: &BTreeSet<&str>) -> Vec<String> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let nodes: HashMap<&str, _> = unranked
        .iter()
        .map(|name| (*name, graph.add_node(*name)))
        .collect();

    for name in unranked {
        let Some(svc) = services.get(name) else {
            continue;
        };
        for dep in &svc.depends_on {
            if let Some(&dep_idx) = nodes.get(dep.as_str()) {
                let _ = graph.add_edge(dep_idx, nodes[name], ());
            }
        }
    }

    let mut members: Vec<String> = petgraph::algo::tarjan_scc(&graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || graph.contains_edge(component[0], component[0])
        })
        .flatten()
        .map(|idx| graph[idx].to_string())
        .collect();

    if members.is_empty() {
        members = unranked.iter().map(ToString::to_string).collect();
    }
    members.sort();
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceDescriptor;

    fn svc(name: &str, deps: &[&str]) -> ServiceDescriptor {
        let mut d = ServiceDescriptor::new(name, format!("{name}:latest"));
        d.depends_on = deps.iter().map(ToString::to_string).collect();
        d
    }

    fn set(services: Vec<ServiceDescriptor>) -> ServiceSet {
        ServiceSet::new(services).expect("valid set")
    }

    #[test]
    fn single_service_gets_rank_zero() {
        let ranked = rank_services(&set(vec![svc("api", &[])])).expect("should rank");
        assert_eq!(ranked.names(), ["api"]);
        assert_eq!(ranked.rank_of("api"), Some(0));
    }

    #[test]
    fn dependency_ranks_before_dependent() {
        let ranked =
            rank_services(&set(vec![svc("app", &["db"]), svc("db", &[])])).expect("should rank");
        assert_eq!(ranked.rank_of("db"), Some(0));
        assert_eq!(ranked.rank_of("app"), Some(1));
    }

    #[test]
    fn diamond_dependency() {
        let ranked = rank_services(&set(vec![
            svc("a", &["b", "c"]),
            svc("b", &["d"]),
            svc("c", &["d"]),
            svc("d", &[]),
        ]))
        .expect("should rank");
        assert_eq!(ranked.names(), ["d", "b", "c", "a"]);
    }

    #[test]
    fn independent_services_rank_lexically() {
        let ranked = rank_services(&set(vec![svc("z", &[]), svc("x", &[]), svc("y", &[])]))
            .expect("should rank");
        assert_eq!(ranked.names(), ["x", "y", "z"]);
    }

    #[test]
    fn layers_are_ranked_pass_by_pass() {
        // "b" depends on "a" but sorts before "c", which has no deps;
        // "c" still lands in the first layer.
        let ranked = rank_services(&set(vec![svc("a", &[]), svc("b", &["a"]), svc("c", &[])]))
            .expect("should rank");
        assert_eq!(ranked.names(), ["a", "c", "b"]);
    }

    #[test]
    fn ranking_is_deterministic() {
        let services = set(vec![
            svc("web", &["api"]),
            svc("api", &["db", "cache"]),
            svc("cache", &[]),
            svc("db", &[]),
            svc("worker", &["db"]),
        ]);
        let first = rank_services(&services).expect("rank");
        for _ in 0..10 {
            assert_eq!(rank_services(&services).expect("rank"), first);
        }
    }

    #[test]
    fn every_dependency_has_smaller_rank() {
        let services = set(vec![
            svc("web", &["api"]),
            svc("api", &["db", "cache"]),
            svc("cache", &[]),
            svc("db", &[]),
            svc("worker", &["db", "cache"]),
        ]);
        let ranked = rank_services(&services).expect("rank");
        for descriptor in services.iter() {
            let rank = ranked.rank_of(&descriptor.name).expect("ranked");
            for dep in &descriptor.depends_on {
                assert!(ranked.rank_of(dep).expect("dep ranked") < rank);
            }
        }
    }

    #[test]
    fn two_node_cycle_detection() {
        let err = rank_services(&set(vec![svc("a", &["b"]), svc("b", &["a"])])).unwrap_err();
        match err {
            TestComposeError::CyclicDependency { services } => {
                assert_eq!(services, vec!["a", "b"]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn cycle_report_excludes_blocked_services() {
        let err = rank_services(&set(vec![
            svc("a", &["b"]),
            svc("b", &["c"]),
            svc("c", &["a"]),
            svc("d", &["a"]),
            svc("e", &[]),
        ]))
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cyclic"), "got: {msg}");
        match err {
            TestComposeError::CyclicDependency { services } => {
                assert_eq!(services, vec!["a", "b", "c"]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn unknown_dependency_is_invalid() {
        let err = rank_services(&set(vec![svc("api", &["ghost"]), svc("db", &[])])).unwrap_err();
        match err {
            TestComposeError::InvalidDependency { service, missing } => {
                assert_eq!(service, "api");
                assert_eq!(missing, vec!["ghost"]);
            }
            other => panic!("expected invalid dependency, got {other}"),
        }
    }

    #[test]
    fn iter_yields_rank_and_name() {
        let ranked =
            rank_services(&set(vec![svc("app", &["db"]), svc("db", &[])])).expect("should rank");
        let pairs: Vec<_> = ranked.iter().collect();
        assert_eq!(pairs, vec![(0, "db"), (1, "app")]);
        assert_eq!(ranked.iter().rev().next(), Some((1, "app")));
        assert_eq!(ranked.name_at(1), Some("app"));
    }
}
