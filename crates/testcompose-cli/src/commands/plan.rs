//! `testcompose plan` — Show the start order without starting anything.

use std::path::PathBuf;

use clap::Args;
use testcompose_sdk::graph_resolver::GraphResolver;

use crate::output::{self, BOLD, DIM, RESET};

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the config file.
    #[arg(default_value = testcompose_common::constants::DEFAULT_CONFIG_FILE)]
    pub file: PathBuf,
}

/// Executes the `plan` command.
///
/// Loads and validates the config file, ranks the services, and prints
/// each one with its dependencies, ports and health gates.
///
/// # Errors
///
/// Returns an error if loading, validation, or ranking fails.
pub fn execute(args: &PlanArgs) -> anyhow::Result<()> {
    let resolver = GraphResolver::load(&args.file).map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("Start plan for: {}", args.file.display());
    println!("{}", "\u{2550}".repeat(35));
    println!();

    for (rank, service) in resolver.ranked() {
        println!("  {rank}. {BOLD}{}{RESET} {DIM}({}){RESET}", service.name, service.image);
        if !service.depends_on.is_empty() {
            let deps: Vec<&str> = service.depends_on.iter().map(String::as_str).collect();
            println!("      after: {}", deps.join(", "));
        }
        println!("      ports: {}", output::format_exposed(&service.exposed_ports));
        for gate in output::describe_gates(service) {
            println!("      wait:  {gate}");
        }
    }

    println!();
    println!("  {} service(s) will be started.", resolver.start_order().len());

    let network = resolver.network();
    match &network.network_name {
        Some(name) if network.auto_create_network => {
            println!("  Network: {name} (created if missing)");
        }
        Some(name) => println!("  Network: {name}"),
        None => println!("  Network: fresh network for this run"),
    }

    Ok(())
}
