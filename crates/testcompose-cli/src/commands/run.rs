//! `testcompose run` — Start every service and wait for Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Args;
use testcompose_common::config::{ClientOptions, NetworkOptions, RegistryLogin, RunOptions};
use testcompose_runtime::backend::connect_runtime;
use testcompose_runtime::engine::Engine;
use testcompose_sdk::environment::TestEnvironment;
use testcompose_sdk::graph_resolver::GraphResolver;

use crate::output::{self, BOLD, CYAN, DIM, GREEN, RESET, YELLOW};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the config file.
    #[arg(default_value = testcompose_common::constants::DEFAULT_CONFIG_FILE)]
    pub file: PathBuf,

    /// Attach every container to this network instead of a fresh one.
    #[arg(long)]
    pub network: Option<String>,

    /// Create the named network when it does not exist.
    #[arg(long)]
    pub auto_create_network: bool,

    /// Use a fresh network for this run.
    #[arg(long, conflicts_with = "network")]
    pub random_network: bool,

    /// Do not pull images before starting containers.
    #[arg(long)]
    pub no_pull: bool,

    /// Seconds to wait for each container to report `running`.
    #[arg(long, default_value_t = 40)]
    pub running_timeout: u64,

    /// Docker engine address (`unix://`, `tcp://`, `https://`); defaults
    /// to `DOCKER_HOST` or the local socket.
    #[arg(long, env = "DOCKER_HOST")]
    pub docker_host: Option<String>,

    /// Talk to the engine over TLS with client certificates.
    #[arg(long, env = "DOCKER_TLS_VERIFY", value_parser = clap::builder::FalseyValueParser::new())]
    pub tls: bool,

    /// Directory holding `ca.pem`, `cert.pem` and `key.pem`.
    #[arg(long, env = "DOCKER_CERT_PATH")]
    pub tls_cert_path: Option<PathBuf>,

    /// Seconds to wait for an engine response.
    #[arg(long, default_value_t = testcompose_common::constants::DEFAULT_ENGINE_TIMEOUT_SECS)]
    pub engine_timeout: u64,

    /// Registry user for image pulls.
    #[arg(long, requires = "registry_password")]
    pub registry_username: Option<String>,

    /// Registry password for image pulls.
    #[arg(long, env = "TESTCOMPOSE_REGISTRY_PASSWORD", hide_env_values = true)]
    pub registry_password: Option<String>,

    /// Registry account email.
    #[arg(long)]
    pub registry_email: Option<String>,

    /// Registry the login applies to.
    #[arg(long)]
    pub registry: Option<String>,

    /// Docker `config.json` to read stored registry credentials from.
    #[arg(long, conflicts_with = "registry_username")]
    pub dockercfg_path: Option<PathBuf>,
}

impl RunArgs {
    fn network_overrides(&self) -> NetworkOptions {
        NetworkOptions {
            network_name: self.network.clone(),
            auto_create_network: self.auto_create_network,
            use_random_network: self.random_network,
        }
    }

    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            docker_host: self.docker_host.clone(),
            tls: self.tls,
            cert_path: self.tls_cert_path.clone(),
            timeout: Duration::from_secs(self.engine_timeout),
        }
    }

    fn registry_login(&self) -> Option<RegistryLogin> {
        if self.registry_username.is_none() && self.dockercfg_path.is_none() {
            return None;
        }
        Some(RegistryLogin {
            username: self.registry_username.clone(),
            password: self.registry_password.clone(),
            email: self.registry_email.clone(),
            registry: self.registry.clone(),
            dockercfg_path: self.dockercfg_path.clone(),
        })
    }
}

/// Executes the `run` command.
///
/// # Errors
///
/// Returns an error if the config is invalid, the container runtime is
/// unavailable, or any service fails to start.
pub fn execute(args: &RunArgs) -> anyhow::Result<()> {
    let total_start = Instant::now();
    print_header();

    if !args.file.exists() {
        return Err(anyhow::anyhow!(
            "Config file not found: {}\n\
             Create one with: testcompose generate-template --component app",
            args.file.display()
        ));
    }

    let resolver = GraphResolver::load(&args.file).map_err(|e| anyhow::anyhow!("{e}"))?;
    let network = resolver.network().merged_with(&args.network_overrides());
    let (_, services) = resolver.into_parts();
    let options = RunOptions {
        network,
        running_timeout: Duration::from_secs(args.running_timeout),
        pull_images: !args.no_pull,
        client: args.client_options(),
        registry_login: args.registry_login(),
        ..RunOptions::default()
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let runtime = connect_runtime(&options).map_err(|e| anyhow::anyhow!("{e}"))?;
    eprintln!("  {DIM}runtime: {}{RESET}", runtime.name());
    let engine = Engine::new(runtime)?.with_options(options);
    let mut env = TestEnvironment::start(engine, &services).map_err(|e| anyhow::anyhow!("{e}"))?;

    report(&env, total_start);
    wait_for_shutdown(&running);

    eprintln!();
    eprintln!("  Stopping services...");
    env.teardown();
    eprintln!("  {GREEN}All services stopped.{RESET}");
    Ok(())
}

fn print_header() {
    eprintln!();
    eprintln!("  {BOLD}testcompose{RESET} {DIM}v{}{RESET}", env!("CARGO_PKG_VERSION"));
    eprintln!();
}

fn report(env: &TestEnvironment, total_start: Instant) {
    eprintln!();
    eprintln!(
        "  {GREEN}{BOLD}Started {}{RESET} service(s) in {}:",
        env.registry().len(),
        output::format_duration(total_start.elapsed())
    );
    eprintln!();

    for service in env.registry().iter() {
        let id = service
            .container
            .id()
            .map_or("-", |id| id.short());
        eprintln!(
            "    {GREEN}●{RESET} {BOLD}{}{RESET} {DIM}[{id}]{RESET} {CYAN}{}{RESET}",
            service.name,
            output::format_port_map(service.container.ports().iter())
        );
    }

    if let Some(network) = env.network_name() {
        eprintln!();
        eprintln!("  {DIM}network: {network}  run: {}{RESET}", env.run_id());
    }
}

fn wait_for_shutdown(running: &AtomicBool) {
    eprintln!();
    eprintln!("  Press {BOLD}Ctrl+C{RESET} to stop all services...");
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(250));
    }
    eprintln!("  {YELLOW}Interrupted.{RESET}");
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RunArgs,
    }

    fn parse(extra: &[&str]) -> RunArgs {
        let argv = std::iter::once("run").chain(extra.iter().copied());
        Harness::try_parse_from(argv).expect("parse").args
    }

    #[test]
    fn explicit_docker_host_reaches_client_options() {
        let args = parse(&[
            "--docker-host",
            "tcp://10.0.0.2:2376",
            "--tls",
            "--tls-cert-path",
            "/certs",
            "--engine-timeout",
            "5",
        ]);
        let client = args.client_options();
        assert_eq!(client.docker_host.as_deref(), Some("tcp://10.0.0.2:2376"));
        assert!(client.tls);
        assert_eq!(client.cert_path, Some(PathBuf::from("/certs")));
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn no_registry_flags_means_no_login() {
        let args = parse(&["--registry", "ghcr.io"]);
        assert!(args.registry_login().is_none());
    }

    #[test]
    fn username_login_carries_password_and_registry() {
        let args = parse(&[
            "--registry-username",
            "ci",
            "--registry-password",
            "secret",
            "--registry",
            "ghcr.io",
        ]);
        let login = args.registry_login().expect("login");
        assert_eq!(login.username.as_deref(), Some("ci"));
        assert_eq!(login.password.as_deref(), Some("secret"));
        assert_eq!(login.registry(), "ghcr.io");
        assert!(login.validate().is_ok());
    }

    #[test]
    fn dockercfg_login_excludes_username() {
        let args = parse(&["--dockercfg-path", "/home/ci/.docker/config.json"]);
        let login = args.registry_login().expect("login");
        assert_eq!(login.registry(), "docker.io");
        assert!(
            Harness::try_parse_from([
                "run",
                "--dockercfg-path",
                "/cfg.json",
                "--registry-username",
                "ci",
                "--registry-password",
                "x",
            ])
            .is_err()
        );
    }
}
