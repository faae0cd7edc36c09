//! CLI command definitions and dispatch.

pub mod generate_template;
pub mod plan;
pub mod run;

use clap::{Parser, Subcommand, ValueEnum};

/// testcompose — Container test environments from a single config file.
#[derive(Parser, Debug)]
#[command(name = "testcompose", version, about, long_about = None)]
pub struct Cli {
    /// Format of diagnostic logs on stderr; filter with `RUST_LOG`.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Diagnostic log encoding.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start every service of a config file and wait for Ctrl+C.
    Run(run::RunArgs),
    /// Show the start order and health gates without starting anything.
    Plan(plan::PlanArgs),
    /// Write a starter config for a combination of components.
    GenerateTemplate(generate_template::GenerateTemplateArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => run::execute(&args),
        Command::Plan(args) => plan::execute(&args),
        Command::GenerateTemplate(args) => generate_template::execute(&args),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_network_flags() {
        let cli = Cli::try_parse_from([
            "testcompose",
            "run",
            "env.yaml",
            "--network",
            "shared",
            "--auto-create-network",
        ])
        .expect("parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.network.as_deref(), Some("shared"));
        assert!(args.auto_create_network);
        assert!(!args.random_network);
    }

    #[test]
    fn log_format_defaults_to_text() {
        let cli = Cli::try_parse_from(["testcompose", "plan", "env.yaml"]).expect("parse");
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn log_format_json_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["testcompose", "plan", "env.yaml", "--log-format", "json"])
            .expect("parse");
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(
            Cli::try_parse_from(["testcompose", "--log-format", "xml", "plan"]).is_err()
        );
    }

    #[test]
    fn generate_template_collects_components() {
        let cli = Cli::try_parse_from([
            "testcompose",
            "generate-template",
            "--component",
            "app",
            "--component",
            "DB",
        ])
        .expect("parse");
        let Command::GenerateTemplate(args) = cli.command else {
            panic!("expected generate-template");
        };
        assert_eq!(args.components.len(), 2);
        assert!(args.template_file.is_none());
    }

    #[test]
    fn unknown_component_is_rejected() {
        assert!(
            Cli::try_parse_from(["testcompose", "generate-template", "--component", "cache"])
                .is_err()
        );
    }
}
