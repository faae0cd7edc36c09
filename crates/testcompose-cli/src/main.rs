//! # testcompose — container test environments
//!
//! Starts the services of a config file in dependency order on a shared
//! network, waits for their health gates, and tears everything down on
//! Ctrl+C.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod commands;
mod output;

use clap::Parser;

use crate::commands::{Cli, LogFormat};

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    commands::execute(cli)
}
