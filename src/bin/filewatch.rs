//! Filewatch CLI Binary
//!
//! Hosts one role (node, storage or aggregator) or prints the effective
//! configuration.

use anyhow::Context;
use clap::Parser;
use filewatch::config::FilewatchConfig;
use filewatch::logging::init_logging;
use filewatch::tooling::cli::{Cli, CliContext, Commands, ConfigArgs};
use filewatch::tooling::{run_role, EXIT_STARTUP_FAILURE};
use std::process;
use tracing::warn;

fn main() {
    let cli = Cli::parse();

    let context = match CliContext::load(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading configuration from {}: {}", cli.config.display(), e);
            process::exit(EXIT_STARTUP_FAILURE);
        }
    };

    let code = match (&cli.command, cli.role()) {
        (Commands::Config(args), _) => match print_config(context.config, args) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                EXIT_STARTUP_FAILURE
            }
        },
        (_, Some(role)) => {
            if let Err(e) = init_logging(&context.config.logging, Some(role.as_str())) {
                eprintln!("Error initializing logging: {}", e);
                process::exit(EXIT_STARTUP_FAILURE);
            }
            if !context.config_present {
                warn!(
                    path = %context.config_path.display(),
                    "Configuration file absent, using defaults"
                );
            }

            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("Error starting runtime: {}", e);
                    process::exit(EXIT_STARTUP_FAILURE);
                }
            };
            runtime.block_on(run_role(role, context.config, &context.config_path))
        }
        (_, None) => EXIT_STARTUP_FAILURE,
    };
    process::exit(code);
}

fn print_config(mut config: FilewatchConfig, args: &ConfigArgs) -> anyhow::Result<()> {
    args.apply(&mut config);
    let text = config
        .to_toml()
        .context("Failed to render configuration")?;
    match &args.output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", text),
    }
    Ok(())
}
