// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ticketflow - conversation automation and scheduled messaging engine.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ticketflow_config::model::TicketflowConfig;

/// Ticketflow - conversation automation and scheduled messaging engine.
#[derive(Parser, Debug)]
#[command(name = "ticketflow", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the worker, periodic jobs and (optionally) the gateway.
    Serve,
    /// Print the effective configuration as TOML.
    Config,
}

fn load_config(path: Option<&std::path::Path>) -> TicketflowConfig {
    let loaded = match path {
        Some(path) => ticketflow_config::load_and_validate_path(path),
        None => ticketflow_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            ticketflow_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config_path.as_deref());

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match ticketflow_config::to_toml(&config) {
            Ok(rendered) => print!("{rendered}"),
            Err(e) => {
                ticketflow_config::render_errors(&[e]);
                std::process::exit(1);
            }
        },
        None => {
            println!("ticketflow: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["ticketflow", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));

        let cli =
            Cli::try_parse_from(["ticketflow", "config", "--config", "/tmp/tf.toml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config)));
        assert_eq!(cli.config_path, Some(PathBuf::from("/tmp/tf.toml")));
    }

    #[test]
    fn default_config_renders_as_toml() {
        let config = ticketflow_config::load_and_validate_str("").unwrap();
        let rendered = ticketflow_config::to_toml(&config).unwrap();
        assert!(rendered.contains("[schedules]"));
    }
}
