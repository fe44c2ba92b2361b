// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Policy Decision Point CLI
//!
//! The `pdp` binary runs the Policy Decision Point service and carries the
//! operator commands around it.
//!
//! ## Commands
//!
//! - `pdp serve` - Run the HTTP service
//! - `pdp update [--dry-run]` - Apply database migrations
//! - `pdp config show|validate|generate` - Configuration management
//! - `pdp schema convert|submit` - Annotated SDL to policy metadata
//! - `pdp decide --app <id> --field <schema:field>...` - Query a running PDP

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use pdp_cli::commands::{self, server_url, ConfigCommand, DecideCommand, SchemaCommand, UpdateCommand};
use pdp_cli::logging::init_logging;
use pdp_cli::server::{start_server, ServeOptions};

/// Policy Decision Point - field-level access decisions for the data exchange
#[derive(Parser)]
#[command(name = "pdp")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "PDP_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP API port (default: from config, 8080)
    #[arg(long, global = true, env = "PDP_PORT")]
    port: Option<u16>,

    /// HTTP API host (default: from config, 0.0.0.0)
    #[arg(long, global = true, env = "PDP_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PDP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Policy Decision Point HTTP service
    #[command(name = "serve")]
    Serve,

    /// Update PDP database
    #[command(name = "update")]
    Update {
        #[command(flatten)]
        command: UpdateCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Annotated schema operations
    #[command(name = "schema")]
    Schema {
        #[command(subcommand)]
        command: SchemaCommand,
    },

    /// Request an access decision from a running PDP
    #[command(name = "decide")]
    Decide {
        #[command(flatten)]
        command: DecideCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // serve picks its log format from the config file
    if !matches!(cli.command, Some(Commands::Serve)) {
        init_logging(&cli.log_level, "compact")?;
    }

    let default_url = server_url(cli.host.as_deref(), cli.port);
    match cli.command {
        Some(Commands::Serve) => {
            start_server(ServeOptions {
                config_path: cli.config,
                host: cli.host,
                port: cli.port,
                log_level: cli.log_level,
            })
            .await
        }
        Some(Commands::Update { command }) => commands::update::execute(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Schema { command }) => commands::schema::handle_command(command, default_url).await,
        Some(Commands::Decide { command }) => commands::decide::execute(command, default_url).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
