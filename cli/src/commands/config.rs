// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use pdp_core::domain::config::{BackendKind, PdpConfigManifest};

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./pdp-config.yaml)
        #[arg(short, long, default_value = "./pdp-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(&output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = PdpConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. PDP_CONFIG_PATH: {}",
            std::env::var("PDP_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./pdp-config.yaml");
        println!("  4. ~/.pdp/config.yaml");
        println!("  5. /etc/pdp/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", config.spec.server.host, config.spec.server.port);
    println!();

    let db = &config.spec.database;
    println!("{}", "Policy Store:".bold());
    match db.backend {
        BackendKind::Postgres => {
            println!("  Backend: postgres");
            println!("  URL: {}", db.redacted_url());
            println!(
                "  Password: {}",
                if db.resolve_password().is_some() { "(set)" } else { "(not set)" }
            );
            println!("  Pool: {}..{} connections", db.min_connections, db.max_connections);
        }
        BackendKind::InMemory => println!("  Backend: in_memory"),
    }
    println!();

    println!("{}", "Audit:".bold());
    match config.spec.audit.as_ref().and_then(|a| a.endpoint.as_deref().map(|e| (a, e))) {
        Some((audit, endpoint)) => {
            println!("  Endpoint: {}/api/audit-logs", endpoint.trim_end_matches('/'));
            println!("  Timeout: {}ms", audit.timeout_ms);
            println!("  Queue capacity: {}", audit.queue_capacity);
        }
        None => println!("  Endpoint: {}", "(log only)".dimmed()),
    }
    println!();

    let observability = config.spec.observability.clone().unwrap_or_default();
    println!("{}", "Observability:".bold());
    println!("  Log format: {}", observability.log_format);
    match observability.metrics_port {
        Some(port) => println!("  Metrics: 0.0.0.0:{}", port),
        None => println!("  Metrics: {}", "(disabled)".dimmed()),
    }
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = PdpConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, with_examples: bool) -> Result<()> {
    let sample = if with_examples { EXAMPLES_TEMPLATE } else { MINIMAL_TEMPLATE };

    std::fs::write(output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid_manifests() {
        for template in [MINIMAL_TEMPLATE, EXAMPLES_TEMPLATE] {
            let config = PdpConfigManifest::from_yaml_str(template).unwrap();
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_generate_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pdp-config.yaml");

        generate(&path, true).unwrap();
        let config = PdpConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(config.spec.server.port, 8080);
        assert_eq!(config.spec.observability.unwrap().metrics_port, Some(9091));
        assert!(validate(Some(path)).is_ok());
    }
}
