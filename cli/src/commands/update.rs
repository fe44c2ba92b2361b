// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Database Update Command
//!
//! Implements `pdp update`, which applies the bundled `policy_metadata`
//! migrations to the configured PostgreSQL database.
//!
//! # Usage
//!
//! ```bash
//! # Apply all pending migrations
//! pdp update
//!
//! # Preview migrations without applying
//! pdp update --dry-run
//! ```
//!
//! The connection comes from `spec.database` (with `PDP_DATABASE_*`
//! overrides), or from `--database-url` / `PDP_DATABASE_URL` when given.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sqlx::migrate::Migration;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::PathBuf;

use pdp_core::domain::config::PdpConfigManifest;
use pdp_core::infrastructure::db::connect_options;

use crate::MIGRATOR;

#[derive(Args)]
pub struct UpdateCommand {
    /// Perform a dry run without applying changes
    #[arg(long)]
    dry_run: bool,

    /// Connection URL; overrides spec.database
    #[arg(long, env = "PDP_DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
}

/// Bundled migrations not yet recorded as applied.
///
/// A database without the migrations table reports every migration pending.
pub async fn pending_migrations(pool: &PgPool) -> Vec<&'static Migration> {
    let applied: Vec<i64> = sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success")
        .fetch_all(pool)
        .await
        .unwrap_or_default();

    MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration() && !applied.contains(&m.version))
        .collect()
}

pub async fn execute(cmd: UpdateCommand, config_path: Option<PathBuf>) -> Result<()> {
    println!("{}", "PDP Update".bold().green());

    println!("Connecting to database...");
    let pool_options = PgPoolOptions::new().max_connections(1);
    let pool = match cmd.database_url {
        Some(url) => pool_options.connect(&url).await,
        None => {
            let config =
                PdpConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
            println!("  {}", config.spec.database.redacted_url().dimmed());
            pool_options.connect_with(connect_options(&config.spec.database)?).await
        }
    }
    .context("Failed to connect to database")?;

    let pending = pending_migrations(&pool).await;
    let total = MIGRATOR.iter().filter(|m| !m.migration_type.is_down_migration()).count();

    println!(
        "Migration status: {} applied, {} total available.",
        total - pending.len(),
        total
    );

    if pending.is_empty() {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    if cmd.dry_run {
        println!("Pending migrations found (Dry Run):");
        for migration in &pending {
            println!(" - {} {}", migration.version, migration.description);
        }
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    MIGRATOR.run(&pool).await.context("Failed to apply migrations")?;
    println!("{}", "✓ Database updated successfully.".green());

    Ok(())
}
