// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! PDP HTTP server bootstrap
//!
//! Loads the manifest, connects the policy metadata store, starts the audit
//! sink and serves the policy router until Ctrl+C / SIGTERM.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use pdp_core::application::repository_factory::create_field_policy_repository;
use pdp_core::domain::config::{BackendKind, PdpConfigManifest};
use pdp_core::infrastructure::audit_sink_from_config;
use pdp_core::infrastructure::db::Database;
use pdp_core::presentation::api::{app, AppState};

use crate::commands::update::pending_migrations;
use crate::logging::init_logging;

const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Command-line values that take precedence over the manifest.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: String,
}

pub async fn start_server(options: ServeOptions) -> Result<()> {
    let (mut config, notices) =
        PdpConfigManifest::load(options.config_path).context("Failed to load configuration")?;
    if let Some(host) = options.host {
        config.spec.server.host = host;
    }
    if let Some(port) = options.port {
        config.spec.server.port = port;
    }

    let observability = config.spec.observability.clone().unwrap_or_default();
    init_logging(&options.log_level, &observability.log_format)?;
    for notice in &notices {
        notice.emit();
    }

    config.validate().context("Configuration validation failed")?;
    info!("Configuration loaded: name={}", config.metadata.name);

    if let Some(port) = observability.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics listening on {}", addr);
    }

    let database = match config.spec.database.backend {
        BackendKind::Postgres => {
            let db = Database::connect(&config.spec.database).await?;
            let pending = pending_migrations(db.get_pool()).await;
            if !pending.is_empty() {
                warn!(
                    pending = pending.len(),
                    "Database schema has pending migrations; run `pdp update`"
                );
            }
            Some(db)
        }
        BackendKind::InMemory => {
            warn!("Using in-memory policy store; all policy metadata is lost on shutdown");
            None
        }
    };

    let repository = create_field_policy_repository(&config.spec.database.storage_backend(), database.as_ref())
        .context("Failed to initialize policy metadata repository")?;
    let (audit, audit_worker) =
        audit_sink_from_config(config.spec.audit.as_ref()).context("Failed to initialize audit sink")?;

    let router = app(Arc::new(AppState::new(repository, audit)));

    let addr = format!("{}:{}", config.spec.server.host, config.spec.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Policy Decision Point listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // The router (and with it the last audit sender) is gone; let the worker flush.
    if let Some(worker) = audit_worker {
        if tokio::time::timeout(AUDIT_DRAIN_TIMEOUT, worker).await.is_err() {
            warn!("Audit queue not drained within {:?}; remaining events dropped", AUDIT_DRAIN_TIMEOUT);
        }
    }

    info!("Policy Decision Point shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
