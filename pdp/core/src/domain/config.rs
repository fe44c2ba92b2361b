// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Policy Decision Point Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) covering:
// - HTTP listener
// - Policy metadata store connection and pool sizing
// - Audit sink endpoint and queue
// - Logging format and Prometheus listener

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "pdp.opendif.io/v1";
pub const KIND: &str = "PdpConfig";

const SSL_MODES: &[&str] = &["disable", "allow", "prefer", "require", "verify-ca", "verify-full"];

/// Top-level Kubernetes-style PDP configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdpConfigManifest {
    /// API version (must be "pdp.opendif.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "PdpConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: PdpConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable instance name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Content under spec:
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PdpConfigSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    /// Audit sink. Absent or without endpoint: audit events are only logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    InMemory,
    #[default]
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_username")]
    pub username: String,

    /// Literal password or `env:VAR_NAME`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_db_name")]
    pub database: String,

    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            host: default_db_host(),
            port: default_db_port(),
            username: default_db_username(),
            password: Some("env:PDP_DATABASE_PASSWORD".to_string()),
            database: default_db_name(),
            ssl_mode: default_ssl_mode(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
        }
    }
}

impl DatabaseConfig {
    /// Resolve the password, following `env:VAR` indirection.
    pub fn resolve_password(&self) -> Option<String> {
        match self.password.as_deref() {
            Some(value) => match value.strip_prefix("env:") {
                Some(var) => std::env::var(var).ok(),
                None => Some(value.to_string()),
            },
            None => None,
        }
    }

    /// Connection URL without credentials, for logs.
    pub fn redacted_url(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}?sslmode={}",
            self.username, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn storage_backend(&self) -> StorageBackend {
        match self.backend {
            BackendKind::InMemory => StorageBackend::InMemory,
            BackendKind::Postgres => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: self.redacted_url(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Base URL of the audit service; events go to `<endpoint>/api/audit-logs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_audit_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_audit_queue")]
    pub queue_capacity: usize,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_audit_timeout(),
            queue_capacity: default_audit_queue(),
            service_name: default_service_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Prometheus scrape listener; disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_username() -> String {
    "postgres".to_string()
}

fn default_db_name() -> String {
    "pdp".to_string()
}

fn default_ssl_mode() -> String {
    "require".to_string()
}

fn default_max_connections() -> u32 {
    25
}

fn default_min_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    1800
}

fn default_max_lifetime() -> u64 {
    3600
}

fn default_audit_timeout() -> u64 {
    5000
}

fn default_audit_queue() -> usize {
    1024
}

fn default_service_name() -> String {
    "policy-decision-point".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for PdpConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "pdp".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: PdpConfigSpec::default(),
        }
    }
}

impl PdpConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. PDP_CONFIG_PATH environment variable
    /// 2. ./pdp-config.yaml (working directory)
    /// 3. ~/.pdp/config.yaml (user home)
    /// 4. /etc/pdp/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PDP_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./pdp-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".pdp").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/pdp/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let (config, notices) = Self::load(cli_path)?;
        for notice in &notices {
            notice.emit();
        }
        Ok(config)
    }

    /// Same as [`load_or_default`](Self::load_or_default) but hands back the
    /// source and override notices instead of logging them, for callers that
    /// install their subscriber from the loaded manifest.
    pub fn load(cli_path: Option<PathBuf>) -> anyhow::Result<(Self, Vec<ConfigNotice>)> {
        let mut notices = Vec::new();
        let mut config = if let Some(path) = cli_path {
            notices.push(ConfigNotice::info(format!("Loading configuration from explicit path: {:?}", path)));
            Self::from_yaml_file(&path).map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?
        } else if let Some(config_path) = Self::discover_config() {
            notices.push(ConfigNotice::info(format!(
                "Loading configuration from discovered path: {:?}",
                config_path
            )));
            Self::from_yaml_file(config_path)?
        } else {
            notices.push(ConfigNotice::warn(
                "No configuration file found in standard locations. Using defaults.",
            ));
            Self::default()
        };

        notices.extend(config.apply_env_overrides());
        Ok((config, notices))
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) -> Vec<ConfigNotice> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<ConfigNotice> {
        let mut notices = Vec::new();
        let db = &mut self.spec.database;

        if let Some(val) = lookup("PDP_DATABASE_HOST") {
            notices.push(ConfigNotice::info(format!("Environment override: PDP_DATABASE_HOST={}", val)));
            db.host = val;
        }
        if let Some(val) = lookup("PDP_DATABASE_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    notices.push(ConfigNotice::info(format!("Environment override: PDP_DATABASE_PORT={}", port)));
                    db.port = port;
                }
                Err(_) => notices.push(ConfigNotice::warn(format!(
                    "Invalid value for PDP_DATABASE_PORT: '{}'. Ignoring.",
                    val
                ))),
            }
        }
        if let Some(val) = lookup("PDP_DATABASE_USERNAME") {
            notices.push(ConfigNotice::info(format!("Environment override: PDP_DATABASE_USERNAME={}", val)));
            db.username = val;
        }
        if let Some(val) = lookup("PDP_DATABASE_PASSWORD") {
            notices.push(ConfigNotice::info("Environment override: PDP_DATABASE_PASSWORD=<redacted>"));
            db.password = Some(val);
        }
        if let Some(val) = lookup("PDP_DATABASE_NAME") {
            notices.push(ConfigNotice::info(format!("Environment override: PDP_DATABASE_NAME={}", val)));
            db.database = val;
        }
        if let Some(val) = lookup("PDP_DATABASE_SSLMODE") {
            notices.push(ConfigNotice::info(format!("Environment override: PDP_DATABASE_SSLMODE={}", val)));
            db.ssl_mode = val;
        }
        if let Some(val) = lookup("PDP_AUDIT_SERVICE_URL") {
            notices.push(ConfigNotice::info(format!("Environment override: PDP_AUDIT_SERVICE_URL={}", val)));
            let audit = self.spec.audit.get_or_insert_with(AuditConfig::default);
            audit.endpoint = if val.trim().is_empty() { None } else { Some(val) };
        }
        if let Some(val) = lookup("PDP_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    notices.push(ConfigNotice::info(format!("Environment override: PDP_PORT={}", port)));
                    self.spec.server.port = port;
                }
                Err(_) => notices.push(ConfigNotice::warn(format!("Invalid value for PDP_PORT: '{}'. Ignoring.", val))),
            }
        }

        notices
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let db = &self.spec.database;
        if db.backend == BackendKind::Postgres {
            if db.host.is_empty() {
                anyhow::bail!("spec.database.host cannot be empty");
            }
            if db.database.is_empty() {
                anyhow::bail!("spec.database.database cannot be empty");
            }
            if !SSL_MODES.contains(&db.ssl_mode.as_str()) {
                anyhow::bail!(
                    "Invalid spec.database.ssl_mode: '{}'. Expected one of {:?}",
                    db.ssl_mode,
                    SSL_MODES
                );
            }
            if db.max_connections == 0 {
                anyhow::bail!("spec.database.max_connections must be greater than zero");
            }
            if db.min_connections > db.max_connections {
                anyhow::bail!("spec.database.min_connections cannot exceed max_connections");
            }
        }

        if let Some(audit) = &self.spec.audit {
            if audit.queue_capacity == 0 {
                anyhow::bail!("spec.audit.queue_capacity must be greater than zero");
            }
            if audit.timeout_ms == 0 {
                anyhow::bail!("spec.audit.timeout_ms must be greater than zero");
            }
            if let Some(endpoint) = &audit.endpoint {
                let parsed = url::Url::parse(endpoint)
                    .map_err(|e| anyhow::anyhow!("Invalid spec.audit.endpoint '{}': {}", endpoint, e))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    anyhow::bail!("spec.audit.endpoint must use http or https: {}", endpoint);
                }
            }
        }

        if let Some(obs) = &self.spec.observability {
            if !matches!(obs.log_format.as_str(), "compact" | "json") {
                anyhow::bail!("Invalid spec.observability.log_format: '{}'", obs.log_format);
            }
        }

        Ok(())
    }
}

/// A message produced while loading the manifest, logged once a subscriber exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigNotice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warn,
}

impl ConfigNotice {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warn,
            message: message.into(),
        }
    }

    pub fn emit(&self) {
        match self.level {
            NoticeLevel::Info => tracing::info!("{}", self.message),
            NoticeLevel::Warn => tracing::warn!("{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = PdpConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.server.port, 8080);
        assert_eq!(manifest.spec.database.backend, BackendKind::Postgres);
        assert!(manifest.spec.audit.is_none());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing_with_defaults() {
        let yaml = r#"
apiVersion: pdp.opendif.io/v1
kind: PdpConfig
metadata:
  name: pdp-dev
spec:
  database:
    backend: in_memory
  audit:
    endpoint: http://audit-service:3001
"#;
        let manifest = PdpConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "pdp-dev");
        assert_eq!(manifest.spec.database.backend, BackendKind::InMemory);
        assert_eq!(manifest.spec.database.port, 5432);
        let audit = manifest.spec.audit.as_ref().unwrap();
        assert_eq!(audit.timeout_ms, 5000);
        assert_eq!(audit.service_name, "policy-decision-point");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut manifest = PdpConfigManifest::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.database.ssl_mode = "sometimes".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.database.ssl_mode = "disable".to_string();

        manifest.spec.database.max_connections = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.database.max_connections = 10;

        manifest.spec.audit = Some(AuditConfig {
            endpoint: Some("not a url".to_string()),
            ..Default::default()
        });
        assert!(manifest.validate().is_err());

        manifest.spec.audit = Some(AuditConfig {
            queue_capacity: 0,
            ..Default::default()
        });
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = PdpConfigManifest::default();
        let env = HashMap::from([
            ("PDP_DATABASE_HOST", "db.internal"),
            ("PDP_DATABASE_PORT", "not-a-port"),
            ("PDP_DATABASE_SSLMODE", "disable"),
            ("PDP_AUDIT_SERVICE_URL", "http://audit:3001"),
            ("PDP_PORT", "9090"),
        ]);
        let notices = manifest.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(manifest.spec.database.host, "db.internal");
        assert_eq!(manifest.spec.database.port, 5432);
        assert_eq!(manifest.spec.database.ssl_mode, "disable");
        assert_eq!(manifest.spec.server.port, 9090);
        assert_eq!(
            manifest.spec.audit.as_ref().and_then(|a| a.endpoint.as_deref()),
            Some("http://audit:3001")
        );

        assert_eq!(notices.len(), 5);
        assert!(notices.contains(&ConfigNotice::info("Environment override: PDP_DATABASE_HOST=db.internal")));
        assert!(notices.contains(&ConfigNotice::warn(
            "Invalid value for PDP_DATABASE_PORT: 'not-a-port'. Ignoring."
        )));
    }

    #[test]
    fn test_override_notices_redact_password() {
        let mut manifest = PdpConfigManifest::default();
        let notices = manifest.apply_overrides_from(|key| match key {
            "PDP_DATABASE_PASSWORD" => Some("hunter2".to_string()),
            _ => None,
        });

        assert_eq!(manifest.spec.database.password.as_deref(), Some("hunter2"));
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Info);
        assert!(!notices[0].message.contains("hunter2"));
    }

    #[test]
    fn test_load_returns_source_notice() {
        let path = std::env::temp_dir().join(format!("pdp-config-{}.yaml", uuid::Uuid::new_v4()));
        PdpConfigManifest::default().to_yaml_file(&path).unwrap();

        let loaded = PdpConfigManifest::load(Some(path.clone()));
        std::fs::remove_file(&path).ok();

        let (config, notices) = loaded.unwrap();
        assert_eq!(config.kind, KIND);
        assert_eq!(notices[0].level, NoticeLevel::Info);
        assert!(notices[0].message.contains("explicit path"));
    }

    #[test]
    fn test_password_indirection() {
        let mut db = DatabaseConfig {
            password: Some("literal".to_string()),
            ..Default::default()
        };
        assert_eq!(db.resolve_password().as_deref(), Some("literal"));

        db.password = Some("env:PDP_TEST_PASSWORD_THAT_IS_NOT_SET".to_string());
        assert_eq!(db.resolve_password(), None);
        assert!(!db.redacted_url().contains("literal"));
    }
}
