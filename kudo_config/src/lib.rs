//! # Kudo Config
//!
//! Configuration system for the Kudo engagement service.
//!
//! Provides TOML-based configuration parsing and validation for the HTTP
//! server, the LMDB storage backend, auth tokens, request limits, and the
//! audit log.
//!
//! # Configuration Schema
//!
//! The configuration file (`kudo.toml`) supports the following sections:
//! - `[server]` — HTTP server settings (host, port, log_level, log_format)
//! - `[storage]` — LMDB data directory and map size
//! - `[auth]` — Bearer token table mapping tokens to actors and roles
//! - `[limits]` — Request limits (batched count size)
//! - `[audit]` — Audit log capacity and retention
//!
//! # Environment Variable Overrides
//!
//! Config fields can be overridden via environment variables using the
//! `KUDO_` prefix and `_` as section separator:
//! - `KUDO_SERVER_HOST` → `server.host`
//! - `KUDO_SERVER_PORT` → `server.port`
//! - `KUDO_SERVER_LOG_LEVEL` → `server.log_level`
//! - `KUDO_SERVER_LOG_FORMAT` → `server.log_format`
//! - `KUDO_STORAGE_DATA_DIR` → `storage.data_dir`
//! - `KUDO_STORAGE_MAP_SIZE_MB` → `storage.map_size_mb`
//! - `KUDO_AUTH_ENABLED` → `auth.enabled`
//! - `KUDO_LIMITS_MAX_BATCH_SUBJECTS` → `limits.max_batch_subjects`
//! - `KUDO_AUDIT_MAX_ENTRIES` → `audit.max_entries`

use serde::{Deserialize, Serialize};

/// Top-level Kudo configuration.
///
/// Parsed from `kudo.toml` or constructed programmatically. Environment
/// variables with the `KUDO_` prefix override TOML values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KudoConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Request limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: "0.0.0.0").
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTP port (default: 8620).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level (default: "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format: "text" (default) or "json" for structured JSON logging.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8620
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// LMDB data directory (default: "./kudo-data").
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// LMDB memory map size in MiB (default: 1024).
    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            map_size_mb: default_map_size_mb(),
        }
    }
}

impl StorageConfig {
    /// Map size in bytes, as passed to the LMDB environment.
    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb * 1024 * 1024
    }
}

fn default_data_dir() -> String {
    "./kudo-data".to_string()
}
fn default_map_size_mb() -> usize {
    1024
}

/// Authentication settings.
///
/// When `enabled` is true, actor-gated and admin-gated requests must carry
/// `Authorization: Bearer <token>` where the token resolves against the
/// `tokens` table. When `enabled` is false (development mode), the actor id
/// is taken from the `X-Kudo-Actor` request header and every caller is
/// treated as admin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Whether bearer-token authentication is enforced.
    #[serde(default)]
    pub enabled: bool,
    /// Token table. The identity provider issues these out of band.
    #[serde(default)]
    pub tokens: Vec<ApiTokenEntry>,
}

/// One entry of the bearer token table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTokenEntry {
    /// Human-readable name, used in audit log entries.
    pub name: String,
    /// The bearer token value.
    pub token: String,
    /// Role granted to this token.
    #[serde(default = "default_role")]
    pub role: String,
    /// Actor id this token authenticates as. Required for the "actor" role;
    /// optional for service-to-service admin tokens.
    #[serde(default)]
    pub actor_id: Option<String>,
    /// Whether the token is currently accepted.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_role() -> String {
    "actor".to_string()
}
fn default_true() -> bool {
    true
}

/// Caller role resolved from the token table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRole {
    /// External collaborators: subject registration, bulk purges, audit.
    Admin,
    /// A registered end user: may toggle and read their own status.
    Actor,
}

impl AuthRole {
    pub fn parse_role(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(AuthRole::Admin),
            "actor" => Some(AuthRole::Actor),
            _ => None,
        }
    }

    /// Role ordering: admin implies actor.
    pub fn has_privilege(&self, required: AuthRole) -> bool {
        match (self, required) {
            (AuthRole::Admin, _) => true,
            (AuthRole::Actor, AuthRole::Actor) => true,
            (AuthRole::Actor, AuthRole::Admin) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthRole::Admin => "admin",
            AuthRole::Actor => "actor",
        }
    }
}

impl AuthConfig {
    /// Resolve a bearer token to `(role, actor_id, token_name)`.
    pub fn authenticate(
        &self,
        bearer_token: &str,
    ) -> Option<(AuthRole, Option<String>, String)> {
        for entry in &self.tokens {
            if entry.active && entry.token == bearer_token {
                if let Some(role) = AuthRole::parse_role(&entry.role) {
                    return Some((role, entry.actor_id.clone(), entry.name.clone()));
                }
            }
        }
        None
    }
}

/// Request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of subject ids accepted by the batched count endpoint
    /// (default: 100).
    #[serde(default = "default_max_batch_subjects")]
    pub max_batch_subjects: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_batch_subjects: default_max_batch_subjects(),
        }
    }
}

fn default_max_batch_subjects() -> usize {
    100
}

/// Audit logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Maximum retained entries; oldest are evicted past this (default: 10000).
    #[serde(default = "default_audit_max_entries")]
    pub max_entries: usize,
    /// Entries older than this many seconds are pruned (default: 7 days).
    #[serde(default = "default_audit_retention_secs")]
    pub retention_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_entries: default_audit_max_entries(),
            retention_secs: default_audit_retention_secs(),
        }
    }
}

fn default_audit_max_entries() -> usize {
    10_000
}
fn default_audit_retention_secs() -> u64 {
    7 * 24 * 3600
}

impl KudoConfig {
    /// Load configuration from a TOML file, apply env overrides, validate.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path, e))?;
        Self::parse_toml(&contents)
    }

    /// Parse configuration from a TOML string, apply env overrides, validate.
    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        let mut config: KudoConfig =
            toml::from_str(toml_str).map_err(|e| anyhow::anyhow!("Invalid config TOML: {}", e))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `KUDO_*` environment variable overrides on top of parsed values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("KUDO_SERVER_HOST") {
            self.server.host = v;
        }
        if let Ok(v) = std::env::var("KUDO_SERVER_PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("KUDO_SERVER_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Ok(v) = std::env::var("KUDO_SERVER_LOG_FORMAT") {
            self.server.log_format = v;
        }
        if let Ok(v) = std::env::var("KUDO_STORAGE_DATA_DIR") {
            self.storage.data_dir = v;
        }
        if let Ok(v) = std::env::var("KUDO_STORAGE_MAP_SIZE_MB") {
            if let Ok(mb) = v.parse() {
                self.storage.map_size_mb = mb;
            }
        }
        if let Ok(v) = std::env::var("KUDO_AUTH_ENABLED") {
            self.auth.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("KUDO_LIMITS_MAX_BATCH_SUBJECTS") {
            if let Ok(n) = v.parse() {
                self.limits.max_batch_subjects = n;
            }
        }
        if let Ok(v) = std::env::var("KUDO_AUDIT_MAX_ENTRIES") {
            if let Ok(n) = v.parse() {
                self.audit.max_entries = n;
            }
        }
    }

    /// Validate cross-field constraints. Called on startup; a misconfigured
    /// server refuses to boot rather than limping.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be non-zero");
        }
        if !matches!(self.server.log_format.as_str(), "text" | "json") {
            anyhow::bail!(
                "server.log_format must be \"text\" or \"json\", got {:?}",
                self.server.log_format
            );
        }
        if self.storage.data_dir.is_empty() {
            anyhow::bail!("storage.data_dir must not be empty");
        }
        if self.storage.map_size_mb == 0 {
            anyhow::bail!("storage.map_size_mb must be non-zero");
        }
        if self.limits.max_batch_subjects == 0 {
            anyhow::bail!("limits.max_batch_subjects must be non-zero");
        }
        for entry in &self.auth.tokens {
            if AuthRole::parse_role(&entry.role).is_none() {
                anyhow::bail!(
                    "auth token {:?} has unknown role {:?} (expected \"admin\" or \"actor\")",
                    entry.name,
                    entry.role
                );
            }
            if entry.role == "actor" && entry.actor_id.is_none() {
                anyhow::bail!(
                    "auth token {:?} has role \"actor\" but no actor_id",
                    entry.name
                );
            }
            if entry.token.is_empty() {
                anyhow::bail!("auth token {:?} has an empty token value", entry.name);
            }
        }
        Ok(())
    }

    /// Generate an example `kudo.toml` with inline documentation.
    pub fn example_toml() -> String {
        r#"# Kudo engagement service configuration.
# Every field can be overridden with a KUDO_* environment variable,
# e.g. KUDO_SERVER_PORT=9000.

[server]
# Bind address and port for the REST API.
host = "0.0.0.0"
port = 8620
# Log level: trace, debug, info, warn, error.
log_level = "info"
# Log format: "text" or "json".
log_format = "text"

[storage]
# LMDB data directory. Created on first start.
data_dir = "./kudo-data"
# LMDB memory map size in MiB.
map_size_mb = 1024

[auth]
# When false (development mode), the actor id is read from the
# X-Kudo-Actor header and every caller is admin.
enabled = false

# Bearer tokens. role "actor" requires actor_id; role "admin" is for
# external collaborators (content store, identity provider).
# [[auth.tokens]]
# name = "alice-phone"
# token = "change-me"
# role = "actor"
# actor_id = "alice"
#
# [[auth.tokens]]
# name = "content-store"
# token = "change-me-too"
# role = "admin"

[limits]
# Maximum subject ids per batched count request.
max_batch_subjects = 100

[audit]
# In-memory audit log bounds.
max_entries = 10000
retention_secs = 604800
"#
        .to_string()
    }
}
