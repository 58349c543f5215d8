// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level intercom configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IntercomConfig {
    /// Log filter settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP listener and API authentication.
    #[serde(default)]
    pub server: ServerConfig,

    /// Call Store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Token issuer credentials and TTL policy.
    #[serde(default)]
    pub tokens: TokenConfig,

    /// Call lifecycle policy.
    #[serde(default)]
    pub calls: CallsConfig,

    /// Client state machine timings.
    #[serde(default)]
    pub client: ClientConfig,
}

impl IntercomConfig {
    /// Renders the effective configuration as TOML, with secrets masked.
    pub fn to_redacted_toml(&self) -> Result<String, toml::ser::Error> {
        let mut copy = self.clone();
        if copy.server.bearer_token.is_some() {
            copy.server.bearer_token = Some("[redacted]".to_string());
        }
        if copy.tokens.app_certificate.is_some() {
            copy.tokens.app_certificate = Some("[redacted]".to_string());
        }
        toml::to_string_pretty(&copy)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP server configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared bearer token. `None` rejects every authenticated route.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            bearer_token: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("intercom").join("intercom.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("intercom.db"))
        .display()
        .to_string()
}

fn default_true() -> bool {
    true
}

/// Token issuer configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// Application identifier embedded in every token.
    #[serde(default)]
    pub app_id: Option<String>,

    /// Signing secret. Issuing fails while unset.
    #[serde(default)]
    pub app_certificate: Option<String>,

    /// TTL applied when a request does not ask for one.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Upper bound for requested TTLs.
    #[serde(default = "default_max_ttl_secs")]
    pub max_ttl_secs: u64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("app_id", &self.app_id)
            .field(
                "app_certificate",
                &self.app_certificate.as_ref().map(|_| "[redacted]"),
            )
            .field("default_ttl_secs", &self.default_ttl_secs)
            .field("max_ttl_secs", &self.max_ttl_secs)
            .finish()
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_certificate: None,
            default_ttl_secs: default_ttl_secs(),
            max_ttl_secs: default_max_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_max_ttl_secs() -> u64 {
    3600
}

/// Call lifecycle configuration (server side).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CallsConfig {
    /// Page size for history queries without a limit.
    #[serde(default = "default_history_limit")]
    pub history_default_limit: u32,

    /// Largest page size a history query may request.
    #[serde(default = "default_history_max_limit")]
    pub history_max_limit: u32,

    /// Calls still ringing after this many seconds are ended by the sweeper.
    #[serde(default = "default_ringing_timeout_secs")]
    pub ringing_timeout_secs: u64,

    /// Interval between stale-call sweeps. Zero disables the sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Signal schema version used when a start request does not send one.
    #[serde(default = "default_schema_version")]
    pub default_schema_version: u32,
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            history_default_limit: default_history_limit(),
            history_max_limit: default_history_max_limit(),
            ringing_timeout_secs: default_ringing_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            default_schema_version: default_schema_version(),
        }
    }
}

fn default_history_limit() -> u32 {
    50
}

fn default_history_max_limit() -> u32 {
    200
}

fn default_ringing_timeout_secs() -> u64 {
    45
}

fn default_sweep_interval_secs() -> u64 {
    15
}

fn default_schema_version() -> u32 {
    1
}

/// Client state machine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the call service.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Renew messaging credentials this many seconds before they expire.
    #[serde(default = "default_renewal_lead_secs")]
    pub renewal_lead_secs: u64,

    /// How long the `ended` state stays visible before returning to idle.
    #[serde(default = "default_idle_grace_ms")]
    pub idle_grace_ms: u64,

    /// Caller gives up and ends the call after this many seconds unanswered.
    #[serde(default = "default_ringing_timeout_secs")]
    pub ringing_timeout_secs: u64,

    /// Poll interval for the status of a pending incoming invite.
    #[serde(default = "default_invite_poll_interval_ms")]
    pub invite_poll_interval_ms: u64,

    /// Timeout for each REST request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            renewal_lead_secs: default_renewal_lead_secs(),
            idle_grace_ms: default_idle_grace_ms(),
            ringing_timeout_secs: default_ringing_timeout_secs(),
            invite_poll_interval_ms: default_invite_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:3001".to_string()
}

fn default_renewal_lead_secs() -> u64 {
    30
}

fn default_idle_grace_ms() -> u64 {
    2000
}

fn default_invite_poll_interval_ms() -> u64 {
    4000
}

fn default_request_timeout_secs() -> u64 {
    10
}
