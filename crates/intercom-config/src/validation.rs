// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the semantic constraints serde cannot express: bind addresses,
//! TTL ordering, URL shape and non-zero timings.

use crate::diagnostic::ConfigError;
use crate::model::IntercomConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &IntercomConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let level = config.logging.level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "logging.level `{}` must be one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        )));
    }

    let host = config.server.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::validation("server.host must not be empty"));
    } else {
        let is_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_hostname = host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
        if !is_ip && !is_hostname {
            errors.push(ConfigError::validation(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            )));
        }
    }

    if let Some(token) = &config.server.bearer_token
        && token.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "server.bearer_token must not be blank; remove it to disable the API",
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    let tokens = &config.tokens;
    if tokens.default_ttl_secs == 0 {
        errors.push(ConfigError::validation(
            "tokens.default_ttl_secs must be greater than zero",
        ));
    }
    if tokens.max_ttl_secs < tokens.default_ttl_secs {
        errors.push(ConfigError::validation(format!(
            "tokens.max_ttl_secs ({}) must be at least tokens.default_ttl_secs ({})",
            tokens.max_ttl_secs, tokens.default_ttl_secs
        )));
    }
    if tokens.app_certificate.is_some() && tokens.app_id.is_none() {
        errors.push(ConfigError::validation(
            "tokens.app_id is required when tokens.app_certificate is set",
        ));
    }

    let calls = &config.calls;
    if calls.history_default_limit == 0 {
        errors.push(ConfigError::validation(
            "calls.history_default_limit must be greater than zero",
        ));
    }
    if calls.history_max_limit < calls.history_default_limit {
        errors.push(ConfigError::validation(format!(
            "calls.history_max_limit ({}) must be at least calls.history_default_limit ({})",
            calls.history_max_limit, calls.history_default_limit
        )));
    }
    if calls.ringing_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "calls.ringing_timeout_secs must be greater than zero",
        ));
    }
    if calls.default_schema_version == 0 {
        errors.push(ConfigError::validation(
            "calls.default_schema_version must be at least 1",
        ));
    }

    let client = &config.client;
    let url = client.api_base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(ConfigError::validation(format!(
            "client.api_base_url `{url}` must start with http:// or https://"
        )));
    }
    for (key, value) in [
        ("client.ringing_timeout_secs", client.ringing_timeout_secs),
        ("client.invite_poll_interval_ms", client.invite_poll_interval_ms),
        ("client.request_timeout_secs", client.request_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!(
                "{key} must be greater than zero"
            )));
        }
    }
    if client.renewal_lead_secs >= tokens.default_ttl_secs && tokens.default_ttl_secs > 0 {
        errors.push(ConfigError::validation(format!(
            "client.renewal_lead_secs ({}) must be shorter than tokens.default_ttl_secs ({})",
            client.renewal_lead_secs, tokens.default_ttl_secs
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
