// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./intercom.toml` > `~/.config/intercom/intercom.toml`
//! > `/etc/intercom/intercom.toml` with environment variable overrides via the
//! `INTERCOM_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::IntercomConfig;

/// Top-level sections, used to split `INTERCOM_<SECTION>_<KEY>` variables.
pub const SECTIONS: &[&str] = &["logging", "server", "storage", "tokens", "calls", "client"];

const SYSTEM_CONFIG: &str = "/etc/intercom/intercom.toml";
const LOCAL_CONFIG: &str = "intercom.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/intercom/intercom.toml` (system-wide)
/// 3. `~/.config/intercom/intercom.toml` (user XDG config)
/// 4. `./intercom.toml` (local directory)
/// 5. `INTERCOM_*` environment variables
pub fn load_config() -> Result<IntercomConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<IntercomConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(IntercomConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<IntercomConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(IntercomConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(IntercomConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// `~/.config/intercom/intercom.toml`, if the platform has a config dir.
pub fn user_config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|d| d.join("intercom").join("intercom.toml"))
}

/// Candidate config file paths, lowest precedence first.
pub fn config_file_candidates() -> Vec<std::path::PathBuf> {
    let mut paths = vec![std::path::PathBuf::from(SYSTEM_CONFIG)];
    paths.extend(user_config_path());
    paths.push(
        std::env::current_dir()
            .map(|d| d.join(LOCAL_CONFIG))
            .unwrap_or_else(|_| LOCAL_CONFIG.into()),
    );
    paths
}

/// Create the environment variable provider.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `INTERCOM_SERVER_BEARER_TOKEN` must become
/// `server.bearer_token`, not `server.bearer.token`.
fn env_provider() -> Env {
    Env::prefixed("INTERCOM_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env key to its dotted config path.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
