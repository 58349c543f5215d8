// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `intercom seed`: loads a directory file into the call store.

use std::path::Path;

use intercom_config::IntercomConfig;
use intercom_core::{IntercomError, PluginAdapter};
use intercom_storage::{DirectorySeed, SeedReport};
use tracing::info;

use crate::serve::open_store;

/// Parses a TOML directory file.
pub fn parse_directory(content: &str) -> Result<DirectorySeed, IntercomError> {
    toml::from_str(content)
        .map_err(|e| IntercomError::Validation(format!("invalid directory file: {e}")))
}

/// Seeds the configured store from `file`. Re-running with the same file
/// leaves the store unchanged.
pub async fn run_seed(config: &IntercomConfig, file: &Path) -> Result<SeedReport, IntercomError> {
    let content = std::fs::read_to_string(file).map_err(|e| {
        IntercomError::Validation(format!("cannot read {}: {e}", file.display()))
    })?;
    let directory = parse_directory(&content)?;

    let store = open_store(config).await?;
    let report = store.seed(directory).await?;
    store.shutdown().await?;

    info!(
        file = %file.display(),
        buildings = report.buildings,
        profiles = report.profiles,
        apartments = report.apartments,
        residents = report.residents,
        "directory loaded"
    );
    Ok(report)
}
