// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row encoding helpers and the directory seed file model.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use intercom_core::UserType;
use rusqlite::types::Type;
use serde::Deserialize;

/// Encodes a timestamp as fixed-width RFC 3339 text so that lexical order
/// matches chronological order.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_ts(idx: usize, text: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn decode_opt_ts(
    idx: usize,
    text: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    text.map(|t| decode_ts(idx, t)).transpose()
}

/// Parses a strum-backed enum column.
pub(crate) fn decode_enum<T>(idx: usize, text: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Directory file loaded by `intercom seed`.
///
/// ```toml
/// [[buildings]]
/// id = "b1"
/// name = "Tower A"
///
/// [[profiles]]
/// id = "d1"
/// full_name = "Front Desk"
/// user_type = "doorman"
/// building_id = "b1"
///
/// [[apartments]]
/// id = "apt-302"
/// building_id = "b1"
/// number = "302"
/// residents = ["r1", "r2"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectorySeed {
    #[serde(default)]
    pub buildings: Vec<BuildingSeed>,
    #[serde(default)]
    pub profiles: Vec<ProfileSeed>,
    #[serde(default)]
    pub apartments: Vec<ApartmentSeed>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildingSeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSeed {
    pub id: String,
    pub full_name: String,
    pub user_type: UserType,
    #[serde(default)]
    pub building_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApartmentSeed {
    pub id: String,
    pub building_id: String,
    pub number: String,
    #[serde(default)]
    pub block: Option<String>,
    /// Profiles currently living here; they are rung on every call.
    #[serde(default)]
    pub residents: Vec<String>,
    /// Profiles linked to the apartment but no longer rung.
    #[serde(default)]
    pub former_residents: Vec<String>,
}

/// Row counts written by one seed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub buildings: usize,
    pub profiles: usize,
    pub apartments: usize,
    pub residents: usize,
}
