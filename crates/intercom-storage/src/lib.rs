// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the intercom call core.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! connection via `tokio-rusqlite`, the directory tables the lifecycle service
//! resolves against, and the atomic conditional writes behind answer, decline
//! and end.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteCallStore;
pub use database::Database;
pub use models::{ApartmentSeed, BuildingSeed, DirectorySeed, ProfileSeed, SeedReport};
