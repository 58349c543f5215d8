// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded schema migrations.
//!
//! The SQL files under `migrations/` are compiled into the binary by refinery
//! and applied every time a [`crate::Database`] is opened.

use intercom_core::IntercomError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Applies every pending migration, tracked in `refinery_schema_history`.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), IntercomError> {
    let report = embedded::migrations::runner()
        .run(conn)
        .map_err(|e| IntercomError::Storage {
            source: Box::new(e),
        })?;
    for migration in report.applied_migrations() {
        tracing::debug!(version = migration.version(), name = %migration.name(), "migration applied");
    }
    Ok(())
}
