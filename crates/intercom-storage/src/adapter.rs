// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`CallStore`] trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use intercom_config::model::StorageConfig;
use intercom_core::api::{HistoryPage, HistoryQuery};
use intercom_core::traits::{AnswerWrite, DeclineWrite, EndWrite};
use intercom_core::{
    AdapterType, Apartment, Call, CallId, CallSnapshot, CallStore, HealthStatus, IntercomError,
    Participant, PluginAdapter, Profile,
};

use crate::database::Database;
use crate::models::{DirectorySeed, SeedReport};
use crate::queries;

/// SQLite-backed Call Store.
///
/// The database is opened by [`CallStore::initialize`]; every other method
/// fails with a storage error until then.
pub struct SqliteCallStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteCallStore {
    /// Creates a store for the configured database file without opening it.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wraps an already-open database.
    pub fn with_database(db: Database) -> Self {
        Self {
            config: StorageConfig {
                database_path: ":memory:".to_string(),
                wal_mode: false,
            },
            db: OnceCell::new_with(Some(db)),
        }
    }

    fn db(&self) -> Result<&Database, IntercomError> {
        self.db.get().ok_or_else(|| IntercomError::Storage {
            source: "call store not initialized -- call initialize() first".into(),
        })
    }

    /// Loads a directory seed (buildings, profiles, apartments, residents).
    pub async fn seed(&self, seed: DirectorySeed) -> Result<SeedReport, IntercomError> {
        let report = queries::directory::apply_seed(self.db()?, seed).await?;
        debug!(
            buildings = report.buildings,
            profiles = report.profiles,
            apartments = report.apartments,
            residents = report.residents,
            "directory seeded"
        );
        Ok(report)
    }
}

#[async_trait]
impl PluginAdapter for SqliteCallStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, IntercomError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".to_string()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> { conn.execute_batch("SELECT 1;") })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), IntercomError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl CallStore for SqliteCallStore {
    async fn initialize(&self) -> Result<(), IntercomError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| IntercomError::Storage {
            source: "call store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite call store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), IntercomError> {
        self.db()?.checkpoint().await
    }

    async fn find_apartment(
        &self,
        building_id: &str,
        number: &str,
    ) -> Result<Option<Apartment>, IntercomError> {
        queries::directory::find_apartment(self.db()?, building_id, number).await
    }

    async fn find_profile(&self, profile_id: &str) -> Result<Option<Profile>, IntercomError> {
        queries::directory::find_profile(self.db()?, profile_id).await
    }

    async fn active_residents(&self, apartment_id: &str) -> Result<Vec<Profile>, IntercomError> {
        queries::directory::active_residents(self.db()?, apartment_id).await
    }

    async fn insert_call(
        &self,
        call: &Call,
        participants: &[Participant],
    ) -> Result<(), IntercomError> {
        queries::calls::insert_call(self.db()?, call, participants).await
    }

    async fn get_call(&self, id: &CallId) -> Result<Option<CallSnapshot>, IntercomError> {
        queries::calls::get_call(self.db()?, id).await
    }

    async fn answer_call(
        &self,
        id: &CallId,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<AnswerWrite, IntercomError> {
        queries::calls::answer_call(self.db()?, id, user_id, at).await
    }

    async fn decline_call(
        &self,
        id: &CallId,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<DeclineWrite, IntercomError> {
        queries::calls::decline_call(self.db()?, id, user_id, at).await
    }

    async fn end_call(
        &self,
        id: &CallId,
        ended_by: Option<&str>,
        cause: &str,
        at: DateTime<Utc>,
    ) -> Result<EndWrite, IntercomError> {
        queries::calls::end_call(self.db()?, id, ended_by, cause, at).await
    }

    async fn call_history(&self, query: &HistoryQuery) -> Result<HistoryPage, IntercomError> {
        queries::calls::call_history(self.db()?, query).await
    }

    async fn open_calls(&self, building_id: &str) -> Result<Vec<Call>, IntercomError> {
        queries::calls::open_calls(self.db()?, building_id).await
    }

    async fn pending_calls_for(&self, user_id: &str) -> Result<Vec<Call>, IntercomError> {
        queries::calls::pending_calls_for(self.db()?, user_id).await
    }

    async fn ringing_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<CallId>, IntercomError> {
        queries::calls::ringing_before(self.db()?, cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn uninitialized_store_reports_unhealthy() {
        let store = SqliteCallStore::new(StorageConfig::default());
        assert!(matches!(
            store.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
        assert!(store.get_call(&CallId::from("c1")).await.is_err());
    }

    #[tokio::test]
    async fn initialize_twice_fails() {
        let dir = tempdir().unwrap();
        let store = SqliteCallStore::new(StorageConfig {
            database_path: dir.path().join("calls.db").display().to_string(),
            wal_mode: true,
        });
        store.initialize().await.unwrap();
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        assert!(store.initialize().await.is_err());
        store.close().await.unwrap();
        store.shutdown().await.unwrap();
    }
}
