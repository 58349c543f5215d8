// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end call tests.
//!
//! `TestHarness` assembles a temp SQLite Call Store seeded with a small
//! directory, a token issuer, the call service, a manual clock and an
//! in-memory SDK network for client devices.

use std::sync::Arc;

use intercom_calls::CallService;
use intercom_config::IntercomConfig;
use intercom_core::{CallStore, IntercomError, UserType};
use intercom_storage::{ApartmentSeed, BuildingSeed, DirectorySeed, ProfileSeed, SqliteCallStore};
use intercom_tokens::TokenIssuer;

use crate::clock::ManualClock;
use crate::local_api::LocalCallApi;
use crate::mock_sdk::MockNetwork;

/// Building every harness directory lives in.
pub const BUILDING_ID: &str = "b1";

/// Doorman seeded by default.
pub const DOORMAN_ID: &str = "d1";

/// Builder for configuring a [`TestHarness`].
pub struct TestHarnessBuilder {
    apartments: Vec<(String, Vec<String>)>,
    config: IntercomConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = IntercomConfig::default();
        config.tokens.app_id = Some("intercom-test".to_string());
        config.tokens.app_certificate = Some("intercom-test-certificate".to_string());
        Self {
            apartments: Vec::new(),
            config,
        }
    }

    /// Adds an apartment whose residents are created as resident profiles.
    /// Without any, apartment "302" with residents `r1` and `r2` is seeded.
    pub fn with_apartment(mut self, number: &str, residents: &[&str]) -> Self {
        self.apartments.push((
            number.to_string(),
            residents.iter().map(|r| r.to_string()).collect(),
        ));
        self
    }

    /// Sets the default token TTL.
    pub fn with_token_ttl(mut self, secs: u64) -> Self {
        self.config.tokens.default_ttl_secs = secs;
        self.config.tokens.max_ttl_secs = self.config.tokens.max_ttl_secs.max(secs);
        self
    }

    /// Leaves the issuer without a certificate so every mint fails.
    pub fn without_certificate(mut self) -> Self {
        self.config.tokens.app_certificate = None;
        self
    }

    /// Adjusts any other configuration value.
    pub fn with_config(mut self, edit: impl FnOnce(&mut IntercomConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    fn directory(&self) -> DirectorySeed {
        let apartments = if self.apartments.is_empty() {
            vec![("302".to_string(), vec!["r1".to_string(), "r2".to_string()])]
        } else {
            self.apartments.clone()
        };

        let profile = |id: &str, user_type| ProfileSeed {
            id: id.to_string(),
            full_name: format!("Test {id}"),
            user_type,
            building_id: Some(BUILDING_ID.to_string()),
        };
        let mut profiles = vec![profile(DOORMAN_ID, UserType::Doorman)];
        for (_, residents) in &apartments {
            for resident in residents {
                if !profiles.iter().any(|p| &p.id == resident) {
                    profiles.push(profile(resident, UserType::Resident));
                }
            }
        }

        DirectorySeed {
            buildings: vec![BuildingSeed {
                id: BUILDING_ID.to_string(),
                name: "Test Tower".to_string(),
                address: None,
            }],
            profiles,
            apartments: apartments
                .into_iter()
                .map(|(number, residents)| ApartmentSeed {
                    id: format!("apt-{number}"),
                    building_id: BUILDING_ID.to_string(),
                    number,
                    block: None,
                    residents,
                    former_residents: Vec::new(),
                })
                .collect(),
        }
    }

    /// Builds the harness, creating and seeding the temp database.
    pub async fn build(mut self) -> Result<TestHarness, IntercomError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| IntercomError::Storage { source: e.into() })?;
        self.config.storage.database_path = temp_dir
            .path()
            .join("intercom-test.db")
            .to_string_lossy()
            .to_string();

        let store = SqliteCallStore::new(self.config.storage.clone());
        store.initialize().await?;
        store.seed(self.directory()).await?;
        let store = Arc::new(store);

        let clock = Arc::new(ManualClock::starting_now());
        let issuer = Arc::new(TokenIssuer::with_clock(&self.config.tokens, clock.clone()));
        let service = Arc::new(CallService::new(
            store.clone(),
            issuer.clone(),
            clock.clone(),
            self.config.calls.clone(),
        ));
        let api = Arc::new(LocalCallApi::new(service.clone()));

        Ok(TestHarness {
            service,
            store,
            issuer,
            api,
            clock,
            network: MockNetwork::new(),
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete server-side environment plus an SDK network for devices.
pub struct TestHarness {
    /// The call lifecycle service.
    pub service: Arc<CallService>,
    /// SQLite Call Store (temp DB, cleaned up on drop).
    pub store: Arc<SqliteCallStore>,
    /// Token issuer sharing the harness clock.
    pub issuer: Arc<TokenIssuer>,
    /// In-process API for client state machines.
    pub api: Arc<LocalCallApi>,
    /// Clock used by the service and the issuer.
    pub clock: Arc<ManualClock>,
    /// Transport shared by every mock device.
    pub network: Arc<MockNetwork>,
    /// Effective configuration.
    pub config: IntercomConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use intercom_core::api::StartCallRequest;

    use super::*;

    #[tokio::test]
    async fn default_harness_seeds_apartment_302() {
        let harness = TestHarness::builder().build().await.unwrap();
        let started = harness
            .service
            .start(&StartCallRequest {
                apartment_number: "302".into(),
                building_id: BUILDING_ID.into(),
                doorman_id: Some(DOORMAN_ID.into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(started.signaling.targets, vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn custom_apartments_replace_the_default() {
        let harness = TestHarness::builder()
            .with_apartment("101", &["a", "b", "c"])
            .with_token_ttl(45)
            .build()
            .await
            .unwrap();
        let request = |number: &str| StartCallRequest {
            apartment_number: number.into(),
            building_id: BUILDING_ID.into(),
            doorman_id: Some(DOORMAN_ID.into()),
            ..Default::default()
        };
        assert!(harness.service.start(&request("302")).await.is_err());
        let started = harness.service.start(&request("101")).await.unwrap();
        assert_eq!(started.signaling.targets.len(), 3);
        assert_eq!(started.tokens.initiator.ttl_seconds, 45);
    }
}
