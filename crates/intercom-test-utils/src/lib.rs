// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for intercom integration tests.
//!
//! Provides mock SDK adapters and a harness for fast, deterministic tests
//! without real media or messaging services.
//!
//! # Components
//!
//! - [`MockNetwork`] - in-memory transport shared by mock devices
//! - [`MockMedia`] / [`MockMessaging`] - SDK adapters publishing bus events
//! - [`LocalCallApi`] - in-process `CallApi` over the call service
//! - [`ManualClock`] - clock moved by hand
//! - [`TestHarness`] - seeded store, issuer, service and network

pub mod clock;
pub mod harness;
pub mod local_api;
pub mod mock_sdk;

pub use clock::ManualClock;
pub use harness::{BUILDING_ID, DOORMAN_ID, TestHarness};
pub use local_api::LocalCallApi;
pub use mock_sdk::{MockDevice, MockMedia, MockMessaging, MockNetwork};
