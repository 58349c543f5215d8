// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the intercom call signaling and lifecycle core.
//!
//! This crate provides the domain types (calls, participants, token bundles,
//! peer signals), the error taxonomy, the REST wire types and the adapter
//! traits implemented by the store, the SDK bindings and the API clients.

pub mod api;
pub mod clock;
pub mod error;
pub mod signal;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, SystemClock};
pub use error::{ErrorKind, IntercomError};
pub use signal::{RtmSignal, SignalType};
pub use types::{
    AdapterType, CALL_CHANNEL_PREFIX, Apartment, Call, CallId, CallSnapshot, CallStatus, HealthStatus, Participant,
    ParticipantStatus, Profile, TokenBundle, TokenRole, UserType,
};

pub use traits::{CallApi, CallStore, MediaAdapter, MessagingAdapter, PluginAdapter};
