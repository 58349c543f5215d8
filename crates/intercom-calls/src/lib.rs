// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call Lifecycle Service: sole authority over call and participant state.
//!
//! [`CallService`] creates calls, resolves "first answer wins", records
//! declines and hangups, serves status and history reads, and mints token
//! bundles bound to live calls. [`spawn_sweeper`] ends calls left ringing.

pub mod service;
pub mod sweep;

pub use service::{CallService, DEFAULT_END_CAUSE, TIMEOUT_END_CAUSE};
pub use sweep::spawn_sweeper;
