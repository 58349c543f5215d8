// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed event bus connecting the SDK adapters to the client state machine.
//!
//! Adapters publish [`SdkEvent`]s; consumers hold a [`Subscription`] for as
//! long as they want to hear about them.

pub mod bus;
pub mod events;

pub use bus::{EventBus, EventStream, Subscription};
pub use events::{ConnectionState, SdkEvent};

/// The bus type shared by the media and messaging adapters.
pub type SdkEventBus = EventBus<SdkEvent>;
