// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the seams between the call core and its collaborators.

pub mod adapter;
pub mod api;
pub mod media;
pub mod messaging;
pub mod store;

pub use adapter::PluginAdapter;
pub use api::CallApi;
pub use media::MediaAdapter;
pub use messaging::MessagingAdapter;
pub use store::{AnswerWrite, CallStore, DeclineWrite, EndWrite};
