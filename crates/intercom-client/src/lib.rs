// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client Call State Machine.
//!
//! Each device runs one [`CallClient`] actor that turns REST results, peer
//! signals and media/messaging SDK callbacks into a single local call phase
//! (`idle -> dialing -> ringing -> connecting -> connected -> ending -> ended
//! -> idle`), joins and leaves media accordingly, and keeps the call's
//! credentials renewed. [`HttpCallApi`] talks to the gateway.

pub mod actor;
pub mod http;
pub mod state;

pub use actor::{
    AnswerOutcome, CallClient, ClientDeps, DEFAULT_END_CAUSE, RENEWAL_FAILED_CAUSE,
    TIMEOUT_CAUSE,
};
pub use http::HttpCallApi;
pub use state::{CallPhase, ClientContext, ClientSnapshot, Direction, PendingInvite};
