// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST surface of the call lifecycle service.
//!
//! Every route except `GET /health` sits behind the bearer-token middleware.
//! Errors map to `404` (not found), `400` (validation, wrong state, no
//! residents) or a generic `500`.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, bind, router, serve, start_server};
