// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Every function takes `&Database` and runs its
//! statements through the connection's background thread.

pub mod calls;
pub mod directory;
