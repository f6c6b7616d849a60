// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authenticated HTTP gateway.
//!
//! Feeds inbound transport messages into the automation pipeline, exposes
//! schedule management, and streams realtime tenant events over SSE.

pub mod auth;
pub mod handlers;
pub mod server;
pub mod sse;

pub use auth::AuthConfig;
pub use handlers::ApiError;
pub use server::{GatewayState, router, start_server};
