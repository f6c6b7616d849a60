// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP adapters for the services Ticketflow collaborates with.
//!
//! The messaging transport and the automated handlers run behind a bridge
//! service; this crate talks to it over JSON.

pub mod channel;
pub mod client;
pub mod handlers;

pub use channel::HttpChannel;
pub use client::BridgeClient;
pub use handlers::RemoteHandlers;
