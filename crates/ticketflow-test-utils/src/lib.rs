// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Ticketflow integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockChannel`] - Mock messaging transport with send capture and scripted failures
//! - [`MockFlowEngine`], [`MockBotPlatform`], [`MockAssistant`] - Recording handlers
//! - [`FixedClock`] - Manually driven clock
//! - [`TestHarness`] - Temp storage seeded with one tenant, contact, connection and conversation

pub mod clock;
pub mod harness;
pub mod mock_channel;
pub mod mock_handlers;

pub use clock::FixedClock;
pub use harness::TestHarness;
pub use mock_channel::MockChannel;
pub use mock_handlers::{MockAssistant, MockBotPlatform, MockFlowEngine};
