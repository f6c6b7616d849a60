// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod bindings;
pub mod conversations;
pub mod directory;
pub mod jobs;
pub mod schedules;
pub mod sessions;
