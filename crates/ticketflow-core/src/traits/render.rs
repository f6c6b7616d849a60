// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::types::Contact;

/// Expands contact placeholders in an outgoing message body.
pub trait TemplateRenderer: Send + Sync + 'static {
    fn render(&self, body: &str, contact: Option<&Contact>) -> String;
}
