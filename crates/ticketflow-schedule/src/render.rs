// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `{{placeholder}}` expansion for scheduled message bodies.

use std::sync::{Arc, LazyLock};

use chrono::Timelike;
use chrono_tz::Tz;
use regex::{Captures, Regex};

use ticketflow_core::types::Contact;
use ticketflow_core::{Clock, TemplateRenderer};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_]+)\s*\}\}").unwrap());

/// Greeting for the given local hour.
pub fn greeting(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Good morning",
        12..=17 => "Good afternoon",
        _ => "Good evening",
    }
}

/// Renders contact placeholders: `{{name}}`, `{{firstName}}`,
/// `{{number}}`, `{{email}}` and the time-of-day `{{greeting}}`.
///
/// Unknown placeholders are left as written.
pub struct PlaceholderRenderer {
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl PlaceholderRenderer {
    pub fn new(clock: Arc<dyn Clock>, timezone: Tz) -> Self {
        Self { clock, timezone }
    }

    fn value(&self, key: &str, contact: Option<&Contact>) -> Option<String> {
        match key {
            "greeting" => {
                let hour = self.clock.now().with_timezone(&self.timezone).hour();
                Some(greeting(hour).to_string())
            }
            "name" => Some(contact.map(|c| c.name.clone()).unwrap_or_default()),
            "firstName" => Some(
                contact
                    .and_then(|c| c.name.split_whitespace().next())
                    .unwrap_or_default()
                    .to_string(),
            ),
            "number" => Some(contact.and_then(|c| c.number.clone()).unwrap_or_default()),
            "email" => Some(contact.and_then(|c| c.email.clone()).unwrap_or_default()),
            _ => None,
        }
    }
}

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, body: &str, contact: Option<&Contact>) -> String {
        PLACEHOLDER
            .replace_all(body, |caps: &Captures<'_>| {
                self.value(&caps[1], contact)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_test_utils::FixedClock;

    fn contact() -> Contact {
        Contact {
            id: 1,
            tenant_id: 1,
            name: "Maria Silva".into(),
            number: Some("5511999990000".into()),
            email: None,
        }
    }

    fn renderer(at: &str, tz: Tz) -> PlaceholderRenderer {
        PlaceholderRenderer::new(Arc::new(FixedClock::at(at)), tz)
    }

    #[test]
    fn contact_fields_are_substituted() {
        let r = renderer("2026-03-02T10:00:00Z", chrono_tz::UTC);
        let out = r.render(
            "Hi {{firstName}} ({{ name }}), we will call {{number}}. Mail: [{{email}}]",
            Some(&contact()),
        );
        assert_eq!(
            out,
            "Hi Maria (Maria Silva), we will call 5511999990000. Mail: []"
        );
    }

    #[test]
    fn greeting_follows_local_time() {
        // 10:00 UTC is 07:00 in Sao Paulo.
        let r = renderer("2026-03-02T10:00:00Z", chrono_tz::America::Sao_Paulo);
        assert_eq!(r.render("{{greeting}}!", None), "Good morning!");
        let r = renderer("2026-03-02T22:00:00Z", chrono_tz::America::Sao_Paulo);
        assert_eq!(r.render("{{greeting}}", None), "Good evening");
    }

    #[test]
    fn unknown_placeholders_are_untouched() {
        let r = renderer("2026-03-02T15:00:00Z", chrono_tz::UTC);
        assert_eq!(
            r.render("{{protocol}} {{greeting}}", Some(&contact())),
            "{{protocol}} Good afternoon"
        );
    }

    #[test]
    fn missing_contact_renders_empty_fields() {
        let r = renderer("2026-03-02T15:00:00Z", chrono_tz::UTC);
        assert_eq!(r.render("Hello {{name}}.", None), "Hello .");
    }
}
