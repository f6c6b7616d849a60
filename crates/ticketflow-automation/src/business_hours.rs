// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business-hours gate.
//!
//! Decides whether an inbound message arrived outside the tenant's (or the
//! assigned queue's) weekly schedule. When it did and an out-of-office text
//! is configured, the notice is sent through the debounced sender and the
//! conversation's automation state is reset so a human can take over.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use ticketflow_config::model::BusinessHoursConfig;
use ticketflow_core::types::{
    Conversation, OutboundMessage, ScheduleEntry, ScheduleMode, Tenant,
};
use ticketflow_core::{ChannelAdapter, Clock, StorageAdapter, TicketflowError};

use crate::debounce::{DebounceList, DebouncedSender};

fn parse_hhmm(value: Option<&String>) -> Option<NaiveTime> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Opening hours of one weekday, parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub lunch: Option<(NaiveTime, NaiveTime)>,
}

impl DayWindow {
    /// Parses an entry. Entries without both a start and an end are not windows.
    pub fn from_entry(entry: &ScheduleEntry) -> Option<Self> {
        let start = parse_hhmm(entry.start_time.as_ref())?;
        let end = parse_hhmm(entry.end_time.as_ref())?;
        let lunch = match (
            parse_hhmm(entry.start_lunch_time.as_ref()),
            parse_hhmm(entry.end_lunch_time.as_ref()),
        ) {
            (Some(from), Some(to)) => Some((from, to)),
            _ => None,
        };
        Some(Self { start, end, lunch })
    }

    /// Before opening, after closing, or inside the lunch break.
    ///
    /// `end` is inclusive. The lunch break covers `[from, to)` and only
    /// applies when both bounds are configured.
    pub fn is_out_of_hours(&self, time: NaiveTime) -> bool {
        if time < self.start || time > self.end {
            return true;
        }
        match self.lunch {
            Some((from, to)) => time >= from && time < to,
            None => false,
        }
    }
}

/// Finds today's window in a weekly table.
pub fn window_for(entries: &[ScheduleEntry], day: Weekday) -> Option<DayWindow> {
    let name = weekday_name(day);
    entries
        .iter()
        .filter(|e| e.weekday.trim().eq_ignore_ascii_case(name))
        .find_map(DayWindow::from_entry)
}

/// `Some(true)` when `local` falls outside today's window; `None` when the
/// table has no usable window for today.
pub fn is_out_of_hours(entries: &[ScheduleEntry], local: NaiveDateTime) -> Option<bool> {
    window_for(entries, local.weekday()).map(|w| w.is_out_of_hours(local.time()))
}

pub struct BusinessHoursGate {
    storage: Arc<dyn StorageAdapter>,
    sender: DebouncedSender,
    debounce: Mutex<DebounceList>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    company_cooldown: Duration,
    queue_cooldown: Duration,
}

impl BusinessHoursGate {
    pub fn new(
        config: &BusinessHoursConfig,
        storage: Arc<dyn StorageAdapter>,
        channel: Arc<dyn ChannelAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TicketflowError> {
        let timezone: Tz = config.timezone.parse().map_err(|e| {
            TicketflowError::Config(format!("invalid timezone '{}': {e}", config.timezone))
        })?;
        Ok(Self {
            storage,
            sender: DebouncedSender::new(channel, config.jitter_min_ms, config.jitter_max_ms),
            debounce: Mutex::new(DebounceList::new(config.debounce_cap)),
            clock,
            timezone,
            company_cooldown: Duration::from_millis(config.company_cooldown_ms),
            queue_cooldown: Duration::from_secs(config.queue_cooldown_secs),
        })
    }

    /// Returns `true` when the message arrived out of hours and automation
    /// was suppressed for it.
    ///
    /// Never fails: on an internal error the conversation's out-of-hours
    /// marker is cleared to unknown and `false` is returned.
    pub async fn evaluate(&self, conversation: &mut Conversation, tenant: &Tenant) -> bool {
        match self.try_evaluate(conversation, tenant).await {
            Ok(handled) => handled,
            Err(e) => {
                warn!(
                    conversation_id = conversation.id,
                    tenant_id = tenant.id,
                    error = %e,
                    "business-hours evaluation failed"
                );
                conversation.is_out_of_hour = None;
                if let Err(e) = self.storage.save_conversation(conversation).await {
                    warn!(conversation_id = conversation.id, error = %e, "failed to clear out-of-hours marker");
                }
                false
            }
        }
    }

    async fn try_evaluate(
        &self,
        conversation: &mut Conversation,
        tenant: &Tenant,
    ) -> Result<bool, TicketflowError> {
        let local = self
            .clock
            .now()
            .with_timezone(&self.timezone)
            .naive_local();

        let (closed, notice, cooldown) = match tenant.schedule_mode {
            ScheduleMode::Disabled => return Ok(false),
            ScheduleMode::Company => (
                is_out_of_hours(&tenant.schedules, local),
                tenant.out_of_hours_message.clone(),
                self.company_cooldown,
            ),
            ScheduleMode::Queue => {
                let Some(queue_id) = conversation.queue_id else {
                    return Ok(false);
                };
                let queue = self
                    .storage
                    .get_queue(queue_id)
                    .await?
                    .ok_or_else(|| TicketflowError::not_found("queue", queue_id))?;
                (
                    is_out_of_hours(&queue.schedules, local),
                    queue.out_of_hours_message,
                    self.queue_cooldown,
                )
            }
        };

        let Some(closed) = closed else {
            debug!(conversation_id = conversation.id, "no schedule window for today");
            return Ok(false);
        };
        if conversation.is_out_of_hour != Some(closed) {
            conversation.is_out_of_hour = Some(closed);
            self.storage.save_conversation(conversation).await?;
        }
        if !closed {
            return Ok(false);
        }
        let Some(notice) = notice.filter(|n| !n.trim().is_empty()) else {
            return Ok(false);
        };

        self.send_notice(conversation, notice, cooldown).await?;
        conversation.reset_automation();
        self.storage.save_conversation(conversation).await?;
        info!(
            conversation_id = conversation.id,
            mode = %tenant.schedule_mode,
            "out of hours; automation suppressed"
        );
        Ok(true)
    }

    async fn send_notice(
        &self,
        conversation: &Conversation,
        body: String,
        cooldown: Duration,
    ) -> Result<(), TicketflowError> {
        let allowed = self
            .debounce
            .lock()
            .await
            .try_acquire(conversation.id, self.clock.now(), cooldown);
        if !allowed {
            debug!(conversation_id = conversation.id, "out-of-hours notice debounced");
            return Ok(());
        }

        let contact = self
            .storage
            .get_contact(conversation.contact_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("contact", conversation.contact_id))?;
        let Some(to) = contact.number else {
            debug!(conversation_id = conversation.id, "contact has no address; notice skipped");
            return Ok(());
        };
        let connection_id = match conversation.connection_id {
            Some(id) => id,
            None => {
                self.storage
                    .default_connection(conversation.tenant_id)
                    .await?
                    .ok_or_else(|| TicketflowError::not_found("connection", "default"))?
                    .id
            }
        };

        self.sender
            .schedule(
                conversation.id,
                OutboundMessage {
                    connection_id,
                    to,
                    body,
                    media_path: None,
                },
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ticketflow_core::types::Queue;
    use ticketflow_test_utils::harness::{CONNECTION_ID, CONTACT_NUMBER, TENANT_ID};
    use ticketflow_test_utils::TestHarness;

    fn entry(day: &str, start: &str, end: &str, lunch: Option<(&str, &str)>) -> ScheduleEntry {
        ScheduleEntry {
            weekday: day.into(),
            start_time: Some(start.into()),
            end_time: Some(end.into()),
            start_lunch_time: lunch.map(|l| l.0.to_string()),
            end_lunch_time: lunch.map(|l| l.1.to_string()),
        }
    }

    fn at(hhmm: &str) -> NaiveTime {
        NaiveTime::parse_from_str(hhmm, "%H:%M").unwrap()
    }

    #[test]
    fn lunch_break_counts_as_out_of_hours() {
        let window =
            DayWindow::from_entry(&entry("monday", "08:00", "18:00", Some(("12:00", "13:00"))))
                .unwrap();
        assert!(window.is_out_of_hours(at("12:30")));
        assert!(!window.is_out_of_hours(at("10:00")));
        assert!(!window.is_out_of_hours(at("13:00")));
        assert!(window.is_out_of_hours(at("07:59")));
        assert!(!window.is_out_of_hours(at("18:00")));
        assert!(window.is_out_of_hours(at("18:01")));
    }

    #[test]
    fn half_configured_lunch_is_ignored() {
        let mut e = entry("monday", "08:00", "18:00", None);
        e.start_lunch_time = Some("12:00".into());
        let window = DayWindow::from_entry(&e).unwrap();
        assert!(!window.is_out_of_hours(at("12:30")));
    }

    #[test]
    fn entries_without_both_bounds_are_skipped() {
        let mut open_only = entry("monday", "08:00", "18:00", None);
        open_only.end_time = Some(String::new());
        let table = vec![open_only, entry("Monday", "09:00", "17:00", None)];
        let window = window_for(&table, Weekday::Mon).unwrap();
        assert_eq!(window.start, at("09:00"));
        assert!(window_for(&table, Weekday::Tue).is_none());
    }

    proptest! {
        #[test]
        fn inside_window_outside_lunch_is_open(minutes in 0u32..(24 * 60)) {
            let window = DayWindow::from_entry(
                &entry("monday", "08:00", "18:00", Some(("12:00", "13:00"))),
            ).unwrap();
            let t = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap();
            let open = t >= at("08:00") && t <= at("18:00") && !(t >= at("12:00") && t < at("13:00"));
            prop_assert_eq!(window.is_out_of_hours(t), !open);
        }
    }

    fn weekdays(start: &str, end: &str) -> Vec<ScheduleEntry> {
        ["monday", "tuesday", "wednesday", "thursday", "friday"]
            .iter()
            .map(|d| entry(d, start, end, None))
            .collect()
    }

    fn config() -> BusinessHoursConfig {
        BusinessHoursConfig {
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            ..BusinessHoursConfig::default()
        }
    }

    fn gate(h: &TestHarness) -> BusinessHoursGate {
        BusinessHoursGate::new(
            &config(),
            h.storage.clone(),
            h.channel.clone(),
            h.clock.clone(),
        )
        .unwrap()
    }

    async fn wait_for_sends(h: &TestHarness, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.channel.sent_count().await < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn company_mode_out_of_hours_sends_notice_and_resets() {
        // Monday 20:00 UTC, schedule closes at 18:00.
        let h = TestHarness::builder()
            .with_clock_at("2026-03-02T20:00:00Z")
            .with_business_hours(ScheduleMode::Company, weekdays("08:00", "18:00"), Some("We are closed"))
            .build()
            .await
            .unwrap();
        let mut conversation = h
            .update_conversation(|c| {
                c.is_bot = true;
                c.queue_id = Some(3);
                c.automation_usage = 4;
            })
            .await
            .unwrap();

        assert!(gate(&h).evaluate(&mut conversation, &h.tenant).await);
        wait_for_sends(&h, 1).await;

        let sent = h.channel.sent_messages().await;
        assert_eq!(sent[0].body, "We are closed");
        assert_eq!(sent[0].to, CONTACT_NUMBER);
        assert_eq!(sent[0].connection_id, CONNECTION_ID);

        let stored = h.conversation().await.unwrap();
        assert!(!stored.is_bot);
        assert_eq!(stored.queue_id, None);
        assert_eq!(stored.automation_usage, 0);
        assert_eq!(stored.is_out_of_hour, Some(true));
    }

    #[tokio::test]
    async fn company_mode_repeats_notice_once_cooldown_elapses() {
        let h = TestHarness::builder()
            .with_clock_at("2026-03-02T20:00:00Z")
            .with_business_hours(ScheduleMode::Company, weekdays("08:00", "18:00"), Some("We are closed"))
            .build()
            .await
            .unwrap();
        let gate = gate(&h);

        let mut conversation = h.conversation().await.unwrap();
        assert!(gate.evaluate(&mut conversation, &h.tenant).await);
        wait_for_sends(&h, 1).await;

        // Inside the cooldown: suppressed without a second notice.
        assert!(gate.evaluate(&mut conversation, &h.tenant).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.channel.sent_count().await, 1);

        h.clock.advance(chrono::Duration::milliseconds(
            config().company_cooldown_ms as i64 + 1,
        ));
        assert!(gate.evaluate(&mut conversation, &h.tenant).await);
        wait_for_sends(&h, 2).await;
        assert_eq!(h.channel.sent_count().await, 2);
    }

    #[tokio::test]
    async fn company_mode_inside_hours_takes_no_action() {
        let h = TestHarness::builder()
            .with_business_hours(ScheduleMode::Company, weekdays("08:00", "18:00"), Some("closed"))
            .build()
            .await
            .unwrap();
        let mut conversation = h.update_conversation(|c| c.is_bot = true).await.unwrap();

        assert!(!gate(&h).evaluate(&mut conversation, &h.tenant).await);
        assert!(h.conversation().await.unwrap().is_bot);
        assert_eq!(h.channel.sent_count().await, 0);
    }

    #[tokio::test]
    async fn queue_mode_uses_queue_schedule_and_long_cooldown() {
        let h = TestHarness::builder()
            .with_clock_at("2026-03-02T12:30:00Z")
            .with_business_hours(ScheduleMode::Queue, Vec::new(), None)
            .build()
            .await
            .unwrap();
        h.storage
            .upsert_queue(&Queue {
                id: 5,
                tenant_id: TENANT_ID,
                name: "Support".into(),
                greeting_message: None,
                out_of_hours_message: Some("Support is at lunch".into()),
                schedules: vec![entry("monday", "08:00", "18:00", Some(("12:00", "13:00")))],
            })
            .await
            .unwrap();
        let gate = gate(&h);

        let mut conversation = h.update_conversation(|c| c.queue_id = Some(5)).await.unwrap();
        assert!(gate.evaluate(&mut conversation, &h.tenant).await);
        wait_for_sends(&h, 1).await;

        // Reassigned and triggered again ten minutes later: suppressed, no second notice.
        h.clock.advance(chrono::Duration::minutes(10));
        let mut conversation = h.update_conversation(|c| c.queue_id = Some(5)).await.unwrap();
        assert!(gate.evaluate(&mut conversation, &h.tenant).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.channel.sent_count().await, 1);
    }

    #[tokio::test]
    async fn queue_mode_without_queue_is_ignored() {
        let h = TestHarness::builder()
            .with_clock_at("2026-03-02T23:00:00Z")
            .with_business_hours(ScheduleMode::Queue, Vec::new(), None)
            .build()
            .await
            .unwrap();
        let mut conversation = h.conversation().await.unwrap();
        assert!(!gate(&h).evaluate(&mut conversation, &h.tenant).await);
    }

    #[tokio::test]
    async fn internal_error_clears_marker_and_reports_unhandled() {
        let h = TestHarness::builder()
            .with_business_hours(ScheduleMode::Queue, Vec::new(), None)
            .build()
            .await
            .unwrap();
        // Queue 99 does not exist.
        let mut conversation = h.update_conversation(|c| c.queue_id = Some(99)).await.unwrap();

        assert!(!gate(&h).evaluate(&mut conversation, &h.tenant).await);
        assert_eq!(conversation.is_out_of_hour, None);
        assert_eq!(h.conversation().await.unwrap().is_out_of_hour, None);
    }

    #[tokio::test]
    async fn invalid_timezone_is_a_config_error() {
        let h = TestHarness::new().await.unwrap();
        let bad = BusinessHoursConfig {
            timezone: "Mars/Olympus".into(),
            ..BusinessHoursConfig::default()
        };
        let result =
            BusinessHoursGate::new(&bad, h.storage.clone(), h.channel.clone(), h.clock.clone());
        assert!(matches!(result, Err(TicketflowError::Config(_))));
    }
}
