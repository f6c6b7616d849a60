// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker job that delivers one claimed scheduled message.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use ticketflow_core::types::{Job, OutboundMessage, ScheduleStatus, ScheduledMessage};
use ticketflow_core::{ChannelAdapter, Clock, StorageAdapter, TemplateRenderer, TicketflowError};
use ticketflow_queue::JobHandler;

use crate::claimer::SendScheduledMessage;

pub struct ScheduledSendJob {
    storage: Arc<dyn StorageAdapter>,
    channel: Arc<dyn ChannelAdapter>,
    renderer: Arc<dyn TemplateRenderer>,
    clock: Arc<dyn Clock>,
    media_dir: PathBuf,
}

impl ScheduledSendJob {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        channel: Arc<dyn ChannelAdapter>,
        renderer: Arc<dyn TemplateRenderer>,
        clock: Arc<dyn Clock>,
        media_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            channel,
            renderer,
            clock,
            media_dir: media_dir.into(),
        }
    }

    /// Delivers the schedule named by `payload`.
    ///
    /// Only the identifiers in the payload are trusted; the record itself is
    /// reloaded. Cancelled and already-sent records finish without sending.
    pub async fn send(&self, payload: &SendScheduledMessage) -> Result<(), TicketflowError> {
        let id = payload.schedule.id;
        let schedule = self
            .storage
            .get_schedule(id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("schedule", id))?;

        match schedule.status {
            ScheduleStatus::Cancelled | ScheduleStatus::Sent => {
                info!(schedule_id = id, status = %schedule.status, "schedule no longer due; send skipped");
                return Ok(());
            }
            ScheduleStatus::Pending => {
                return Err(TicketflowError::Validation(format!(
                    "schedule {id} was never claimed"
                )));
            }
            ScheduleStatus::Claimed => {}
        }

        let contact = self
            .storage
            .get_contact(schedule.contact_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("contact", schedule.contact_id))?;
        let to = contact
            .number
            .clone()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                TicketflowError::Validation(format!("contact {} has no address", contact.id))
            })?;

        let connection_id = self.usable_connection(&schedule, payload.connection_id).await?;
        let body = self.renderer.render(&schedule.body, Some(&contact));
        let media_path = schedule.media_path.as_deref().and_then(|p| self.media_path(p));

        let receipt = self
            .channel
            .send(OutboundMessage {
                connection_id,
                to,
                body,
                media_path,
            })
            .await?;

        if self.storage.mark_schedule_sent(id, self.clock.now()).await? {
            info!(schedule_id = id, connection_id, message_id = %receipt.0, "scheduled message sent");
        } else {
            warn!(schedule_id = id, "message sent but the schedule was no longer CLAIMED");
        }
        Ok(())
    }

    /// The requested connection when it can deliver, otherwise the tenant default.
    async fn usable_connection(
        &self,
        schedule: &ScheduledMessage,
        requested: i64,
    ) -> Result<i64, TicketflowError> {
        if self.available(requested).await {
            return Ok(requested);
        }

        let fallback = self
            .storage
            .default_connection(schedule.tenant_id)
            .await?
            .map(|c| c.id)
            .filter(|id| *id != requested);
        match fallback {
            Some(fallback) if self.available(fallback).await => {
                info!(
                    schedule_id = schedule.id,
                    requested,
                    fallback,
                    "requested connection unavailable; using tenant default"
                );
                Ok(fallback)
            }
            _ => Err(TicketflowError::transport(format!(
                "no available connection for schedule {} (requested {requested})",
                schedule.id
            ))),
        }
    }

    async fn available(&self, connection_id: i64) -> bool {
        match self.channel.is_available(connection_id).await {
            Ok(available) => available,
            Err(e) => {
                warn!(connection_id, error = %e, "connection availability check failed");
                false
            }
        }
    }

    /// Stored media references are file names inside the media directory.
    fn media_path(&self, stored: &str) -> Option<PathBuf> {
        let name = Path::new(stored).file_name()?;
        let path = self.media_dir.join(name);
        debug!(path = %path.display(), "resolved scheduled media");
        Some(path)
    }
}

#[async_trait]
impl JobHandler for ScheduledSendJob {
    async fn handle(&self, job: &Job) -> Result<(), TicketflowError> {
        let payload: SendScheduledMessage = serde_json::from_str(&job.payload).map_err(|e| {
            TicketflowError::Validation(format!("malformed send payload in job {}: {e}", job.id))
        })?;
        self.send(&payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_core::types::{ChannelConnection, ConnectionStatus, NewSchedule, Recurrence};
    use ticketflow_test_utils::harness::{CONNECTION_ID, CONTACT_ID, CONTACT_NUMBER, TENANT_ID};
    use ticketflow_test_utils::TestHarness;

    use crate::render::PlaceholderRenderer;

    fn job(h: &TestHarness) -> ScheduledSendJob {
        ScheduledSendJob::new(
            h.storage.clone(),
            h.channel.clone(),
            Arc::new(PlaceholderRenderer::new(h.clock.clone(), chrono_tz::UTC)),
            h.clock.clone(),
            "/var/lib/ticketflow/media",
        )
    }

    /// Inserts and claims one schedule, returning the job payload.
    async fn claimed(h: &TestHarness, body: &str, media: Option<&str>) -> SendScheduledMessage {
        h.storage
            .insert_schedules(
                vec![NewSchedule {
                    tenant_id: TENANT_ID,
                    contact_id: CONTACT_ID,
                    connection_id: CONNECTION_ID,
                    body: body.into(),
                    media_path: media.map(str::to_string),
                    send_at: h.now() + chrono::Duration::seconds(5),
                    recurrence: Recurrence::None,
                    recurrence_end: None,
                }],
                h.now(),
            )
            .await
            .unwrap();
        let mut claimed = h
            .storage
            .claim_due_schedules(h.now() + chrono::Duration::minutes(1), 10, h.now())
            .await
            .unwrap();
        let schedule = claimed.remove(0).schedule;
        SendScheduledMessage {
            connection_id: schedule.connection_id,
            schedule,
        }
    }

    #[tokio::test]
    async fn sends_rendered_body_and_marks_sent() {
        let h = TestHarness::new().await.unwrap();
        let payload = claimed(&h, "Hello {{firstName}}", Some("../../etc/flyer.png")).await;

        job(&h).send(&payload).await.unwrap();

        let sent = h.channel.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "Hello Maria");
        assert_eq!(sent[0].to, CONTACT_NUMBER);
        assert_eq!(
            sent[0].media_path.as_deref(),
            Some(Path::new("/var/lib/ticketflow/media/flyer.png"))
        );

        let record = h.storage.get_schedule(payload.schedule.id).await.unwrap().unwrap();
        assert_eq!(record.status, ScheduleStatus::Sent);
        assert_eq!(record.sent_at, Some(h.now()));
    }

    #[tokio::test]
    async fn cancelled_schedule_is_skipped() {
        let h = TestHarness::new().await.unwrap();
        let payload = claimed(&h, "Hello", None).await;
        h.storage.cancel_schedule(payload.schedule.id, h.now()).await.unwrap();

        job(&h).send(&payload).await.unwrap();
        assert_eq!(h.channel.sent_count().await, 0);
    }

    #[tokio::test]
    async fn falls_back_to_default_connection() {
        let h = TestHarness::new().await.unwrap();
        h.storage
            .upsert_connection(&ChannelConnection {
                id: 101,
                tenant_id: TENANT_ID,
                name: "second line".into(),
                status: ConnectionStatus::Connected,
                is_default: false,
            })
            .await
            .unwrap();
        let mut payload = claimed(&h, "Hello", None).await;
        payload.connection_id = 101;
        h.channel.set_available(101, false).await;

        job(&h).send(&payload).await.unwrap();
        assert_eq!(h.channel.sent_messages().await[0].connection_id, CONNECTION_ID);
    }

    #[tokio::test]
    async fn no_usable_connection_fails_for_retry() {
        let h = TestHarness::new().await.unwrap();
        let payload = claimed(&h, "Hello", None).await;
        h.channel.set_available(CONNECTION_ID, false).await;

        let err = job(&h).send(&payload).await.unwrap_err();
        assert!(matches!(err, TicketflowError::Transport { .. }));
        let record = h.storage.get_schedule(payload.schedule.id).await.unwrap().unwrap();
        assert_eq!(record.status, ScheduleStatus::Claimed);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_validation_error() {
        let h = TestHarness::new().await.unwrap();
        let bad = Job {
            id: 1,
            queue_name: "scheduled".into(),
            name: ticketflow_queue::SEND_SCHEDULED_MESSAGE.into(),
            payload: "{}".into(),
            status: ticketflow_core::types::JobStatus::Processing,
            attempts: 0,
            max_attempts: 1,
            backoff: ticketflow_core::types::Backoff::Fixed { delay_ms: 0 },
            remove_on_complete: false,
            run_at: h.now(),
            locked_until: None,
            last_error: None,
            created_at: h.now(),
        };
        assert!(job(&h).handle(&bad).await.unwrap_err().is_validation());
    }
}
