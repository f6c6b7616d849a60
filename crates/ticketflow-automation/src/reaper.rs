// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic sweep of expired conversation sessions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use ticketflow_core::types::{ExpiredSession, Job, OutboundMessage};
use ticketflow_core::{ChannelAdapter, Clock, StorageAdapter, TicketflowError};
use ticketflow_queue::JobHandler;

/// Why an expired session was deleted without notifying the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoConversation,
    NoContact,
    NoAddress,
    NoConnection,
    AlreadyDone,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NoConversation => "no conversation found",
            SkipReason::NoContact => "no contact",
            SkipReason::NoAddress => "contact has no address",
            SkipReason::NoConnection => "no connection to send through",
            SkipReason::AlreadyDone => "dialog already finished",
        })
    }
}

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub expired: usize,
    pub notified: usize,
    pub skipped: usize,
    pub notify_failed: usize,
    pub deleted: usize,
}

pub struct SessionReaper {
    storage: Arc<dyn StorageAdapter>,
    channel: Arc<dyn ChannelAdapter>,
    clock: Arc<dyn Clock>,
    notice: String,
}

impl SessionReaper {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        channel: Arc<dyn ChannelAdapter>,
        clock: Arc<dyn Clock>,
        notice: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            channel,
            clock,
            notice: notice.into(),
        }
    }

    /// Notifies and deletes every expired session.
    ///
    /// Only the initial query can fail the sweep. Each session is handled
    /// on its own; a failed notice or delete is logged and the sweep moves on.
    pub async fn reap(&self) -> Result<ReapReport, TicketflowError> {
        let expired = self.storage.list_expired_sessions(self.clock.now()).await?;
        let mut report = ReapReport {
            expired: expired.len(),
            ..ReapReport::default()
        };
        if expired.is_empty() {
            debug!("no expired sessions");
            return Ok(report);
        }

        for item in expired {
            let conversation_id = item.session.conversation_id;
            match self.notify(&item).await {
                Ok(()) => report.notified += 1,
                Err(Notify::Skipped(reason)) => {
                    info!(conversation_id, reason = %reason, "expiry notice skipped");
                    report.skipped += 1;
                }
                Err(Notify::Failed(e)) => {
                    warn!(conversation_id, error = %e, "failed to send expiry notice");
                    report.notify_failed += 1;
                }
            }

            match self.storage.delete_session(conversation_id).await {
                Ok(_) => report.deleted += 1,
                Err(e) => warn!(conversation_id, error = %e, "failed to delete expired session"),
            }
        }

        info!(
            expired = report.expired,
            notified = report.notified,
            skipped = report.skipped,
            deleted = report.deleted,
            "expired sessions reaped"
        );
        Ok(report)
    }

    async fn notify(&self, item: &ExpiredSession) -> Result<(), Notify> {
        let conversation = item
            .conversation
            .as_ref()
            .ok_or(Notify::Skipped(SkipReason::NoConversation))?;
        let contact = item
            .contact
            .as_ref()
            .ok_or(Notify::Skipped(SkipReason::NoContact))?;
        let to = contact
            .number
            .as_ref()
            .filter(|n| !n.trim().is_empty())
            .ok_or(Notify::Skipped(SkipReason::NoAddress))?;
        if item.session.is_done() {
            return Err(Notify::Skipped(SkipReason::AlreadyDone));
        }

        let connection_id = match conversation.connection_id {
            Some(id) => id,
            None => self
                .storage
                .default_connection(conversation.tenant_id)
                .await
                .map_err(Notify::Failed)?
                .ok_or(Notify::Skipped(SkipReason::NoConnection))?
                .id,
        };

        self.channel
            .send(OutboundMessage {
                connection_id,
                to: to.clone(),
                body: self.notice.clone(),
                media_path: None,
            })
            .await
            .map_err(Notify::Failed)?;
        Ok(())
    }
}

enum Notify {
    Skipped(SkipReason),
    Failed(TicketflowError),
}

#[async_trait]
impl JobHandler for SessionReaper {
    async fn handle(&self, _job: &Job) -> Result<(), TicketflowError> {
        self.reap().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use ticketflow_core::types::{Contact, Conversation, SESSION_STEP_DONE};
    use ticketflow_test_utils::harness::{CONTACT_NUMBER, CONVERSATION_ID, TENANT_ID};
    use ticketflow_test_utils::TestHarness;
    use tracing_test::traced_test;

    use crate::sessions::SessionStore;

    const NOTICE: &str = "Session closed for inactivity";

    fn reaper(h: &TestHarness) -> SessionReaper {
        SessionReaper::new(h.storage.clone(), h.channel.clone(), h.clock.clone(), NOTICE)
    }

    async fn conversation_for(h: &TestHarness, id: i64, contact_id: i64) -> Conversation {
        let conversation = Conversation {
            id,
            contact_id,
            ..h.conversation().await.unwrap()
        };
        h.storage.save_conversation(&conversation).await.unwrap();
        conversation
    }

    #[tokio::test]
    async fn expired_session_is_notified_and_deleted() {
        let h = TestHarness::new().await.unwrap();
        let store = SessionStore::new(h.storage.clone(), h.clock.clone());
        let conversation = h.conversation().await.unwrap();
        store
            .start(&conversation, "ask_date", Duration::from_secs(60), serde_json::Value::Null)
            .await
            .unwrap();

        // Not yet expired.
        assert_eq!(reaper(&h).reap().await.unwrap().expired, 0);

        h.clock.advance(chrono::Duration::seconds(61));
        let report = reaper(&h).reap().await.unwrap();
        assert_eq!(report.notified, 1);
        assert_eq!(report.deleted, 1);

        let sent = h.channel.sent_messages().await;
        assert_eq!(sent[0].body, NOTICE);
        assert_eq!(sent[0].to, CONTACT_NUMBER);
        assert!(store.get(CONVERSATION_ID).await.unwrap().is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_preconditions_are_logged_and_deleted() {
        let h = TestHarness::new().await.unwrap();
        let store = SessionStore::new(h.storage.clone(), h.clock.clone());
        let ttl = Duration::from_secs(1);

        // Contact without an address.
        h.storage
            .upsert_contact(&Contact {
                id: 11,
                tenant_id: TENANT_ID,
                name: "No Phone".into(),
                number: None,
                email: None,
            })
            .await
            .unwrap();
        let no_address = conversation_for(&h, 2001, 11).await;
        store.start(&no_address, "menu", ttl, serde_json::Value::Null).await.unwrap();

        // Contact row missing entirely.
        let no_contact = conversation_for(&h, 2002, 404).await;
        store.start(&no_contact, "menu", ttl, serde_json::Value::Null).await.unwrap();

        // Dialog already finished.
        let finished = h.conversation().await.unwrap();
        store
            .start(&finished, SESSION_STEP_DONE, ttl, serde_json::Value::Null)
            .await
            .unwrap();

        h.clock.advance(chrono::Duration::seconds(5));
        let report = reaper(&h).reap().await.unwrap();

        assert_eq!(report.expired, 3);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.deleted, 3);
        assert_eq!(h.channel.sent_count().await, 0);
        assert!(logs_contain("contact has no address"));
        assert!(logs_contain("no contact"));
        assert!(logs_contain("dialog already finished"));
    }

    #[tokio::test]
    async fn failed_notice_does_not_block_the_batch() {
        let h = TestHarness::new().await.unwrap();
        let store = SessionStore::new(h.storage.clone(), h.clock.clone());
        let ttl = Duration::from_secs(1);
        let first = h.conversation().await.unwrap();
        let second = conversation_for(&h, 2003, first.contact_id).await;
        store.start(&first, "menu", ttl, serde_json::Value::Null).await.unwrap();
        store.start(&second, "menu", ttl, serde_json::Value::Null).await.unwrap();

        h.channel.fail_next(1);
        h.clock.advance(chrono::Duration::seconds(5));
        let report = reaper(&h).reap().await.unwrap();

        assert_eq!(report.notify_failed, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(report.deleted, 2);
        assert!(h.storage.list_expired_sessions(h.now()).await.unwrap().is_empty());
    }
}
