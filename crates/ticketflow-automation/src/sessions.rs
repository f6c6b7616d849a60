// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation state store for multi-step automated dialogs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use ticketflow_core::types::{Conversation, ConversationSession};
use ticketflow_core::{Clock, StorageAdapter, TicketflowError};

/// Keyed session records with an inactivity expiry.
///
/// A conversation owns at most one session. Every write pushes the expiry
/// `ttl` past the current time; the reaper collects sessions nobody touched.
pub struct SessionStore {
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn StorageAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    fn expiry(&self, now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
        now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::days(1))
    }

    /// Starts a dialog, replacing any session the conversation already had.
    pub async fn start(
        &self,
        conversation: &Conversation,
        step: &str,
        ttl: Duration,
        payload: serde_json::Value,
    ) -> Result<ConversationSession, TicketflowError> {
        let now = self.clock.now();
        let session = ConversationSession {
            conversation_id: conversation.id,
            tenant_id: conversation.tenant_id,
            step: step.to_string(),
            expires_at: self.expiry(now, ttl),
            payload,
            created_at: now,
            updated_at: now,
        };
        self.storage.upsert_session(&session).await?;
        debug!(conversation_id = conversation.id, step, "session started");
        Ok(session)
    }

    pub async fn get(
        &self,
        conversation_id: i64,
    ) -> Result<Option<ConversationSession>, TicketflowError> {
        self.storage.get_session(conversation_id).await
    }

    /// Moves the dialog to `step` and refreshes its expiry. `payload`
    /// replaces the stored payload when given.
    pub async fn advance(
        &self,
        conversation_id: i64,
        step: &str,
        payload: Option<serde_json::Value>,
        ttl: Duration,
    ) -> Result<ConversationSession, TicketflowError> {
        let mut session = self
            .storage
            .get_session(conversation_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("session", conversation_id))?;

        let now = self.clock.now();
        session.step = step.to_string();
        if let Some(payload) = payload {
            session.payload = payload;
        }
        session.expires_at = self.expiry(now, ttl);
        session.updated_at = now;
        self.storage.upsert_session(&session).await?;
        debug!(conversation_id, step, "session advanced");
        Ok(session)
    }

    /// Ends the dialog normally. Returns `false` if there was no session.
    pub async fn finish(&self, conversation_id: i64) -> Result<bool, TicketflowError> {
        let deleted = self.storage.delete_session(conversation_id).await?;
        if deleted {
            debug!(conversation_id, "session finished");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_test_utils::TestHarness;

    fn store(h: &TestHarness) -> SessionStore {
        SessionStore::new(h.storage.clone(), h.clock.clone())
    }

    #[tokio::test]
    async fn start_sets_expiry_from_ttl() {
        let h = TestHarness::new().await.unwrap();
        let store = store(&h);
        let conversation = h.conversation().await.unwrap();

        let session = store
            .start(
                &conversation,
                "ask_date",
                Duration::from_secs(600),
                serde_json::json!({"service": "haircut"}),
            )
            .await
            .unwrap();
        assert_eq!(session.expires_at, h.now() + chrono::Duration::minutes(10));

        let loaded = store.get(conversation.id).await.unwrap().unwrap();
        assert_eq!(loaded.step, "ask_date");
        assert_eq!(loaded.payload["service"], "haircut");
    }

    #[tokio::test]
    async fn advance_refreshes_expiry_and_keeps_payload() {
        let h = TestHarness::new().await.unwrap();
        let store = store(&h);
        let conversation = h.conversation().await.unwrap();
        store
            .start(&conversation, "ask_date", Duration::from_secs(60), serde_json::json!({"a": 1}))
            .await
            .unwrap();

        h.clock.advance(chrono::Duration::seconds(50));
        let session = store
            .advance(conversation.id, "ask_time", None, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(session.step, "ask_time");
        assert_eq!(session.payload["a"], 1);
        assert_eq!(session.expires_at, h.now() + chrono::Duration::seconds(60));
        assert!(session.created_at < session.updated_at);
    }

    #[tokio::test]
    async fn advance_without_session_is_not_found() {
        let h = TestHarness::new().await.unwrap();
        let err = store(&h)
            .advance(1000, "x", None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn restarting_replaces_the_single_session() {
        let h = TestHarness::new().await.unwrap();
        let store = store(&h);
        let conversation = h.conversation().await.unwrap();
        store
            .start(&conversation, "one", Duration::from_secs(60), serde_json::Value::Null)
            .await
            .unwrap();
        store
            .start(&conversation, "two", Duration::from_secs(60), serde_json::Value::Null)
            .await
            .unwrap();

        assert_eq!(store.get(conversation.id).await.unwrap().unwrap().step, "two");
        assert!(store.finish(conversation.id).await.unwrap());
        assert!(!store.finish(conversation.id).await.unwrap());
    }
}
