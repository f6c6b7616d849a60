// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation inbound processing.
//!
//! Messages for the same conversation run one at a time behind a keyed
//! async mutex; different conversations never wait on each other. Each
//! message goes through the business-hours gate first and reaches the
//! integration dispatcher only when the gate did not intervene.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use ticketflow_core::types::InboundMessage;
use ticketflow_core::{EventPublisher, RealtimeEvent, StorageAdapter, TicketflowError};

use crate::business_hours::BusinessHoursGate;
use crate::dispatcher::IntegrationDispatcher;

/// What automation did with one inbound message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    /// The business-hours gate suppressed automation.
    pub out_of_hours: bool,
    /// An automated handler consumed the message.
    pub consumed: bool,
}

pub struct InboundPipeline {
    storage: Arc<dyn StorageAdapter>,
    gate: BusinessHoursGate,
    dispatcher: IntegrationDispatcher,
    publisher: Arc<dyn EventPublisher>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl InboundPipeline {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        gate: BusinessHoursGate,
        dispatcher: IntegrationDispatcher,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            storage,
            gate,
            dispatcher,
            publisher,
            locks: DashMap::new(),
        }
    }

    /// Runs automation for `message` on conversation `conversation_id`.
    ///
    /// Fails when the conversation, its tenant or its contact is missing, or
    /// when an automation relay could not be reached.
    pub async fn process(
        &self,
        conversation_id: i64,
        message: InboundMessage,
    ) -> Result<PipelineOutcome, TicketflowError> {
        if message.from_me {
            debug!(conversation_id, "own message; automation skipped");
            return Ok(PipelineOutcome::default());
        }

        let lock = self.locks.entry(conversation_id).or_default().clone();
        let result = {
            let _guard = lock.lock().await;
            self.process_locked(conversation_id, &message).await
        };
        drop(lock);
        // Only the map's own reference left means nobody is waiting.
        self.locks
            .remove_if(&conversation_id, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn process_locked(
        &self,
        conversation_id: i64,
        message: &InboundMessage,
    ) -> Result<PipelineOutcome, TicketflowError> {
        let mut conversation = self
            .storage
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("conversation", conversation_id))?;
        let tenant = self
            .storage
            .get_tenant(conversation.tenant_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("tenant", conversation.tenant_id))?;
        let before = conversation.clone();

        let mut outcome = PipelineOutcome {
            out_of_hours: self.gate.evaluate(&mut conversation, &tenant).await,
            consumed: false,
        };

        if !outcome.out_of_hours {
            if let Some(binding_id) = conversation.integration_id {
                let contact = self
                    .storage
                    .get_contact(conversation.contact_id)
                    .await?
                    .ok_or_else(|| TicketflowError::not_found("contact", conversation.contact_id))?;
                match self.storage.get_binding(binding_id).await? {
                    Some(binding) => {
                        outcome.consumed = self
                            .dispatcher
                            .dispatch(message, &mut conversation, &contact, &binding)
                            .await?;
                    }
                    None => warn!(conversation_id, binding_id, "integration binding not found"),
                }
            }
        }

        if conversation != before {
            self.publisher.publish(RealtimeEvent::new(
                format!("tenant-{}", conversation.tenant_id),
                "ticket",
                serde_json::json!({ "action": "update", "ticket": conversation }),
            ));
        }
        debug!(
            conversation_id,
            out_of_hours = outcome.out_of_hours,
            consumed = outcome.consumed,
            "inbound message processed"
        );
        Ok(outcome)
    }

    /// Conversations with a message currently in flight or waiting.
    pub fn active_conversations(&self) -> usize {
        self.locks.len()
    }
}
