// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration dispatcher.
//!
//! Routes an inbound message to the automated handler selected by the
//! conversation's integration binding and reports whether automation
//! consumed it. Handler failures degrade to "not consumed" so the
//! conversation stays available for a human, with one exception: an
//! automation relay that cannot be reached fails the message.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use ticketflow_config::model::AutomationConfig;
use ticketflow_core::types::{
    Contact, Conversation, InboundMessage, IntegrationBinding, IntegrationKind, OutboundMessage,
};
use ticketflow_core::{
    AssistantHandler, BotPlatformListener, ChannelAdapter, FlowEngine, HandlerContext,
    StorageAdapter, TicketflowError,
};

use crate::webhook::WebhookClient;

#[derive(Debug, Deserialize)]
struct WebhookBinding {
    url: String,
    /// Queue to hand the conversation to once the webhook accepted the message.
    #[serde(default)]
    transfer_queue_id: Option<i64>,
    /// Greeting sent on handoff; falls back to the queue's greeting.
    #[serde(default)]
    greeting: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelayBinding {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantBinding {
    #[serde(default)]
    assistant_id: Option<i64>,
}

fn binding_config<T: serde::de::DeserializeOwned>(
    binding: &IntegrationBinding,
) -> Result<T, TicketflowError> {
    serde_json::from_value(binding.config.clone()).map_err(|e| TicketflowError::Integration {
        message: format!("binding {} ({}) is misconfigured: {e}", binding.id, binding.kind),
        source: Some(Box::new(e)),
    })
}

/// The automated handlers a dispatcher can route to.
#[derive(Clone)]
pub struct Handlers {
    pub flow: Arc<dyn FlowEngine>,
    pub bot_platform: Arc<dyn BotPlatformListener>,
    pub assistant: Arc<dyn AssistantHandler>,
}

pub struct IntegrationDispatcher {
    storage: Arc<dyn StorageAdapter>,
    channel: Arc<dyn ChannelAdapter>,
    webhook: WebhookClient,
    handlers: Handlers,
    restricted_number: Option<String>,
}

impl IntegrationDispatcher {
    pub fn new(
        config: &AutomationConfig,
        storage: Arc<dyn StorageAdapter>,
        channel: Arc<dyn ChannelAdapter>,
        handlers: Handlers,
    ) -> Result<Self, TicketflowError> {
        let webhook =
            WebhookClient::new(std::time::Duration::from_secs(config.webhook_timeout_secs))?;
        Ok(Self {
            storage,
            channel,
            webhook,
            handlers,
            restricted_number: config
                .restricted_number
                .clone()
                .filter(|n| !n.trim().is_empty()),
        })
    }

    /// Returns whether automation consumed `message`.
    ///
    /// `conversation` is updated in place with whatever the handler changed.
    /// Only an unreachable automation relay produces an error.
    pub async fn dispatch(
        &self,
        message: &InboundMessage,
        conversation: &mut Conversation,
        contact: &Contact,
        binding: &IntegrationBinding,
    ) -> Result<bool, TicketflowError> {
        if let Some(allowed) = &self.restricted_number {
            if message.from != *allowed {
                debug!(from = %message.from, "restricted mode; dispatch skipped");
                return Ok(false);
            }
        }
        if binding.tenant_id != conversation.tenant_id {
            warn!(
                conversation_id = conversation.id,
                binding_id = binding.id,
                "binding belongs to another tenant; dispatch rejected"
            );
            return Ok(false);
        }

        debug!(
            conversation_id = conversation.id,
            binding_id = binding.id,
            kind = %binding.kind,
            "dispatching inbound message"
        );

        let result = match binding.kind {
            IntegrationKind::FlowEngine => self.run_flow(message, conversation, contact, binding).await,
            IntegrationKind::Webhook => self.run_webhook(message, conversation, binding).await,
            IntegrationKind::AutomationRelay => {
                return self.run_relay(message, conversation, binding).await;
            }
            IntegrationKind::BotPlatform => {
                self.run_bot_platform(message, conversation, contact, binding).await
            }
            IntegrationKind::Assistant => {
                self.run_assistant(message, conversation, contact, binding).await
            }
        };

        match result {
            Ok(consumed) => Ok(consumed),
            Err(e) => {
                warn!(
                    conversation_id = conversation.id,
                    binding_id = binding.id,
                    kind = %binding.kind,
                    error = %e,
                    "integration failed; message left for manual handling"
                );
                Ok(false)
            }
        }
    }

    fn context(
        message: &InboundMessage,
        conversation: &Conversation,
        contact: &Contact,
        binding: &IntegrationBinding,
    ) -> HandlerContext {
        HandlerContext {
            message: message.clone(),
            conversation: conversation.clone(),
            contact: contact.clone(),
            binding: binding.clone(),
        }
    }

    async fn run_flow(
        &self,
        message: &InboundMessage,
        conversation: &mut Conversation,
        contact: &Contact,
        binding: &IntegrationBinding,
    ) -> Result<bool, TicketflowError> {
        conversation.is_bot = true;
        self.storage.save_conversation(conversation).await?;
        let ctx = Self::context(message, conversation, contact, binding);
        self.handlers.flow.run(&ctx).await
    }

    async fn run_webhook(
        &self,
        message: &InboundMessage,
        conversation: &mut Conversation,
        binding: &IntegrationBinding,
    ) -> Result<bool, TicketflowError> {
        let config: WebhookBinding = binding_config(binding)?;
        self.webhook.post(&config.url, &message.raw_event()).await?;

        conversation.automation_usage += 1;
        if let Some(queue_id) = config.transfer_queue_id {
            self.hand_off(conversation, queue_id, config.greeting).await?;
        }
        self.storage.save_conversation(conversation).await?;
        Ok(true)
    }

    async fn hand_off(
        &self,
        conversation: &mut Conversation,
        queue_id: i64,
        greeting: Option<String>,
    ) -> Result<(), TicketflowError> {
        let queue = self
            .storage
            .get_queue(queue_id)
            .await?
            .ok_or_else(|| TicketflowError::not_found("queue", queue_id))?;

        let greeting = greeting
            .or(queue.greeting_message)
            .filter(|g| !g.trim().is_empty());
        if let Some(body) = greeting {
            self.send_to_contact(conversation, body).await;
        }

        conversation.queue_id = Some(queue.id);
        conversation.queue_option_id = None;
        conversation.is_bot = false;
        conversation.use_integration = false;
        conversation.integration_id = None;
        info!(conversation_id = conversation.id, queue_id = queue.id, "conversation handed off to queue");
        Ok(())
    }

    /// Best effort: failures are logged.
    async fn send_to_contact(&self, conversation: &Conversation, body: String) {
        let contact = match self.storage.get_contact(conversation.contact_id).await {
            Ok(Some(contact)) => contact,
            Ok(None) => return,
            Err(e) => {
                warn!(conversation_id = conversation.id, error = %e, "failed to load contact for greeting");
                return;
            }
        };
        let (Some(to), Some(connection_id)) = (contact.number, conversation.connection_id) else {
            return;
        };
        let msg = OutboundMessage {
            connection_id,
            to,
            body,
            media_path: None,
        };
        if let Err(e) = self.channel.send(msg).await {
            warn!(conversation_id = conversation.id, error = %e, "failed to send greeting");
        }
    }

    async fn run_relay(
        &self,
        message: &InboundMessage,
        conversation: &Conversation,
        binding: &IntegrationBinding,
    ) -> Result<bool, TicketflowError> {
        let config: RelayBinding = match binding_config(binding) {
            Ok(config) => config,
            Err(e) => {
                warn!(conversation_id = conversation.id, error = %e, "relay binding misconfigured");
                return Ok(false);
            }
        };
        self.webhook.post(&config.url, &message.raw_event()).await?;
        debug!(conversation_id = conversation.id, "event relayed");
        Ok(false)
    }

    async fn run_bot_platform(
        &self,
        message: &InboundMessage,
        conversation: &Conversation,
        contact: &Contact,
        binding: &IntegrationBinding,
    ) -> Result<bool, TicketflowError> {
        let options = match conversation.queue_id {
            Some(queue_id) => self.storage.queue_option_ids(queue_id).await?,
            None => Vec::new(),
        };
        let ctx = Self::context(message, conversation, contact, binding);
        self.handlers.bot_platform.listen(&ctx, &options).await
    }

    async fn run_assistant(
        &self,
        message: &InboundMessage,
        conversation: &mut Conversation,
        contact: &Contact,
        binding: &IntegrationBinding,
    ) -> Result<bool, TicketflowError> {
        let config: AssistantBinding = binding_config(binding)?;
        let Some(assistant) = self
            .storage
            .find_active_assistant(conversation.tenant_id, config.assistant_id)
            .await?
        else {
            info!(
                conversation_id = conversation.id,
                tenant_id = conversation.tenant_id,
                "no active assistant for tenant"
            );
            return Ok(false);
        };

        conversation.user_id = None;
        conversation.queue_id = None;
        conversation.is_bot = true;
        self.storage.save_conversation(conversation).await?;

        let ctx = Self::context(message, conversation, contact, binding);
        if !self.handlers.assistant.handle(&ctx, &assistant).await? {
            return Ok(false);
        }

        conversation.use_integration = true;
        conversation.integration_id = Some(binding.id);
        conversation.automation_usage += 1;
        self.storage.save_conversation(conversation).await?;
        Ok(true)
    }
}
