// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Automated handlers that run in a remote service behind the bridge.
//!
//! Each call POSTs the handler context and expects `{"handled": bool}` back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ticketflow_core::types::{Assistant, Contact, Conversation, InboundMessage, IntegrationBinding};
use ticketflow_core::{
    AssistantHandler, BotPlatformListener, FlowEngine, HandlerContext, TicketflowError,
};

use crate::client::BridgeClient;

#[derive(Serialize)]
struct HandlerRequest<'a> {
    message: &'a InboundMessage,
    conversation: &'a Conversation,
    contact: &'a Contact,
    binding: &'a IntegrationBinding,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_options: Option<&'a [i64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assistant: Option<&'a Assistant>,
}

impl<'a> HandlerRequest<'a> {
    fn new(ctx: &'a HandlerContext) -> Self {
        Self {
            message: &ctx.message,
            conversation: &ctx.conversation,
            contact: &ctx.contact,
            binding: &ctx.binding,
            queue_options: None,
            assistant: None,
        }
    }
}

#[derive(Deserialize)]
struct HandlerResponse {
    handled: bool,
}

/// Flow engine, bot platform and assistant handlers served over HTTP.
#[derive(Clone)]
pub struct RemoteHandlers {
    client: BridgeClient,
}

impl RemoteHandlers {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }

    async fn call(&self, path: &str, request: &HandlerRequest<'_>) -> Result<bool, TicketflowError> {
        let response: HandlerResponse = self.client.post(path, request).await?;
        debug!(
            path,
            conversation_id = request.conversation.id,
            handled = response.handled,
            "remote handler replied"
        );
        Ok(response.handled)
    }
}

#[async_trait]
impl FlowEngine for RemoteHandlers {
    async fn run(&self, ctx: &HandlerContext) -> Result<bool, TicketflowError> {
        self.call("/handlers/flow", &HandlerRequest::new(ctx)).await
    }
}

#[async_trait]
impl BotPlatformListener for RemoteHandlers {
    async fn listen(
        &self,
        ctx: &HandlerContext,
        queue_options: &[i64],
    ) -> Result<bool, TicketflowError> {
        let request = HandlerRequest {
            queue_options: Some(queue_options),
            ..HandlerRequest::new(ctx)
        };
        self.call("/handlers/bot-platform", &request).await
    }
}

#[async_trait]
impl AssistantHandler for RemoteHandlers {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        assistant: &Assistant,
    ) -> Result<bool, TicketflowError> {
        let request = HandlerRequest {
            assistant: Some(assistant),
            ..HandlerRequest::new(ctx)
        };
        self.call(&format!("/handlers/assistants/{}", assistant.id), &request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketflow_config::model::BridgeConfig;
    use ticketflow_core::types::IntegrationKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context() -> HandlerContext {
        HandlerContext {
            message: InboundMessage {
                id: "m1".into(),
                from: "5511999990000".into(),
                body: "menu".into(),
                from_me: false,
                timestamp: chrono::DateTime::parse_from_rfc3339("2026-03-02T10:00:00Z")
                    .unwrap()
                    .with_timezone(&chrono::Utc),
                raw: None,
            },
            conversation: Conversation {
                id: 1000,
                tenant_id: 1,
                contact_id: 10,
                connection_id: Some(100),
                queue_id: None,
                user_id: None,
                status: "pending".into(),
                is_bot: false,
                use_integration: false,
                integration_id: Some(50),
                queue_option_id: None,
                automation_usage: 0,
                is_out_of_hour: None,
            },
            contact: Contact {
                id: 10,
                tenant_id: 1,
                name: "Maria Silva".into(),
                number: Some("5511999990000".into()),
                email: None,
            },
            binding: IntegrationBinding {
                id: 50,
                tenant_id: 1,
                name: "remote".into(),
                kind: IntegrationKind::BotPlatform,
                config: serde_json::json!({}),
            },
        }
    }

    fn handlers(server: &MockServer) -> RemoteHandlers {
        RemoteHandlers::new(
            BridgeClient::new(&BridgeConfig {
                base_url: server.uri(),
                api_token: None,
                timeout_secs: 5,
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn bot_platform_forwards_queue_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/handlers/bot-platform"))
            .and(body_partial_json(serde_json::json!({
                "queue_options": [3, 4],
                "conversation": {"id": 1000}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"handled": true})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(handlers(&server).listen(&context(), &[3, 4]).await.unwrap());
    }

    #[tokio::test]
    async fn assistant_posts_to_its_route() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/handlers/assistants/9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"handled": false})))
            .expect(1)
            .mount(&server)
            .await;

        let assistant = Assistant {
            id: 9,
            tenant_id: 1,
            name: "Ana".into(),
            active: true,
            prompt: "Be helpful".into(),
            model: "small".into(),
        };
        assert!(!handlers(&server).handle(&context(), &assistant).await.unwrap());
    }

    #[tokio::test]
    async fn flow_error_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/handlers/flow"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = handlers(&server).run(&context()).await.unwrap_err();
        assert!(matches!(err, TicketflowError::Transport { .. }));
    }
}
