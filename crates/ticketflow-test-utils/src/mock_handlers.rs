// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock automated handlers that record invocations and return scripted results.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use ticketflow_core::traits::handlers::{
    AssistantHandler, BotPlatformListener, FlowEngine, HandlerContext,
};
use ticketflow_core::types::Assistant;
use ticketflow_core::TicketflowError;

/// Scripted outcome shared by the mock handlers.
struct Script {
    result: AtomicBool,
    fail: AtomicBool,
}

impl Script {
    fn new(result: bool) -> Self {
        Self {
            result: AtomicBool::new(result),
            fail: AtomicBool::new(false),
        }
    }

    fn outcome(&self) -> Result<bool, TicketflowError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TicketflowError::transport("mock handler failure"));
        }
        Ok(self.result.load(Ordering::SeqCst))
    }
}

/// Mock scripted flow engine. Records the conversation id of every run.
pub struct MockFlowEngine {
    script: Script,
    calls: Mutex<Vec<i64>>,
}

impl MockFlowEngine {
    pub fn new(result: bool) -> Self {
        Self {
            script: Script::new(result),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make subsequent runs return an error.
    pub fn set_failing(&self, fail: bool) {
        self.script.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<i64> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl FlowEngine for MockFlowEngine {
    async fn run(&self, ctx: &HandlerContext) -> Result<bool, TicketflowError> {
        self.calls.lock().await.push(ctx.conversation.id);
        self.script.outcome()
    }
}

/// Mock bot-platform listener. Records `(conversation_id, queue_options)`.
pub struct MockBotPlatform {
    script: Script,
    calls: Mutex<Vec<(i64, Vec<i64>)>>,
}

impl MockBotPlatform {
    pub fn new(result: bool) -> Self {
        Self {
            script: Script::new(result),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn calls(&self) -> Vec<(i64, Vec<i64>)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl BotPlatformListener for MockBotPlatform {
    async fn listen(
        &self,
        ctx: &HandlerContext,
        queue_options: &[i64],
    ) -> Result<bool, TicketflowError> {
        self.calls
            .lock()
            .await
            .push((ctx.conversation.id, queue_options.to_vec()));
        self.script.outcome()
    }
}

/// Mock conversational assistant. Records `(conversation_id, assistant_id)`.
pub struct MockAssistant {
    script: Script,
    calls: Mutex<Vec<(i64, i64)>>,
}

impl MockAssistant {
    pub fn new(result: bool) -> Self {
        Self {
            script: Script::new(result),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_result(&self, result: bool) {
        self.script.result.store(result, Ordering::SeqCst);
    }

    pub async fn calls(&self) -> Vec<(i64, i64)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl AssistantHandler for MockAssistant {
    async fn handle(
        &self,
        ctx: &HandlerContext,
        assistant: &Assistant,
    ) -> Result<bool, TicketflowError> {
        self.calls
            .lock()
            .await
            .push((ctx.conversation.id, assistant.id));
        self.script.outcome()
    }
}
