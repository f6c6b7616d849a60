// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ticketflow_automation::PipelineOutcome;
use ticketflow_core::TicketflowError;
use ticketflow_core::types::{InboundMessage, ScheduledMessage};
use ticketflow_schedule::{CreateSchedule, CreatedSchedules, SchedulePatch};

use crate::server::GatewayState;

/// Request body for `POST /v1/conversations/{id}/messages`.
#[derive(Debug, Deserialize)]
pub struct InboundRequest {
    /// Transport message id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub from: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

impl InboundRequest {
    fn into_message(self) -> InboundMessage {
        InboundMessage {
            id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            from: self.from,
            body: self.body,
            from_me: self.from_me,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            raw: self.raw,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A [`TicketflowError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub TicketflowError);

impl From<TicketflowError> for ApiError {
    fn from(e: TicketflowError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TicketflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TicketflowError::NotFound { .. } => StatusCode::NOT_FOUND,
            TicketflowError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            TicketflowError::Transport { .. } | TicketflowError::Integration { .. } => {
                StatusCode::BAD_GATEWAY
            }
            TicketflowError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "gateway request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// POST /v1/conversations/{id}/messages
///
/// Runs the message through the business-hours gate and the dispatcher.
pub async fn post_inbound(
    State(state): State<GatewayState>,
    Path(conversation_id): Path<i64>,
    Json(body): Json<InboundRequest>,
) -> Result<Json<PipelineOutcome>, ApiError> {
    let outcome = state
        .pipeline
        .process(conversation_id, body.into_message())
        .await?;
    Ok(Json(outcome))
}

/// GET /v1/tenants/{tenant_id}/schedules
pub async fn list_schedules(
    State(state): State<GatewayState>,
    Path(tenant_id): Path<i64>,
) -> Result<Json<Vec<ScheduledMessage>>, ApiError> {
    Ok(Json(state.schedules.list(tenant_id).await?))
}

/// POST /v1/tenants/{tenant_id}/schedules
pub async fn create_schedule(
    State(state): State<GatewayState>,
    Path(tenant_id): Path<i64>,
    Json(mut body): Json<CreateSchedule>,
) -> Result<(StatusCode, Json<CreatedSchedules>), ApiError> {
    body.tenant_id = tenant_id;
    let created = state.schedules.create(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PATCH /v1/tenants/{tenant_id}/schedules/{id}
pub async fn update_schedule(
    State(state): State<GatewayState>,
    Path((tenant_id, id)): Path<(i64, i64)>,
    Json(patch): Json<SchedulePatch>,
) -> Result<Json<ScheduledMessage>, ApiError> {
    Ok(Json(state.schedules.update(id, tenant_id, patch).await?))
}

/// DELETE /v1/tenants/{tenant_id}/schedules/{id}
pub async fn cancel_schedule(
    State(state): State<GatewayState>,
    Path((tenant_id, id)): Path<(i64, i64)>,
) -> Result<Json<ScheduledMessage>, ApiError> {
    Ok(Json(state.schedules.cancel(id, tenant_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_request_fills_defaults() {
        let req: InboundRequest = serde_json::from_str(r#"{"from": "5511", "body": "hi"}"#).unwrap();
        let msg = req.into_message();
        assert!(!msg.id.is_empty());
        assert!(!msg.from_me);
        assert_eq!(msg.body, "hi");
    }

    #[test]
    fn error_statuses() {
        let status = |e: TicketflowError| ApiError(e).into_response().status();
        assert_eq!(
            status(TicketflowError::Validation("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status(TicketflowError::not_found("schedule", 1)), StatusCode::NOT_FOUND);
        assert_eq!(status(TicketflowError::transport("down")), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status(TicketflowError::QueueUnavailable("scheduled".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
