// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use ticketflow_automation::InboundPipeline;
use ticketflow_config::model::GatewayConfig;
use ticketflow_core::{EventBus, TicketflowError};
use ticketflow_schedule::ScheduleService;

use crate::auth::{AuthConfig, auth_middleware};
use crate::{handlers, sse};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub pipeline: Arc<InboundPipeline>,
    pub schedules: Arc<ScheduleService>,
    /// Source of realtime events streamed to clients.
    pub bus: EventBus,
    pub start_time: Instant,
}

/// Builds the gateway router.
///
/// `/health` is public; everything under `/v1` requires the bearer token.
pub fn router(state: GatewayState, auth: AuthConfig) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/v1/conversations/{id}/messages",
            post(handlers::post_inbound),
        )
        .route(
            "/v1/tenants/{tenant_id}/schedules",
            get(handlers::list_schedules).post(handlers::create_schedule),
        )
        .route(
            "/v1/tenants/{tenant_id}/schedules/{id}",
            patch(handlers::update_schedule).delete(handlers::cancel_schedule),
        )
        .route("/v1/tenants/{tenant_id}/events", get(sse::tenant_events))
        .route_layer(axum_middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serves the gateway until `cancel` fires.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), TicketflowError> {
    let app = router(
        state,
        AuthConfig {
            bearer_token: config.bearer_token.clone(),
        },
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TicketflowError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| TicketflowError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("gateway stopped");
    Ok(())
}
