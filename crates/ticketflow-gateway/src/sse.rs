// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events stream of realtime tenant events.
//!
//! Each event on the bus whose room belongs to the tenant is forwarded as:
//! ```text
//! event: schedule.created
//! data: {"room": "tenant-1-schedules", "payload": {...}}
//! ```

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::{Receiver, error::RecvError};

use ticketflow_core::RealtimeEvent;

use crate::server::GatewayState;

/// True when `room` is `tenant-{id}` or one of its sub-rooms.
pub fn room_belongs_to(room: &str, tenant_id: i64) -> bool {
    let prefix = format!("tenant-{tenant_id}");
    match room.strip_prefix(&prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('-'),
        None => false,
    }
}

fn to_sse(event: &RealtimeEvent) -> Event {
    let data = serde_json::json!({
        "room": event.room,
        "payload": event.payload,
    });
    Event::default().event(event.event.clone()).data(data.to_string())
}

/// Forwards the tenant's events from `rx` until the bus closes.
pub fn tenant_stream(
    rx: Receiver<RealtimeEvent>,
    tenant_id: i64,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) if room_belongs_to(&event.room, tenant_id) => {
                    return Some((Ok(to_sse(&event)), rx));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(tenant_id, skipped, "event stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

/// GET /v1/tenants/{tenant_id}/events
pub async fn tenant_events(
    State(state): State<GatewayState>,
    Path(tenant_id): Path<i64>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(tenant_id, "event stream opened");
    Sse::new(tenant_stream(state.bus.subscribe(), tenant_id))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::StreamExt;
    use ticketflow_core::{EventBus, EventPublisher};

    #[test]
    fn room_matching() {
        assert!(room_belongs_to("tenant-1", 1));
        assert!(room_belongs_to("tenant-1-schedules", 1));
        assert!(!room_belongs_to("tenant-12", 1));
        assert!(!room_belongs_to("tenant-2-schedules", 1));
        assert!(!room_belongs_to("global", 1));
    }

    #[tokio::test]
    async fn stream_skips_other_tenants() {
        let bus = EventBus::default();
        let stream = tenant_stream(bus.subscribe(), 1);
        tokio::pin!(stream);

        bus.publish(RealtimeEvent::new("tenant-2", "ticket", serde_json::json!({})));
        bus.publish(RealtimeEvent::new(
            "tenant-1-schedules",
            "schedule.created",
            serde_json::json!({"id": 7}),
        ));

        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(matches!(next, Some(Ok(_))));
    }

    #[tokio::test]
    async fn stream_ends_when_bus_dropped() {
        let bus = EventBus::default();
        let stream = tenant_stream(bus.subscribe(), 1);
        drop(bus);
        tokio::pin!(stream);
        assert!(stream.next().await.is_none());
    }
}
