// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process realtime event bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use crate::traits::realtime::{EventPublisher, RealtimeEvent};

/// Default number of events buffered per subscriber before lagging.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast fan-out of [`RealtimeEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: RealtimeEvent) {
        // No subscribers is not an error.
        if self.tx.send(event).is_err() {
            tracing::trace!("realtime event dropped: no subscribers");
        }
    }
}
