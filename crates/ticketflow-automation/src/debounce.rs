// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anti-spam controls for out-of-hours notices.
//!
//! [`DebounceList`] decides whether a notice may go out at all, based on
//! when the last one was sent to the same conversation. [`DebouncedSender`]
//! then delays the actual send by a random jitter and collapses bursts for
//! the same conversation into the last scheduled send.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use ticketflow_core::types::OutboundMessage;
use ticketflow_core::ChannelAdapter;

/// Last-sent timestamps per conversation.
///
/// Once it holds more than `cap` entries the whole collection is flushed.
/// This is a coarse bound, not an LRU: a flush forgets every cooldown at once.
#[derive(Debug)]
pub struct DebounceList {
    entries: HashMap<i64, DateTime<Utc>>,
    cap: usize,
}

impl DebounceList {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            cap,
        }
    }

    /// Returns `true` and records `now` if no notice went to `key` within `cooldown`.
    pub fn try_acquire(&mut self, key: i64, now: DateTime<Utc>, cooldown: Duration) -> bool {
        if self.entries.len() > self.cap {
            debug!(entries = self.entries.len(), "debounce list over capacity; flushing");
            self.entries.clear();
        }

        let cooldown = chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX);
        if let Some(last) = self.entries.get(&key) {
            if now.signed_duration_since(*last) < cooldown {
                return false;
            }
        }
        self.entries.insert(key, now);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sends messages after a random jitter, keeping only the latest pending
/// send per key.
pub struct DebouncedSender {
    channel: Arc<dyn ChannelAdapter>,
    jitter: RangeInclusive<u64>,
    pending: Arc<Mutex<PendingSends>>,
}

#[derive(Default)]
struct PendingSends {
    generation: u64,
    tasks: HashMap<i64, (u64, AbortHandle)>,
}

impl DebouncedSender {
    pub fn new(channel: Arc<dyn ChannelAdapter>, jitter_min_ms: u64, jitter_max_ms: u64) -> Self {
        Self {
            channel,
            jitter: jitter_min_ms.min(jitter_max_ms)..=jitter_max_ms.max(jitter_min_ms),
            pending: Arc::new(Mutex::new(PendingSends::default())),
        }
    }

    /// Schedules `msg` for `key`, replacing a send for the same key that has
    /// not gone out yet. Delivery failures are logged and dropped.
    pub async fn schedule(&self, key: i64, msg: OutboundMessage) {
        let delay = Duration::from_millis(rand::thread_rng().gen_range(self.jitter.clone()));

        let mut pending = self.pending.lock().await;
        if let Some((_, previous)) = pending.tasks.remove(&key) {
            previous.abort();
            debug!(key, "replaced pending notice");
        }
        pending.generation += 1;
        let generation = pending.generation;

        let channel = self.channel.clone();
        let registry = self.pending.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = channel.send(msg).await {
                warn!(key, error = %e, "failed to deliver notice");
            }
            let mut pending = registry.lock().await;
            if pending.tasks.get(&key).is_some_and(|(g, _)| *g == generation) {
                pending.tasks.remove(&key);
            }
        });
        pending
            .tasks
            .insert(key, (generation, handle.abort_handle()));
    }

    /// Number of sends still waiting out their jitter.
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use ticketflow_test_utils::MockChannel;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn second_trigger_inside_cooldown_is_suppressed() {
        let mut list = DebounceList::new(100);
        let cooldown = Duration::from_secs(1800);
        assert!(list.try_acquire(1, t0(), cooldown));
        assert!(!list.try_acquire(1, t0() + chrono::Duration::minutes(29), cooldown));
        assert!(list.try_acquire(1, t0() + chrono::Duration::minutes(30), cooldown));
        // Other conversations are independent.
        assert!(list.try_acquire(2, t0(), cooldown));
    }

    #[test]
    fn oversized_list_is_flushed() {
        let mut list = DebounceList::new(2);
        let cooldown = Duration::from_secs(60);
        for key in 0..3 {
            assert!(list.try_acquire(key, t0(), cooldown));
        }
        assert_eq!(list.len(), 3);
        // Over capacity: everything is forgotten, including key 0's cooldown.
        assert!(list.try_acquire(0, t0(), cooldown));
        assert_eq!(list.len(), 1);
    }

    proptest! {
        #[test]
        fn exactly_one_notice_per_cooldown_window(
            offsets in proptest::collection::vec(0i64..1_000, 1..50),
        ) {
            let mut list = DebounceList::new(100);
            let cooldown = Duration::from_millis(1_000);
            let mut sorted = offsets;
            sorted.sort_unstable();

            let sent = sorted
                .iter()
                .filter(|ms| list.try_acquire(7, t0() + chrono::Duration::milliseconds(**ms), cooldown))
                .count();
            prop_assert_eq!(sent, 1);

            let later = t0() + chrono::Duration::milliseconds(sorted[0] + 1_000);
            prop_assert!(list.try_acquire(7, later, cooldown));
        }
    }

    fn notice(body: &str) -> OutboundMessage {
        OutboundMessage {
            connection_id: 1,
            to: "5511999990000".into(),
            body: body.into(),
            media_path: None,
        }
    }

    async fn wait_for_sends(channel: &MockChannel, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while channel.sent_count().await < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn burst_collapses_to_latest_send() {
        let channel = Arc::new(MockChannel::new());
        let sender = DebouncedSender::new(channel.clone(), 50, 50);

        sender.schedule(1, notice("first")).await;
        sender.schedule(1, notice("second")).await;
        wait_for_sends(&channel, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let sent = channel.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "second");
        assert_eq!(sender.pending().await, 0);
    }

    #[tokio::test]
    async fn failed_delivery_is_swallowed() {
        let channel = Arc::new(MockChannel::new());
        channel.fail_next(1);
        let sender = DebouncedSender::new(channel.clone(), 0, 0);

        sender.schedule(1, notice("lost")).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while sender.pending().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(channel.sent_count().await, 0);

        sender.schedule(2, notice("kept")).await;
        wait_for_sends(&channel, 1).await;
        assert_eq!(channel.sent_messages().await[0].body, "kept");
    }
}
