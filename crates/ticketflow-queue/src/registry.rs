// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue reference resolution.
//!
//! Components that add jobs hold a [`QueueHandle`] injected at startup. If
//! the handle's reference is gone (it was never set, or was cleared while
//! the queue was being rebuilt) resolution falls back to the process-wide
//! cached queue and then to the [`QueueRegistry`], and re-seats the handle
//! with whatever it found.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tracing::{debug, warn};

use ticketflow_core::TicketflowError;

use crate::queue::WorkQueue;

static PROCESS_QUEUE: OnceLock<ArcSwapOption<WorkQueue>> = OnceLock::new();

fn process_slot() -> &'static ArcSwapOption<WorkQueue> {
    PROCESS_QUEUE.get_or_init(ArcSwapOption::empty)
}

/// Queues published by name.
#[derive(Default)]
pub struct QueueRegistry {
    queues: DashMap<String, Arc<WorkQueue>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, queue: Arc<WorkQueue>) {
        self.queues.insert(queue.name().to_string(), queue);
    }

    pub fn get(&self, name: &str) -> Option<Arc<WorkQueue>> {
        self.queues.get(name).map(|q| q.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<WorkQueue>> {
        self.queues.remove(name).map(|(_, q)| q)
    }
}

/// Makes `queue` recoverable by every handle in the process: caches it
/// process-wide and records it in `registry`.
pub fn publish(queue: Arc<WorkQueue>, registry: &QueueRegistry) {
    process_slot().store(Some(queue.clone()));
    registry.insert(queue);
}

/// Clears the process-wide cached queue.
pub fn clear_process_queue() {
    process_slot().store(None);
}

fn cached_process_queue(name: &str) -> Option<Arc<WorkQueue>> {
    process_slot()
        .load_full()
        .filter(|queue| queue.name() == name)
}

/// A resolvable reference to a named work queue.
pub struct QueueHandle {
    name: String,
    primary: ArcSwapOption<WorkQueue>,
    registry: Arc<QueueRegistry>,
}

impl QueueHandle {
    /// A handle with no reference yet; the first `resolve` goes through the fallbacks.
    pub fn new(name: impl Into<String>, registry: Arc<QueueRegistry>) -> Self {
        Self {
            name: name.into(),
            primary: ArcSwapOption::empty(),
            registry,
        }
    }

    pub fn with_queue(queue: Arc<WorkQueue>, registry: Arc<QueueRegistry>) -> Self {
        let handle = Self::new(queue.name(), registry);
        handle.primary.store(Some(queue));
        handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&self, queue: Arc<WorkQueue>) {
        self.primary.store(Some(queue));
    }

    /// Drops the held reference.
    pub fn clear(&self) {
        self.primary.store(None);
    }

    /// Returns the queue, recovering the reference if it was lost.
    pub fn resolve(&self) -> Result<Arc<WorkQueue>, TicketflowError> {
        if let Some(queue) = self.primary.load_full() {
            return Ok(queue);
        }

        if let Some(queue) = cached_process_queue(&self.name) {
            warn!(queue = %self.name, "queue reference lost; recovered from process cache");
            self.primary.store(Some(queue.clone()));
            return Ok(queue);
        }

        if let Some(queue) = self.registry.get(&self.name) {
            warn!(queue = %self.name, "queue reference lost; recovered from registry");
            self.primary.store(Some(queue.clone()));
            return Ok(queue);
        }

        Err(TicketflowError::QueueUnavailable(self.name.clone()))
    }

    /// [`resolve`](Self::resolve), retried up to `attempts` times with `delay`
    /// between tries while the queue is being brought up.
    pub async fn resolve_with_retry(
        &self,
        attempts: u32,
        delay: Duration,
    ) -> Result<Arc<WorkQueue>, TicketflowError> {
        let mut tries = 0;
        loop {
            match self.resolve() {
                Ok(queue) => return Ok(queue),
                Err(e) => {
                    tries += 1;
                    if tries >= attempts.max(1) {
                        return Err(e);
                    }
                    debug!(queue = %self.name, attempt = tries, "queue not yet available; retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use ticketflow_test_utils::TestHarness;

    fn work_queue(harness: &TestHarness, name: &str) -> Arc<WorkQueue> {
        Arc::new(WorkQueue::new(
            name,
            harness.storage.clone(),
            harness.clock.clone(),
        ))
    }

    #[tokio::test]
    #[serial]
    async fn primary_reference_wins() {
        let harness = TestHarness::new().await.unwrap();
        let registry = Arc::new(QueueRegistry::new());
        let q = work_queue(&harness, "primary");

        let handle = QueueHandle::with_queue(q.clone(), registry);
        assert!(Arc::ptr_eq(&handle.resolve().unwrap(), &q));
    }

    #[tokio::test]
    #[serial]
    async fn lost_reference_recovers_from_process_cache_first() {
        let harness = TestHarness::new().await.unwrap();
        let registry = Arc::new(QueueRegistry::new());
        let cached = work_queue(&harness, "recover");
        let registered = work_queue(&harness, "recover");

        publish(cached.clone(), &QueueRegistry::new());
        registry.insert(registered);

        let handle = QueueHandle::new("recover", registry);
        assert!(Arc::ptr_eq(&handle.resolve().unwrap(), &cached));
        clear_process_queue();
    }

    #[tokio::test]
    #[serial]
    async fn falls_back_to_registry_and_reseats_handle() {
        let harness = TestHarness::new().await.unwrap();
        clear_process_queue();
        let registry = Arc::new(QueueRegistry::new());
        let q = work_queue(&harness, "scheduled");
        registry.insert(q.clone());

        let handle = QueueHandle::new("scheduled", registry.clone());
        assert!(Arc::ptr_eq(&handle.resolve().unwrap(), &q));

        // The handle keeps the recovered reference.
        registry.remove("scheduled");
        assert!(Arc::ptr_eq(&handle.resolve().unwrap(), &q));
    }

    #[tokio::test]
    #[serial]
    async fn process_cache_for_another_queue_is_ignored() {
        let harness = TestHarness::new().await.unwrap();
        publish(work_queue(&harness, "other"), &QueueRegistry::new());

        let handle = QueueHandle::new("missing", Arc::new(QueueRegistry::new()));
        let err = handle.resolve().unwrap_err();
        assert!(matches!(err, TicketflowError::QueueUnavailable(ref n) if n == "missing"));
        clear_process_queue();
    }

    #[tokio::test]
    #[serial]
    async fn retry_picks_up_a_late_registration() {
        let harness = TestHarness::new().await.unwrap();
        clear_process_queue();
        let registry = Arc::new(QueueRegistry::new());
        let handle = QueueHandle::new("late", registry.clone());
        let q = work_queue(&harness, "late");

        let late = {
            let registry = registry.clone();
            let q = q.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                registry.insert(q);
            })
        };

        let resolved = handle
            .resolve_with_retry(50, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&resolved, &q));
        late.await.unwrap();
    }
}
