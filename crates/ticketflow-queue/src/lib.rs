// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable work queue for the Ticketflow automation engine.
//!
//! Jobs live in the storage adapter so they survive restarts. Workers pull
//! runnable jobs, run them through registered handlers, and reschedule
//! failures with backoff. Repeating housekeeping jobs are registered once at
//! startup and promoted into ordinary jobs as they come due.

pub mod periodic;
pub mod queue;
pub mod registry;
pub mod worker;

pub use periodic::{
    CLAIM_SCHEDULED_MESSAGES, PeriodicJob, REAP_EXPIRED_SESSIONS, RECOVER_STALLED_JOBS,
    RecoverStalledJobs, SEND_SCHEDULED_MESSAGE, periodic_job_options, periodic_jobs,
    register_periodic_jobs,
};
pub use queue::WorkQueue;
pub use registry::{QueueHandle, QueueRegistry, clear_process_queue, publish};
pub use worker::{JobHandler, Worker, WorkerOptions};
