// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Ticketflow automation engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Ticketflow configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TicketflowConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Durable work queue and worker settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Scheduled message claiming and delivery.
    #[serde(default)]
    pub schedules: SchedulesConfig,

    /// Conversation session reaping.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Business-hours gate and out-of-office debounce.
    #[serde(default)]
    pub business_hours: BusinessHoursConfig,

    /// Integration dispatcher settings.
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Messaging transport and remote handler bridge.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// HTTP gateway.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "ticketflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("ticketflow").join("ticketflow.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("ticketflow.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_true() -> bool {
    true
}

/// Durable work queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Name of the queue every periodic and send job is added to.
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// How often an idle worker polls for runnable jobs.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a dequeued job stays locked before it counts as stalled.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Concurrent `send_scheduled_message` jobs per worker.
    #[serde(default = "default_send_concurrency")]
    pub send_concurrency: usize,

    /// Attempts for periodic jobs.
    #[serde(default = "default_attempts")]
    pub default_attempts: u32,

    /// Base delay of the exponential backoff for periodic jobs.
    #[serde(default = "default_backoff_ms")]
    pub default_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            poll_interval_ms: default_poll_interval_ms(),
            lock_timeout_secs: default_lock_timeout_secs(),
            send_concurrency: default_send_concurrency(),
            default_attempts: default_attempts(),
            default_backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_queue_name() -> String {
    "ticketflow".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_lock_timeout_secs() -> u64 {
    300
}

fn default_send_concurrency() -> usize {
    5
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

/// Scheduled message claim loop and send job configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulesConfig {
    #[serde(default = "default_claim_interval_secs")]
    pub claim_interval_secs: u64,

    /// Records due within `now + lookahead` are claimed.
    #[serde(default = "default_lookahead_secs")]
    pub lookahead_secs: u64,

    /// Maximum records claimed per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Initial delay of each enqueued send job.
    #[serde(default = "default_enqueue_delay_ms")]
    pub enqueue_delay_ms: u64,

    #[serde(default = "default_send_attempts")]
    pub send_attempts: u32,

    #[serde(default = "default_send_backoff_ms")]
    pub send_backoff_ms: u64,

    /// Directory relative media paths are resolved against.
    #[serde(default = "default_media_dir")]
    pub media_dir: String,
}

impl Default for SchedulesConfig {
    fn default() -> Self {
        Self {
            claim_interval_secs: default_claim_interval_secs(),
            lookahead_secs: default_lookahead_secs(),
            batch_size: default_batch_size(),
            enqueue_delay_ms: default_enqueue_delay_ms(),
            send_attempts: default_send_attempts(),
            send_backoff_ms: default_send_backoff_ms(),
            media_dir: default_media_dir(),
        }
    }
}

fn default_claim_interval_secs() -> u64 {
    30
}

fn default_lookahead_secs() -> u64 {
    60
}

fn default_batch_size() -> usize {
    500
}

fn default_enqueue_delay_ms() -> u64 {
    1000
}

fn default_send_attempts() -> u32 {
    5
}

fn default_send_backoff_ms() -> u64 {
    2000
}

fn default_media_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("ticketflow").join("media"))
        .unwrap_or_else(|| std::path::PathBuf::from("media"))
        .to_string_lossy()
        .into_owned()
}

/// Conversation session reaper configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionsConfig {
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Notice sent to the contact when an abandoned dialog is reaped.
    #[serde(default = "default_expiry_notice")]
    pub expiry_notice: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            reap_interval_secs: default_reap_interval_secs(),
            expiry_notice: default_expiry_notice(),
        }
    }
}

fn default_reap_interval_secs() -> u64 {
    60
}

fn default_expiry_notice() -> String {
    "Your session was closed due to inactivity. Send any message to start again.".to_string()
}

/// Business-hours gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusinessHoursConfig {
    /// IANA timezone schedule tables are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Repeat-notice cooldown in company mode.
    #[serde(default = "default_company_cooldown_ms")]
    pub company_cooldown_ms: u64,

    /// Repeat-notice cooldown in queue mode.
    #[serde(default = "default_queue_cooldown_secs")]
    pub queue_cooldown_secs: u64,

    /// Debounce entries kept before the whole collection is flushed.
    #[serde(default = "default_debounce_cap")]
    pub debounce_cap: usize,

    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,

    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
}

impl Default for BusinessHoursConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            company_cooldown_ms: default_company_cooldown_ms(),
            queue_cooldown_secs: default_queue_cooldown_secs(),
            debounce_cap: default_debounce_cap(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_company_cooldown_ms() -> u64 {
    1000
}

fn default_queue_cooldown_secs() -> u64 {
    1800
}

fn default_debounce_cap() -> usize {
    100
}

fn default_jitter_min_ms() -> u64 {
    500
}

fn default_jitter_max_ms() -> u64 {
    1500
}

/// Integration dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AutomationConfig {
    /// Development mode: when set, automation only runs for this sender address.
    #[serde(default)]
    pub restricted_number: Option<String>,

    /// Timeout of outbound webhook and relay POSTs.
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            restricted_number: None,
            webhook_timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

fn default_webhook_timeout_secs() -> u64 {
    15
}

/// Bridge to the messaging transport and remote handler services.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default = "default_bridge_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            api_token: None,
            timeout_secs: default_bridge_timeout_secs(),
        }
    }
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_bridge_timeout_secs() -> u64 {
    30
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Required when the gateway is enabled.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3000
}
