// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./ticketflow.toml` > `~/.config/ticketflow/ticketflow.toml`
//! > `/etc/ticketflow/ticketflow.toml` with environment variable overrides via the
//! `TICKETFLOW_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TicketflowConfig;

pub(crate) const LOCAL_CONFIG: &str = "ticketflow.toml";
pub(crate) const SYSTEM_CONFIG: &str = "/etc/ticketflow/ticketflow.toml";

/// Top-level sections that environment variables may address.
///
/// Longer names must come before any name they start with.
const ENV_SECTIONS: &[&str] = &[
    "business_hours",
    "automation",
    "schedules",
    "sessions",
    "service",
    "storage",
    "gateway",
    "bridge",
    "queue",
];

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("ticketflow").join(LOCAL_CONFIG))
        .unwrap_or_default()
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/ticketflow/ticketflow.toml` (system-wide)
/// 3. `~/.config/ticketflow/ticketflow.toml` (user XDG config)
/// 4. `./ticketflow.toml` (local directory)
/// 5. `TICKETFLOW_*` environment variables
pub fn load_config() -> Result<TicketflowConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<TicketflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TicketflowConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TicketflowConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TicketflowConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TicketflowConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Maps a lowercased, prefix-stripped env var name onto a dotted config path.
///
/// `business_hours_queue_cooldown_secs` becomes `business_hours.queue_cooldown_secs`.
/// Only the leading section is split; keys keep their underscores.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section) {
            if let Some(field) = rest.strip_prefix('_') {
                return format!("{section}.{field}");
            }
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("TICKETFLOW_").map(|key| map_env_key(key.as_str()).into())
}
