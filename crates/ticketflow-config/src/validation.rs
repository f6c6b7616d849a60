// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde attributes cannot express. All
//! violations are collected; validation does not fail fast.

use crate::diagnostic::ConfigError;
use crate::model::TicketflowConfig;

pub fn validate_config(config: &TicketflowConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.database_path", "must not be empty"));
    }

    if config.queue.name.trim().is_empty() {
        errors.push(ConfigError::invalid("queue.name", "must not be empty"));
    }

    for (key, value) in [
        ("queue.poll_interval_ms", config.queue.poll_interval_ms),
        ("queue.lock_timeout_secs", config.queue.lock_timeout_secs),
        ("schedules.claim_interval_secs", config.schedules.claim_interval_secs),
        ("sessions.reap_interval_secs", config.sessions.reap_interval_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::invalid(key, "must be greater than zero"));
        }
    }

    if config.queue.send_concurrency == 0 {
        errors.push(ConfigError::invalid("queue.send_concurrency", "must be at least 1"));
    }

    if config.queue.default_attempts == 0 || config.schedules.send_attempts == 0 {
        errors.push(ConfigError::invalid(
            "attempts",
            "queue.default_attempts and schedules.send_attempts must be at least 1",
        ));
    }

    if config.schedules.batch_size == 0 {
        errors.push(ConfigError::invalid("schedules.batch_size", "must be greater than zero"));
    }

    let bh = &config.business_hours;
    if bh.timezone.parse::<chrono_tz::Tz>().is_err() {
        errors.push(ConfigError::invalid(
            "business_hours.timezone",
            format!("`{}` is not an IANA timezone name", bh.timezone),
        ));
    }

    if bh.jitter_min_ms > bh.jitter_max_ms {
        errors.push(ConfigError::invalid(
            "business_hours.jitter_min_ms",
            format!(
                "must not exceed jitter_max_ms ({} > {})",
                bh.jitter_min_ms, bh.jitter_max_ms
            ),
        ));
    }

    if bh.debounce_cap == 0 {
        errors.push(ConfigError::invalid("business_hours.debounce_cap", "must be at least 1"));
    }

    if config.bridge.base_url.trim().is_empty() {
        errors.push(ConfigError::invalid("bridge.base_url", "must not be empty"));
    }

    if config.gateway.enabled {
        let missing = config
            .gateway
            .bearer_token
            .as_deref()
            .is_none_or(|t| t.trim().is_empty());
        if missing {
            errors.push(ConfigError::invalid(
                "gateway.bearer_token",
                "is required when the gateway is enabled",
            ));
        }
        if config.gateway.host.parse::<std::net::IpAddr>().is_err()
            && config.gateway.host != "localhost"
        {
            errors.push(ConfigError::invalid(
                "gateway.host",
                format!("`{}` is not a valid IP address", config.gateway.host),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&TicketflowConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_violation() {
        let mut config = TicketflowConfig::default();
        config.storage.database_path = " ".into();
        config.schedules.batch_size = 0;
        config.business_hours.timezone = "Mars/Olympus".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn jitter_bounds_must_be_ordered() {
        let mut config = TicketflowConfig::default();
        config.business_hours.jitter_min_ms = 2000;
        config.business_hours.jitter_max_ms = 1000;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("jitter_min_ms"));
    }

    #[test]
    fn enabled_gateway_requires_token() {
        let mut config = TicketflowConfig::default();
        config.gateway.enabled = true;
        assert!(validate_config(&config).is_err());
        config.gateway.bearer_token = Some("secret".into());
        assert!(validate_config(&config).is_ok());
    }
}
