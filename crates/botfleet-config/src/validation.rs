// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::FleetConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every problem instead of stopping at the first.
pub fn validate_config(config: &FleetConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.fleet.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "fleet.log_level `{}` must be one of {}",
            config.fleet.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if config.monitor.interval_secs == 0 {
        errors.push(ConfigError::validation(
            "monitor.interval_secs must be at least 1",
        ));
    }
    if config.monitor.connect_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "monitor.connect_timeout_secs must be at least 1",
        ));
    }

    let dispatch = &config.dispatch;
    if dispatch.workers == 0 {
        errors.push(ConfigError::validation("dispatch.workers must be at least 1"));
    }
    if dispatch.max_attempts == 0 {
        errors.push(ConfigError::validation(
            "dispatch.max_attempts must be at least 1",
        ));
    }
    if dispatch.batch_size == 0 {
        errors.push(ConfigError::validation(
            "dispatch.batch_size must be at least 1",
        ));
    }
    if dispatch.send_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "dispatch.send_timeout_secs must be at least 1",
        ));
    }
    if dispatch.backoff_base_ms > dispatch.backoff_max_ms {
        errors.push(ConfigError::validation(format!(
            "dispatch.backoff_base_ms ({}) must not exceed dispatch.backoff_max_ms ({})",
            dispatch.backoff_base_ms, dispatch.backoff_max_ms
        )));
    }

    if config.journal.max_entries == 0 {
        errors.push(ConfigError::validation(
            "journal.max_entries must be at least 1",
        ));
    }
    if config.journal.feed_capacity == 0 {
        errors.push(ConfigError::validation(
            "journal.feed_capacity must be at least 1",
        ));
    }

    let mut seen = HashSet::new();
    for (i, bot) in config.bots.iter().enumerate() {
        if bot.id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "bots[{i}].id must not be empty"
            )));
        } else if !seen.insert(bot.id.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate bot id `{}` in [[bots]] array",
                bot.id
            )));
        }
        if bot.token.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "bots[{i}].token must not be empty"
            )));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
