// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Botfleet bot operator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Botfleet configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    /// Operator identity and logging.
    #[serde(default)]
    pub fleet: FleetSection,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Lifecycle monitor settings.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Outbound dispatcher settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Telegram transport settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Log journal and live feed settings.
    #[serde(default)]
    pub journal: JournalConfig,

    /// Bots registered at startup when absent from storage.
    #[serde(default)]
    pub bots: Vec<BotSeedConfig>,
}

/// Operator identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FleetSection {
    /// Display name of this operator instance.
    #[serde(default = "default_fleet_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for FleetSection {
    fn default() -> Self {
        Self {
            name: default_fleet_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_fleet_name() -> String {
    "botfleet".to_string()
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
    "botfleet.db".to_string()
}

fn default_true() -> bool {
    true
}

/// Lifecycle monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Seconds between reconciliation ticks.
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,

    /// Seconds before a session open attempt counts as failed.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Seconds a deregistration waits for the monitor to close the session.
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout_secs: u64,
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_secs(self.teardown_timeout_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval(),
            connect_timeout_secs: default_connect_timeout(),
            teardown_timeout_secs: default_teardown_timeout(),
        }
    }
}

fn default_monitor_interval() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_teardown_timeout() -> u64 {
    15
}

/// Outbound dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Number of delivery workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Delivery attempts per job before it is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on the exponential part of the retry delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Maximum random delay added to each retry.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Seconds before a delivery attempt counts as a transient failure.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// How often the scheduler looks for due jobs when nothing wakes it.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum jobs claimed per scheduler pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl DispatchConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            jitter_ms: default_jitter_ms(),
            send_timeout_secs: default_send_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_jitter_ms() -> u64 {
    500
}

fn default_send_timeout() -> u64 {
    15
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_batch_size() -> usize {
    64
}

/// Telegram transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API base URL. `None` uses the public Telegram endpoint.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Long-polling timeout passed to `getUpdates`, in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

fn default_poll_timeout() -> u32 {
    30
}

/// Log journal and live feed configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JournalConfig {
    /// Entries kept in the in-memory log journal.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Events buffered per live feed client before it starts lagging.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

fn default_max_entries() -> usize {
    1000
}

fn default_feed_capacity() -> usize {
    256
}

/// A bot declared in configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotSeedConfig {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub token: String,

    /// Whether the bot should be connected once seeded.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl BotSeedConfig {
    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
