// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Botfleet bot operator.
//!
//! TOML files in an XDG hierarchy, `BOTFLEET_*` environment overrides,
//! strict key checking and miette diagnostics with typo suggestions.
//!
//! ```no_run
//! use botfleet_config::load_and_validate;
//!
//! let config = load_and_validate(None).expect("config errors");
//! println!("monitor interval: {:?}", config.monitor.interval());
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_str};
pub use model::{
    BotSeedConfig, DispatchConfig, FleetConfig, JournalConfig, MonitorConfig, StorageConfig,
    TelegramConfig,
};

/// Load the layered configuration and validate it.
///
/// `explicit` replaces `./botfleet.toml` as the local file when given.
pub fn load_and_validate(explicit: Option<&Path>) -> Result<FleetConfig, Vec<ConfigError>> {
    match loader::load_config(explicit) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = read_sources(explicit);
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Validate an inline TOML document over the defaults.
pub fn load_and_validate_str(toml_content: &str) -> Result<FleetConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Contents of every readable config file, keyed the way Figment reports them.
fn read_sources(explicit: Option<&Path>) -> Vec<(String, String)> {
    loader::search_paths(explicit)
        .into_iter()
        .filter_map(|path| {
            let content = std::fs::read_to_string(&path).ok()?;
            let absolute = if path.is_absolute() {
                path
            } else {
                std::env::current_dir().ok()?.join(path)
            };
            Some((absolute.display().to_string(), content))
        })
        .collect()
}
