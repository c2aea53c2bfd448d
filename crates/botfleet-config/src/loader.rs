// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `/etc/botfleet/botfleet.toml`, `~/.config/botfleet/botfleet.toml`,
//! `./botfleet.toml` (or an explicit path), then `BOTFLEET_*` variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::FleetConfig;

/// File name looked up in each configuration directory.
pub const CONFIG_FILE_NAME: &str = "botfleet.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "BOTFLEET_";

/// Top-level sections an environment key may address.
const ENV_SECTIONS: &[&str] = &[
    "fleet", "storage", "monitor", "dispatch", "telegram", "journal",
];

/// System-wide configuration file.
pub fn system_config_path() -> PathBuf {
    Path::new("/etc/botfleet").join(CONFIG_FILE_NAME)
}

/// Per-user configuration file under the XDG config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("botfleet").join(CONFIG_FILE_NAME))
}

/// Files consulted by [`load_config`], lowest precedence first.
pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = vec![system_config_path()];
    paths.extend(user_config_path());
    match explicit {
        Some(path) => paths.push(path.to_path_buf()),
        None => paths.push(PathBuf::from(CONFIG_FILE_NAME)),
    }
    paths
}

/// Build the Figment without extracting, so callers can inspect metadata.
///
/// With `explicit` set, that file replaces `./botfleet.toml` as the local layer.
pub fn build_figment(explicit: Option<&Path>) -> Figment {
    search_paths(explicit)
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(FleetConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Load configuration from the standard hierarchy with env overrides.
pub fn load_config(explicit: Option<&Path>) -> Result<FleetConfig, figment::Error> {
    build_figment(explicit).extract()
}

/// Load configuration from an inline TOML document over the defaults.
///
/// No files or environment variables are consulted.
pub fn load_config_from_str(toml_content: &str) -> Result<FleetConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(FleetConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Map `BOTFLEET_DISPATCH_MAX_ATTEMPTS` to `dispatch.max_attempts`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// keys that contain underscores themselves stay intact.
fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_key_maps_first_underscore_only() {
        assert_eq!(map_env_key("dispatch_max_attempts"), "dispatch.max_attempts");
        assert_eq!(map_env_key("monitor_interval_secs"), "monitor.interval_secs");
        assert_eq!(map_env_key("storage_database_path"), "storage.database_path");
    }

    #[test]
    fn env_key_outside_sections_is_untouched() {
        assert_eq!(map_env_key("bots"), "bots");
        assert_eq!(map_env_key("dispatcher_x"), "dispatcher_x");
    }

    #[test]
    fn explicit_path_replaces_local_file() {
        let paths = search_paths(Some(Path::new("/srv/fleet.toml")));
        assert_eq!(paths.last().unwrap(), Path::new("/srv/fleet.toml"));
        assert!(!paths.iter().any(|p| p == Path::new(CONFIG_FILE_NAME)));
    }
}
