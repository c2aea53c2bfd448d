// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Botfleet bot operator.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Botfleet workspace. Storage and transport
//! adapters implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{BoxError, FleetError};
pub use types::{
    AdapterType, BotConfig, BotConnection, BotId, ChatId, ConnectionStatus, DeliveryAck,
    HealthStatus, InboundMessage, JobId, JobRecord, JobStatus, NewJobRecord, OutboundJob, Payload,
    PayloadKind, SessionEvent, StatusKind,
};

pub use traits::{
    FleetStore, NoSessions, PluginAdapter, Session, SessionLookup, TransportAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [AdapterType::Storage, AdapterType::Transport] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn no_sessions_lookup_is_empty() {
        assert!(NoSessions.session(&BotId::from("alpha")).is_none());
    }

    #[test]
    fn all_adapter_traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_store<T: FleetStore>() {}
        fn _assert_transport<T: TransportAdapter>() {}
        fn _assert_lookup<T: SessionLookup>() {}
    }
}
