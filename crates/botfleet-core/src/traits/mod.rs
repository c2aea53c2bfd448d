// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the collaborators the core depends on.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod storage;
pub mod transport;

pub use adapter::PluginAdapter;
pub use storage::FleetStore;
pub use transport::{NoSessions, Session, SessionLookup, TransportAdapter};
