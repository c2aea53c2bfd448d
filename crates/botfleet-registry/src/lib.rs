// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bot registry: the configured bots, their operator intent, and a read
//! view of the connectivity status maintained by the lifecycle monitor.

pub mod registry;
pub mod snapshot;
pub mod status;

pub use registry::{Registry, TeardownRequest};
pub use snapshot::Snapshot;
pub use status::StatusBoard;
