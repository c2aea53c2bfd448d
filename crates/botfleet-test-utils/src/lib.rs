// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Botfleet integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without a Telegram account.
//!
//! # Components
//!
//! - [`MockStore`] - In-memory fleet store with injectable write failures
//! - [`MockTransport`] - Scripted transport with session and send capture
//! - [`EventRecorder`] - Bus subscriber that records events for assertions
//! - [`TestHarness`] - Registry, monitor and dispatcher wired to the mocks

pub mod harness;
pub mod mock_store;
pub mod mock_transport;
pub mod recorder;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_store::MockStore;
pub use mock_transport::{MockSession, MockTransport, SendScript, SentMessage};
pub use recorder::EventRecorder;
