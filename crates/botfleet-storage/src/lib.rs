// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Botfleet bot operator.
//!
//! WAL-mode SQLite with embedded migrations, a single writer through
//! `tokio-rusqlite`, and typed queries for bots and the outbound job queue.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStore;
pub use database::Database;
