// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message dispatcher: durable enqueue, bounded parallel
//! delivery, per-recipient ordering and capped exponential retry.

pub mod backoff;
pub mod dispatcher;

pub use backoff::RetryPolicy;
pub use dispatcher::Dispatcher;
