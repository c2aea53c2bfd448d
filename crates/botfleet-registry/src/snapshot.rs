// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Point-in-time listing of registered bots.

use std::sync::Arc;

use botfleet_core::BotConnection;

/// Bots as they were when [`crate::Registry::list`] was called, in
/// registration order.
///
/// Cloning is cheap and every clone iterates from the start again. Later
/// registry changes are not reflected.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    bots: Arc<[Arc<BotConnection>]>,
}

impl Snapshot {
    pub(crate) fn new(bots: Vec<Arc<BotConnection>>) -> Self {
        Self { bots: bots.into() }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BotConnection> + '_ {
        self.into_iter()
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a BotConnection;
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, Arc<BotConnection>>,
        fn(&'a Arc<BotConnection>) -> &'a BotConnection,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.bots
            .iter()
            .map(unwrap_arc as fn(&'a Arc<BotConnection>) -> &'a BotConnection)
    }
}

fn unwrap_arc(bot: &Arc<BotConnection>) -> &BotConnection {
    bot
}
