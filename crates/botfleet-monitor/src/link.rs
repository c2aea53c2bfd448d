// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-bot connection state tracked by the monitor.

use std::sync::Arc;

use botfleet_core::{Session, StatusKind};
use tokio::task::JoinHandle;

/// Monitor-internal connection state.
///
/// `Connecting` is never published; the externally visible status stays
/// at its previous value while an open attempt runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Offline,
    Connecting,
    Online,
    Error,
}

impl LinkState {
    pub fn visible(self) -> Option<StatusKind> {
        match self {
            Self::Offline => Some(StatusKind::Offline),
            Self::Connecting => None,
            Self::Online => Some(StatusKind::Online),
            Self::Error => Some(StatusKind::Error),
        }
    }

    /// Whether entering `self` from `from` produces a status event.
    pub fn announces(self, from: LinkState) -> bool {
        match self {
            Self::Online | Self::Error => true,
            Self::Offline => matches!(from, Self::Online | Self::Error),
            Self::Connecting => false,
        }
    }
}

pub(crate) struct Link {
    pub state: LinkState,
    pub name: String,
    pub session: Option<Arc<dyn Session>>,
    /// Task forwarding the session's events.
    pub pump: Option<JoinHandle<()>>,
}

impl Link {
    pub fn new(name: &str) -> Self {
        Self {
            state: LinkState::Offline,
            name: name.to_string(),
            session: None,
            pump: None,
        }
    }

    pub fn owns(&self, session_id: &str) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.session_id() == session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_and_error_always_announce() {
        for from in [LinkState::Offline, LinkState::Connecting, LinkState::Error] {
            assert!(LinkState::Online.announces(from));
            assert!(LinkState::Error.announces(from));
        }
    }

    #[test]
    fn offline_announces_only_after_online_or_error() {
        assert!(LinkState::Offline.announces(LinkState::Online));
        assert!(LinkState::Offline.announces(LinkState::Error));
        assert!(!LinkState::Offline.announces(LinkState::Offline));
        assert!(!LinkState::Offline.announces(LinkState::Connecting));
    }

    #[test]
    fn connecting_is_not_visible() {
        assert_eq!(LinkState::Connecting.visible(), None);
        assert_eq!(LinkState::Error.visible(), Some(StatusKind::Error));
    }
}
