// Copyright (c) 2024-2026 Rook Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// Identity of one conversation peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub channel_type: String,
    pub channel_id: String,
    pub peer_id: String,
}

impl SessionKey {
    pub fn new(
        channel_type: impl Into<String>,
        channel_id: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Self {
        Self {
            channel_type: channel_type.into(),
            channel_id: channel_id.into(),
            peer_id: peer_id.into(),
        }
    }

    /// Deterministic persistence key; the server sanitizes it into the
    /// history filename, so this format is part of the on-disk contract.
    pub fn persistence_key(&self) -> String {
        format!("{}-{}-{}", self.channel_type, self.channel_id, self.peer_id)
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.persistence_key())
    }
}

#[derive(Debug, Clone)]
pub struct PeerSession {
    pub agent_session_id: String,
    pub active_skill: String,
    pub last_activity: Instant,
}

/// In-memory map of live peer sessions with inactivity expiry.
///
/// Expiry drops only the map entry — the server-side history file stays,
/// so a later `start_session` with the same persistence key rehydrates
/// the conversation.
pub struct SessionManager {
    timeout: Duration,
    entries: Mutex<HashMap<SessionKey, PeerSession>>,
}

impl SessionManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The live session for `key`, refreshing its activity clock.
    /// An expired entry is evicted and `None` returned.
    pub fn touch(&self, key: &SessionKey) -> Option<PeerSession> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(session) if session.last_activity.elapsed() <= self.timeout => {
                session.last_activity = Instant::now();
                Some(session.clone())
            }
            Some(_) => {
                debug!(key = %key, "peer session expired, evicting from memory");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: SessionKey, agent_session_id: String, active_skill: String) {
        self.entries.lock().unwrap().insert(
            key,
            PeerSession {
                agent_session_id,
                active_skill,
                last_activity: Instant::now(),
            },
        );
    }

    /// Update the active skill for a live session, if any.
    pub fn set_skill(&self, key: &SessionKey, skill: String) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(session) => {
                session.active_skill = skill;
                session.last_activity = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, key: &SessionKey) -> Option<PeerSession> {
        self.entries.lock().unwrap().remove(key)
    }

    pub fn live_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
