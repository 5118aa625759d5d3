//! Presence and typing tracking for one conversation.
//!
//! Maintains the set of currently-online participants plus the single
//! "someone is typing" indicator.  Presence deltas and wholesale
//! `online_list` snapshots both funnel through here; typing is last-writer-
//! wins with a hard expiry so a lost stop frame cannot wedge the indicator.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use causerie_shared::constants::TYPING_HARD_EXPIRY_SECS;
use causerie_shared::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TypingEntry {
    user: UserId,
    refreshed_at: DateTime<Utc>,
}

/// Tracks who is online and who is typing in one conversation.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    local_user: UserId,
    online: HashSet<UserId>,
    typing: Option<TypingEntry>,
}

impl PresenceTracker {
    /// Create a tracker for a conversation viewed by `local_user`.
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            online: HashSet::new(),
            typing: None,
        }
    }

    /// Install a wholesale online snapshot, discarding all previous state.
    ///
    /// The backend sends one right after accepting a connection, which is
    /// what re-converges presence after a reconnect.
    pub fn replace_online(&mut self, user_ids: &[UserId]) {
        self.online = user_ids.iter().copied().collect();
        debug!(count = self.online.len(), "Online set replaced");
    }

    /// Apply one presence delta.
    pub fn apply_presence(&mut self, user: UserId, online: bool) {
        if online {
            self.online.insert(user);
        } else {
            self.online.remove(&user);
        }
    }

    /// Apply one typing frame observed at `now`.
    ///
    /// The local user's own echo is ignored.  A start overwrites whatever
    /// was tracked before (last typer wins); a stop only clears the entry if
    /// it came from the tracked typer.
    pub fn apply_typing(&mut self, user: UserId, status: bool, now: DateTime<Utc>) {
        if user == self.local_user {
            return;
        }

        if status {
            self.typing = Some(TypingEntry {
                user,
                refreshed_at: now,
            });
        } else if self.typing.map(|t| t.user) == Some(user) {
            self.typing = None;
        }
    }

    /// The user currently typing, if the entry is still fresh at `now`.
    pub fn typing_user(&self, now: DateTime<Utc>) -> Option<UserId> {
        self.typing
            .filter(|t| now - t.refreshed_at < Duration::seconds(TYPING_HARD_EXPIRY_SECS))
            .map(|t| t.user)
    }

    /// Drop a typing entry that outlived the hard expiry.
    ///
    /// Returns `true` if an entry was actually cleared, so callers can emit
    /// a "stopped typing" notification exactly once.
    pub fn expire_typing(&mut self, now: DateTime<Utc>) -> bool {
        match self.typing {
            Some(t) if now - t.refreshed_at >= Duration::seconds(TYPING_HARD_EXPIRY_SECS) => {
                debug!(user_id = %t.user, "Typing indicator expired");
                self.typing = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_online(&self, user: UserId) -> bool {
        self.online.contains(&user)
    }

    /// Sorted snapshot of all online users.
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.online.iter().copied().collect();
        users.sort();
        users
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}
