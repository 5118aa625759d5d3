//! Append-only message log with idempotent merges.
//!
//! The log is the single source of truth for one conversation's messages.
//! Order is arrival order: a snapshot installs the backend's history, every
//! later append goes to the tail.  All merge operations are idempotent so
//! duplicate frames and echoed acknowledgements cannot corrupt state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use causerie_shared::models::{Message, Reaction, SeenReceipt};
use causerie_shared::types::{MessageId, UserId};

/// In-memory message log for a single conversation.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageLog {
    /// Create a new, empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire contents with a snapshot.
    ///
    /// If the snapshot itself repeats an id, the first occurrence wins, so
    /// the uniqueness invariant holds even against a misbehaving backend.
    pub fn initialize(&mut self, snapshot: Vec<Message>) {
        self.messages.clear();
        self.ids.clear();

        for message in snapshot {
            if self.ids.insert(message.id) {
                self.messages.push(message);
            } else {
                debug!(message_id = %message.id, "Snapshot repeated an id, keeping first");
            }
        }
    }

    /// Append a realtime message if its id is not already present.
    ///
    /// The stored message starts with an empty `seen_by`: receipts only ever
    /// enter the log through [`merge_seen`](Self::merge_seen), so a stale
    /// list on the frame cannot smuggle receipts in.
    ///
    /// Returns `false` (and changes nothing) on a duplicate.
    pub fn append(&mut self, mut message: Message) -> bool {
        if !self.ids.insert(message.id) {
            debug!(message_id = %message.id, "Duplicate message dropped");
            return false;
        }

        message.seen_by = Vec::new();
        self.messages.push(message);
        true
    }

    /// Record that `user` has seen the listed messages at `seen_at`.
    ///
    /// Ids not present in the log are ignored; a user already holding a
    /// receipt on a message is not recorded twice.  Returns how many
    /// receipts were actually added.
    pub fn merge_seen(
        &mut self,
        message_ids: &[MessageId],
        user: UserId,
        seen_at: DateTime<Utc>,
    ) -> usize {
        let wanted: HashSet<MessageId> = message_ids.iter().copied().collect();
        let mut added = 0;

        for message in &mut self.messages {
            if !wanted.contains(&message.id) || message.seen_by_user(user) {
                continue;
            }
            message.seen_by.push(SeenReceipt {
                user_id: user,
                seen_at,
            });
            added += 1;
        }

        added
    }

    /// Merge one reaction event into the aggregate for `message_id`.
    ///
    /// An existing emoji entry gains the user and a single increment only if
    /// the user is not already recorded; a repeated event from the same user
    /// is a no-op.  Returns whether anything changed.
    pub fn merge_reaction(&mut self, message_id: MessageId, emoji: &str, user: UserId) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) else {
            debug!(message_id = %message_id, "Reaction for unknown message ignored");
            return false;
        };

        match message.reactions.iter_mut().find(|r| r.emoji == emoji) {
            Some(entry) => {
                if entry.has_user(user) {
                    return false;
                }
                entry.users.push(user);
                entry.count += 1;
            }
            None => {
                message.reactions.push(Reaction {
                    emoji: emoji.to_string(),
                    count: 1,
                    users: vec![user],
                });
            }
        }

        true
    }

    /// Ids of messages from other senders that `viewer` has not seen yet,
    /// in store order.
    pub fn unseen_by(&self, viewer: UserId) -> Vec<MessageId> {
        self.messages
            .iter()
            .filter(|m| m.sender_id != viewer && !m.seen_by_user(viewer))
            .map(|m| m.id)
            .collect()
    }

    /// Look up one message by id.
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// The full ordered contents.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
