//! Seen-receipt coordination for the local user.
//!
//! The coordinator decides when a `seen` acknowledgement should go out.  It
//! is level-triggered: after any store mutation the session asks it to
//! reconcile, and it answers with the foreign messages that still need an
//! ack.  An in-flight set keeps the same ids from being handed out twice
//! while the backend echo is in transit; the echo landing in the log prunes
//! them again.

use std::collections::HashSet;

use tracing::debug;

use causerie_shared::types::{MessageId, UserId};

use crate::messages::MessageLog;

/// Decides which messages the local user still has to acknowledge.
#[derive(Debug, Clone)]
pub struct SeenCoordinator {
    local_user: UserId,
    in_flight: HashSet<MessageId>,
}

impl SeenCoordinator {
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            in_flight: HashSet::new(),
        }
    }

    /// Compute the acknowledgement due against the current log.
    ///
    /// Returns the unseen foreign ids that have not been handed out yet, in
    /// store order, or `None` when there is nothing new.  Handed-out ids are
    /// remembered until the local user's receipt shows up in the log (or
    /// [`reset`](Self::reset) is called), which keeps redundant acks to the
    /// unavoidable minimum.
    pub fn reconcile(&mut self, log: &MessageLog) -> Option<Vec<MessageId>> {
        let unseen = log.unseen_by(self.local_user);
        let unseen_set: HashSet<MessageId> = unseen.iter().copied().collect();

        // Receipts that landed since the last round release their ids.
        self.in_flight.retain(|id| unseen_set.contains(id));

        let fresh: Vec<MessageId> = unseen
            .into_iter()
            .filter(|id| !self.in_flight.contains(id))
            .collect();

        if fresh.is_empty() {
            return None;
        }

        self.in_flight.extend(fresh.iter().copied());
        debug!(count = fresh.len(), "Seen acknowledgement due");
        Some(fresh)
    }

    /// Forget every handed-out id.
    ///
    /// Called when the log is re-initialized and after a reconnect, since
    /// acks sent over a dead socket were dropped and must be re-emitted.
    pub fn reset(&mut self) {
        self.in_flight.clear();
    }

    pub fn local_user(&self) -> UserId {
        self.local_user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use causerie_shared::models::Message;
    use causerie_shared::types::ConversationId;
    use chrono::Utc;

    fn msg(id: i64, sender: i64) -> Message {
        Message {
            id: MessageId(id),
            conversation_id: ConversationId(1),
            sender_id: UserId(sender),
            content: Some("hello".to_string()),
            file_url: None,
            created_at: Utc::now(),
            seen_by: Vec::new(),
            reactions: Vec::new(),
        }
    }

    #[test]
    fn test_nothing_due_on_clean_log() {
        let mut log = MessageLog::new();
        log.append(msg(1, 5));

        // Local user 5 only has their own message in the log.
        let mut coordinator = SeenCoordinator::new(UserId(5));
        assert_eq!(coordinator.reconcile(&log), None);
    }

    #[test]
    fn test_historical_unseen_acked_once() {
        let mut log = MessageLog::new();
        log.initialize(vec![msg(1, 2), msg(2, 2)]);

        let mut coordinator = SeenCoordinator::new(UserId(5));

        let due = coordinator.reconcile(&log);
        assert_eq!(due, Some(vec![MessageId(1), MessageId(2)]));

        // Same level, nothing new: no redundant ack.
        assert_eq!(coordinator.reconcile(&log), None);

        // The backend echoes the receipt; still nothing new afterwards.
        log.merge_seen(&[MessageId(1), MessageId(2)], UserId(5), Utc::now());
        assert_eq!(coordinator.reconcile(&log), None);
    }

    #[test]
    fn test_new_arrival_triggers_fresh_ack() {
        let mut log = MessageLog::new();
        log.append(msg(1, 2));

        let mut coordinator = SeenCoordinator::new(UserId(5));
        assert_eq!(coordinator.reconcile(&log), Some(vec![MessageId(1)]));

        log.append(msg(2, 2));
        assert_eq!(coordinator.reconcile(&log), Some(vec![MessageId(2)]));
    }

    #[test]
    fn test_reset_re_emits_unacked() {
        let mut log = MessageLog::new();
        log.append(msg(1, 2));

        let mut coordinator = SeenCoordinator::new(UserId(5));
        assert_eq!(coordinator.reconcile(&log), Some(vec![MessageId(1)]));

        // The ack was lost with the connection: after a reset the id is
        // handed out again because no receipt ever landed.
        coordinator.reset();
        assert_eq!(coordinator.reconcile(&log), Some(vec![MessageId(1)]));
    }

    #[test]
    fn test_own_messages_never_acked() {
        let mut log = MessageLog::new();
        log.append(msg(1, 5));
        log.append(msg(2, 2));

        let mut coordinator = SeenCoordinator::new(UserId(5));
        assert_eq!(coordinator.reconcile(&log), Some(vec![MessageId(2)]));
    }
}
