//! Typed events a sync session surfaces to the embedding UI.
//!
//! Every frame that changes session state produces exactly one event,
//! delivered in application order over the receiver returned by
//! [`ChatClient::open`](crate::ChatClient::open); duplicates and no-op
//! frames emit nothing.  The payloads serialize cleanly so a UI bridge can
//! forward them as-is.

use causerie_shared::models::Message;
use causerie_shared::types::{ChannelStatus, MessageId, UserId};
use serde::Serialize;

/// A state change the UI should react to.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new message was appended to the conversation log.
    MessageAdded { message: Message },

    /// A user's seen receipts were merged onto the listed messages.
    SeenUpdated {
        user_id: UserId,
        message_ids: Vec<MessageId>,
    },

    /// A reaction was added to a message.
    ReactionAdded {
        message_id: MessageId,
        emoji: String,
        user_id: UserId,
    },

    /// The set of online members changed. Carries the full sorted set so
    /// the UI never has to track deltas itself.
    PresenceChanged { online: Vec<UserId> },

    /// Who is currently typing. `None` clears the indicator, either from
    /// an explicit stop or from the staleness sweep.
    TypingChanged { user_id: Option<UserId> },

    /// The realtime channel moved through its lifecycle.
    StatusChanged { status: ChannelStatus },
}
