//! Wire frames exchanged over a conversation's realtime channel.
//!
//! One JSON object per text frame, discriminated by a `"type"` field.  The
//! inbound and outbound vocabularies are distinct: the backend fans out
//! enriched frames (full message records, presence deltas) while clients
//! send compact intents.

use serde::{Deserialize, Serialize};

use crate::models::Message;
use crate::types::{MessageId, UserId};

/// Frames pushed by the backend to every connected participant of a
/// conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A message was accepted, assigned an id and fanned out.
    Message { message: Message },

    /// A participant started (`status = true`) or stopped typing.
    Typing { user_id: UserId, status: bool },

    /// A participant's realtime connection opened or closed.
    Presence { user_id: UserId, online: bool },

    /// A participant acknowledged having seen the listed messages.
    Seen {
        user_id: UserId,
        message_ids: Vec<MessageId>,
    },

    /// A participant reacted to a message.
    Reaction {
        message_id: MessageId,
        emoji: String,
        user_id: UserId,
    },

    /// Wholesale snapshot of currently-online participants, sent by the
    /// backend right after a connection is accepted.
    OnlineList { user_ids: Vec<UserId> },
}

/// Frames a client may send upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Post a message.  `file_url` comes from the upload endpoint.
    Message {
        content: Option<String>,
        file_url: Option<String>,
        reply_to: Option<MessageId>,
    },

    /// Announce that the local user started or stopped typing.
    Typing { status: bool },

    /// Acknowledge the listed messages as seen by the local user.
    Seen { message_ids: Vec<MessageId> },

    /// Toggle a reaction on a message.
    Reaction { message_id: MessageId, emoji: String },
}

impl ServerFrame {
    /// Decode one inbound text frame.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientFrame {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode for the socket writer.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
