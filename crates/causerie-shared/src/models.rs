//! Domain model structs shared by the REST snapshot and the realtime frames.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the embedding UI layer; the backend speaks JSON on both
//! surfaces and the records cross unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, UserId};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A record that one user has seen one message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeenReceipt {
    /// The user who saw the message.
    pub user_id: UserId,
    /// When the receipt was recorded.  Display-only; the inbound `seen`
    /// frame carries no timestamp, so the receiver stamps with its own clock.
    pub seen_at: DateTime<Utc>,
}

/// Aggregate of one emoji on one message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    /// The emoji glyph, e.g. `"👍"`.
    pub emoji: String,
    /// How many distinct users are behind this entry.
    pub count: u32,
    /// The users themselves.  Set semantics: the merge refuses duplicates.
    pub users: Vec<UserId>,
}

impl Reaction {
    pub fn has_user(&self, user: UserId) -> bool {
        self.users.contains(&user)
    }
}

/// A single chat message as the backend serves it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Unique within the backend, assigned on insert.
    pub id: MessageId,
    /// The conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Who sent it.
    pub sender_id: UserId,
    /// Text body.  `None` for pure file messages.
    pub content: Option<String>,
    /// Attachment URL as returned by the upload endpoint.
    pub file_url: Option<String>,
    /// When the backend accepted the message.  Display-only; store order is
    /// arrival order.
    pub created_at: DateTime<Utc>,
    /// Seen receipts, at most one per user.  Snapshots may omit the field.
    #[serde(default)]
    pub seen_by: Vec<SeenReceipt>,
    /// Reaction aggregates, one entry per emoji.  Snapshots may omit it.
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    /// Whether `user` already has a seen receipt on this message.
    pub fn seen_by_user(&self, user: UserId) -> bool {
        self.seen_by.iter().any(|r| r.user_id == user)
    }

    /// Whether this message carries a file attachment.
    pub fn is_file(&self) -> bool {
        self.file_url.is_some()
    }
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// One participant entry in a conversation's member list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,
    pub username: String,
    /// Profile-level display name, if the user set one.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Conversation-scoped nickname (settings endpoint).
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Member {
    /// The name the UI should show: nickname over display name over
    /// username.
    pub fn label(&self) -> &str {
        self.nickname
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or(&self.username)
    }
}

/// A direct or group conversation.  Membership is immutable while a sync
/// session is attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    /// Display name, groups only.
    pub name: Option<String>,
    pub is_group: bool,
    /// Some backend responses omit the member list.
    #[serde(default)]
    pub members: Vec<Member>,
    /// Chat theme identifier (settings endpoint), display-only.
    #[serde(default)]
    pub theme: Option<String>,
}

impl Conversation {
    pub fn member(&self, id: UserId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Human-readable title: the group name, or the other member's label in
    /// a direct conversation.
    pub fn title_for(&self, viewer: UserId) -> String {
        if self.is_group {
            return self.name.clone().unwrap_or_else(|| "Group".to_string());
        }
        self.members
            .iter()
            .find(|m| m.id != viewer)
            .map(|m| m.label().to_string())
            .unwrap_or_else(|| "Conversation".to_string())
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// The compact user record the login response embeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}

/// Full profile record served by the user endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// Free-form date string, the backend does not validate it.
    #[serde(default)]
    pub birthday: Option<String>,
    pub created_at: DateTime<Utc>,
}
