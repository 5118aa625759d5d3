use serde::{Deserialize, Serialize};

// Backend identifiers are plain auto-increment integers.  The newtypes keep
// the three id spaces from being mixed up at compile time while serializing
// as bare numbers on the wire.

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a conversation's realtime channel, published on a watch so
/// the UI can render a connection indicator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Dialing the backend, no socket yet.
    Connecting,
    /// Socket open, frames flowing.
    Connected,
    /// Socket lost, a reconnect policy is re-dialing.
    Reconnecting,
    /// Closed for good (explicit disconnect or retries exhausted).
    Disconnected,
}

impl ChannelStatus {
    /// True only while frames can actually be sent.
    pub fn is_open(self) -> bool {
        self == ChannelStatus::Connected
    }
}
