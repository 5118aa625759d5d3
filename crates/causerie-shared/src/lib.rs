//! # causerie-shared
//!
//! Identifiers, domain models and wire frames shared by every crate in the
//! workspace.  The backend speaks JSON over both its REST surface and its
//! per-conversation WebSocket endpoint; the types here deserialize from
//! either one unchanged.

pub mod constants;
pub mod models;
pub mod protocol;
pub mod types;

pub use models::{Conversation, Member, Message, Reaction, SeenReceipt, UserProfile, UserSummary};
pub use protocol::{ClientFrame, ServerFrame};
pub use types::{ChannelStatus, ConversationId, MessageId, UserId};
