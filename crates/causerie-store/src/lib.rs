//! # causerie-store
//!
//! Per-conversation in-memory sync state: the append-only message log with
//! its idempotent merge operations, the presence and typing tracker, and the
//! seen-receipt coordinator.  Nothing here touches the network; the session
//! layer feeds decoded frames in and reads consistent snapshots out.

pub mod messages;
pub mod presence;
pub mod receipts;

pub use messages::MessageLog;
pub use presence::PresenceTracker;
pub use receipts::SeenCoordinator;
