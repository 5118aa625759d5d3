// Client networking layer: WebSocket conversation channels and the REST API.

pub mod channel;
pub mod error;
pub mod rest;
pub mod subscribers;

pub use channel::{Channel, ChannelConfig, ReconnectPolicy};
pub use error::{DecodeError, RestError, SnapshotError, TransportError, UploadError};
pub use rest::{
    ApiClient, DirectoryUser, LoginResponse, MediaFile, MediaImage, MediaListing, NewConversation,
    ProfileUpdate, RegisterRequest,
};
pub use subscribers::{ListenerId, SubscriberHub, Subscription};
