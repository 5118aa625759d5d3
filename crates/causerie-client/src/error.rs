//! Client-level error type aggregating the networking failures.

use causerie_net::error::{RestError, SnapshotError, TransportError, UploadError};
use thiserror::Error;

/// Anything that can go wrong while driving the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// An operation needed an authenticated user before login.
    #[error("Not logged in")]
    NotLoggedIn,

    /// The realtime channel could not be established.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The conversation snapshot could not be loaded.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// A file upload failed before the message could be sent.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// A REST call failed.
    #[error("API error: {0}")]
    Api(#[from] RestError),
}
