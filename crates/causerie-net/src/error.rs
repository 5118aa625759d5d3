use thiserror::Error;

/// Errors raised while opening or driving the realtime channel.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The configured server address could not be turned into a WebSocket
    /// URL.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// The WebSocket dial failed (DNS, TCP, TLS or handshake).
    #[error("WebSocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

/// A frame that could not be decoded.  Decode failures are logged and the
/// frame is dropped; the channel itself stays up.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors from the REST glue endpoints.
#[derive(Error, Debug)]
pub enum RestError {
    /// The endpoint requires a bearer token and none is stored.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Transport-level failure or undecodable response body.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend returned {status}: {detail}")]
    Status { status: u16, detail: String },
}

/// A conversation history snapshot could not be loaded.  The caller's store
/// stays untouched; no session is built on top of a failed load.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot load failed: {0}")]
    Load(#[from] RestError),
}

/// A file upload did not produce a usable `file_url`.
#[derive(Error, Debug)]
pub enum UploadError {
    /// The file exceeds the backend's upload cap; nothing was sent.
    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("Upload failed: {0}")]
    Upload(#[from] RestError),
}
