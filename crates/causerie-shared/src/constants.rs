/// Application name
pub const APP_NAME: &str = "Causerie";

/// Default backend address for local development
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Path prefix of the realtime WebSocket endpoint
pub const WS_PATH: &str = "/ws";

/// Quiet interval after which the input layer should send `typing(false)`
pub const TYPING_IDLE_STOP_MS: u64 = 1_000;

/// Hard cap on a typing indicator: an entry not refreshed within this window
/// reads as cleared even if the `typing(false)` frame was lost
pub const TYPING_HARD_EXPIRY_SECS: i64 = 5;

/// Interval at which a session sweeps expired typing indicators
pub const TYPING_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Maximum upload size accepted by the backend (64 MiB)
pub const MAX_UPLOAD_SIZE: usize = 64 * 1024 * 1024;
