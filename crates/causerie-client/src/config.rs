//! Client configuration, read from the environment with sane defaults.

use causerie_net::channel::{ChannelConfig, ReconnectPolicy};
use causerie_shared::constants::DEFAULT_SERVER_URL;

/// Runtime configuration for a [`ChatClient`](crate::ChatClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address of the backend, `http` or `https`.
    ///
    /// Env: `CAUSERIE_SERVER_URL`
    /// Default: `http://localhost:8000`
    pub server_url: String,

    /// Reconnect policy applied to realtime channels. `None` means a
    /// dropped socket ends the session.
    ///
    /// Env: `CAUSERIE_RECONNECT` (`false`/`0` to disable)
    /// Default: disabled
    pub reconnect: Option<ReconnectPolicy>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            reconnect: None,
        }
    }
}

impl ClientConfig {
    /// Builds the configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Log verbosity is controlled separately through `RUST_LOG`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("CAUSERIE_SERVER_URL") {
            if !url.is_empty() {
                config.server_url = url;
            }
        }

        if let Ok(val) = std::env::var("CAUSERIE_RECONNECT") {
            if val != "false" && val != "0" {
                config.reconnect = Some(ReconnectPolicy::default());
            }
        }

        config
    }

    /// The channel settings derived from this configuration.
    pub(crate) fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            server_url: self.server_url.clone(),
            reconnect: self.reconnect.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
