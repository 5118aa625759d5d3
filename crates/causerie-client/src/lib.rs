pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod session;

pub use client::ChatClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use events::SessionEvent;
pub use session::SyncSession;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for an embedding application.
///
/// The library itself only emits events; a binary decides once, at startup,
/// whether to call this.  `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("causerie_client=info,causerie_net=info,causerie_store=info")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
