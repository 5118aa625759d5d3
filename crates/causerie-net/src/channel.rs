//! Realtime conversation channel over WebSocket.
//!
//! One channel serves exactly one conversation.  [`Channel::connect`] dials
//! the backend's `/ws/{conversation_id}/{user_id}` endpoint and spawns a
//! dedicated event-loop task.  External code hands it outbound frames
//! through a bounded queue, receives decoded frames through
//! [`SubscriberHub`] subscriptions, and stops it through a separate
//! shutdown signal, keeping the networking layer fully asynchronous and
//! decoupled.

use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use causerie_shared::constants::WS_PATH;
use causerie_shared::protocol::{ClientFrame, ServerFrame};
use causerie_shared::types::{ChannelStatus, ConversationId, UserId};

use crate::error::{DecodeError, TransportError};
use crate::subscribers::{SubscriberHub, Subscription};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Outbound frame queue depth.  `send` uses `try_send`, so a full queue
/// drops the frame instead of blocking the caller.
const SEND_BUFFER: usize = 256;

/// Grace period for the closing handshake.  A peer that has stopped reading
/// cannot hold the event loop open past this; the socket is dropped instead.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Bounded re-dial schedule applied after an established connection drops.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Consecutive attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first attempt; doubles every attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay, jitter included.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl ReconnectPolicy {
    /// Jittered exponential delay for a 1-based attempt number, clamped to
    /// `max_delay`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let doublings = (attempt - 1).min(16);
        let exp = self.base_delay.saturating_mul(1u32 << doublings);
        let jittered = exp.mul_f64(1.0 + rand::thread_rng().gen_range(0.0..0.5));
        jittered.min(self.max_delay)
    }
}

/// Configuration for opening a channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    /// Backend base address, `http(s)://host[:port]`.
    pub server_url: String,
    /// Re-dial schedule after an unexpected close.  `None` (the default)
    /// means the first drop is final.
    pub reconnect: Option<ReconnectPolicy>,
}

// ---------------------------------------------------------------------------
// Channel handle
// ---------------------------------------------------------------------------

/// Handle to one conversation's realtime channel.
///
/// Cheap to clone; clones drive the same socket.  Dropping the last handle
/// stops the event loop.  A new conversation gets a new channel.
#[derive(Debug, Clone)]
pub struct Channel {
    frame_tx: mpsc::Sender<ClientFrame>,
    shutdown_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<ChannelStatus>,
    hub: SubscriberHub,
}

impl Channel {
    /// Dial the realtime endpoint for one conversation and spawn the event
    /// loop.
    ///
    /// The initial dial is awaited: a failure is returned here and no task
    /// is spawned, so a handle starts out `Connected`.  Later drops are
    /// governed by the config's [`ReconnectPolicy`].
    ///
    /// The returned [`Subscription`] is registered before the event loop
    /// starts, so the backend's greeting frames (the online snapshot) cannot
    /// slip past it.
    pub async fn connect(
        config: &ChannelConfig,
        conversation: ConversationId,
        user: UserId,
        token: &str,
    ) -> Result<(Self, Subscription), TransportError> {
        let url = ws_url(&config.server_url, conversation, user, token)?;

        let (ws, _) = connect_async(&url).await?;
        info!(conversation_id = %conversation, user_id = %user, "Channel connected");

        let (frame_tx, frame_rx) = mpsc::channel(SEND_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Connected);
        let hub = SubscriberHub::new();
        let subscription = hub.subscribe();

        tokio::spawn(run_channel(
            ws,
            url,
            frame_rx,
            shutdown_rx,
            status_tx,
            hub.clone(),
            config.reconnect.clone(),
        ));

        Ok((
            Self {
                frame_tx,
                shutdown_tx,
                status_rx,
                hub,
            },
            subscription,
        ))
    }

    /// Hand one frame to the socket writer.
    ///
    /// Returns `false` when the channel is not open or the write queue is
    /// full: the frame is dropped, never queued for later.  Never blocks.
    pub fn send(&self, frame: ClientFrame) -> bool {
        if !self.status_rx.borrow().is_open() {
            return false;
        }
        self.frame_tx.try_send(frame).is_ok()
    }

    /// Close the socket and stop the event loop.  Idempotent.
    ///
    /// Travels on its own signal, not the frame queue: a backlog of
    /// unwritten frames can neither delay nor drop it.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Register a listener for decoded inbound frames.
    ///
    /// Frames are delivered to all live subscriptions in registration
    /// order; dropping the handle unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Watch handle over the connection lifecycle.
    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.status_rx.clone()
    }

    /// Snapshot of the current status.
    pub fn current_status(&self) -> ChannelStatus {
        *self.status_rx.borrow()
    }
}

/// Derive the realtime endpoint URL from the backend base address.
fn ws_url(
    server_url: &str,
    conversation: ConversationId,
    user: UserId,
    token: &str,
) -> Result<String, TransportError> {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(TransportError::InvalidUrl(server_url.to_string()));
    };

    Ok(format!(
        "{}{}/{}/{}?token={}",
        base, WS_PATH, conversation, user, token
    ))
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Why `drive_socket` stopped.
enum SocketEnd {
    /// Explicit disconnect, or every handle was dropped.
    Finished,
    /// The socket failed or the backend closed it.
    Dropped,
}

/// Outcome of a reconnect cycle.
enum Redial {
    Connected(WsStream),
    GaveUp,
    Finished,
}

async fn run_channel(
    ws: WsStream,
    url: String,
    mut frame_rx: mpsc::Receiver<ClientFrame>,
    mut shutdown_rx: watch::Receiver<bool>,
    status_tx: watch::Sender<ChannelStatus>,
    hub: SubscriberHub,
    reconnect: Option<ReconnectPolicy>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        match drive_socket(&mut sink, &mut stream, &mut frame_rx, &mut shutdown_rx, &hub).await {
            SocketEnd::Finished => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                break;
            }
            SocketEnd::Dropped => {
                let Some(ref policy) = reconnect else {
                    break;
                };

                let _ = status_tx.send(ChannelStatus::Reconnecting);
                match redial(&url, policy, &mut frame_rx, &mut shutdown_rx).await {
                    Redial::Connected(ws) => {
                        (sink, stream) = ws.split();
                        let _ = status_tx.send(ChannelStatus::Connected);
                        info!("Channel reconnected");
                    }
                    Redial::GaveUp | Redial::Finished => break,
                }
            }
        }
    }

    let _ = status_tx.send(ChannelStatus::Disconnected);
    hub.clear();
    info!("Channel event loop terminated");
}

async fn drive_socket(
    sink: &mut WsSink,
    stream: &mut WsSource,
    frame_rx: &mut mpsc::Receiver<ClientFrame>,
    shutdown_rx: &mut watch::Receiver<bool>,
    hub: &SubscriberHub,
) -> SocketEnd {
    loop {
        tokio::select! {
            // --- Shutdown signal ---
            _ = shutdown_rx.changed() => {
                info!("Channel disconnect requested");
                return SocketEnd::Finished;
            }

            // --- Outbound frames ---
            frame = frame_rx.recv() => {
                match frame {
                    Some(frame) => {
                        let text = match frame.to_json() {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, "Dropping unencodable frame");
                                continue;
                            }
                        };
                        if let Some(end) = write_frame(sink, WsMessage::Text(text), shutdown_rx).await {
                            return end;
                        }
                    }
                    None => {
                        debug!("All channel handles dropped, closing");
                        return SocketEnd::Finished;
                    }
                }
            }

            // --- Inbound frames ---
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => match ServerFrame::from_json(&text) {
                        Ok(frame) => {
                            hub.broadcast(&frame);
                        }
                        Err(e) => {
                            warn!(error = %DecodeError::from(e), "Dropping malformed frame");
                        }
                    },
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if let Some(end) = write_frame(sink, WsMessage::Pong(payload), shutdown_rx).await {
                            return end;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("Socket closed by backend");
                        return SocketEnd::Dropped;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Socket read failed");
                        return SocketEnd::Dropped;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Write one message, bailing out if shutdown fires while the socket is not
/// accepting bytes.  `None` means the write went through.
async fn write_frame(
    sink: &mut WsSink,
    message: WsMessage,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Option<SocketEnd> {
    tokio::select! {
        result = sink.send(message) => match result {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "Socket write failed");
                Some(SocketEnd::Dropped)
            }
        },
        _ = shutdown_rx.changed() => {
            info!("Channel disconnect requested mid-write");
            Some(SocketEnd::Finished)
        }
    }
}

/// Re-dial with jittered exponential backoff, still draining the frame
/// queue between attempts (frames sent while down are dropped, not queued)
/// and honoring shutdown at any point.
async fn redial(
    url: &str,
    policy: &ReconnectPolicy,
    frame_rx: &mut mpsc::Receiver<ClientFrame>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Redial {
    for attempt in 1..=policy.max_attempts {
        let delay = policy.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect attempt");

        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                _ = shutdown_rx.changed() => return Redial::Finished,
                frame = frame_rx.recv() => {
                    match frame {
                        Some(_) => debug!("Frame dropped while reconnecting"),
                        None => return Redial::Finished,
                    }
                }
            }
        }

        let dialed = tokio::select! {
            result = connect_async(url) => result,
            _ = shutdown_rx.changed() => return Redial::Finished,
        };
        match dialed {
            Ok((ws, _)) => return Redial::Connected(ws),
            Err(e) => warn!(attempt, error = %e, "Reconnect attempt failed"),
        }
    }

    warn!(attempts = policy.max_attempts, "Reconnect attempts exhausted");
    Redial::GaveUp
}
