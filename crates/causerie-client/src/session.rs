//! One live conversation session.
//!
//! A session owns the realtime channel, the in-memory stores and the apply
//! task for exactly one conversation.  Opening follows a fixed sequence:
//! load the REST snapshot, initialize the log, compute the historical seen
//! backlog, connect the channel, then spawn the apply task that merges
//! every inbound frame and surfaces [`SessionEvent`]s.  The apply task is
//! the only writer on the hot path, so merges never race each other.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use causerie_net::channel::{Channel, ChannelConfig};
use causerie_net::rest::ApiClient;
use causerie_net::subscribers::Subscription;
use causerie_shared::constants::TYPING_SWEEP_INTERVAL_MS;
use causerie_shared::models::Message;
use causerie_shared::protocol::{ClientFrame, ServerFrame};
use causerie_shared::types::{ChannelStatus, ConversationId, MessageId, UserId};
use causerie_store::{MessageLog, PresenceTracker, SeenCoordinator};

use crate::error::ClientError;
use crate::events::SessionEvent;

/// Conversation state shared between the apply task and the session handle.
#[derive(Debug)]
struct SessionState {
    log: MessageLog,
    presence: PresenceTracker,
    receipts: SeenCoordinator,
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// Handle to one synchronized conversation.
///
/// Sessions are fully isolated from each other: each one carries its own
/// channel, log and trackers, and closing (or dropping) it can never touch
/// another session's state.  Callers switch conversations by closing the
/// current session before opening the next.
#[derive(Debug)]
pub struct SyncSession {
    conversation_id: ConversationId,
    local_user: UserId,
    channel: Channel,
    state: Arc<Mutex<SessionState>>,
    api: ApiClient,
}

impl SyncSession {
    /// Open a session: snapshot, stores, channel, apply task, in that order.
    ///
    /// A snapshot failure means no session at all; nothing is connected and
    /// no store is half-populated.
    pub(crate) async fn open(
        api: ApiClient,
        config: &ChannelConfig,
        conversation: ConversationId,
        local_user: UserId,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), ClientError> {
        let token = api.token().ok_or(ClientError::NotLoggedIn)?.to_string();

        let snapshot = api.message_snapshot(conversation).await?;

        let mut log = MessageLog::new();
        log.initialize(snapshot);
        let presence = PresenceTracker::new(local_user);
        let mut receipts = SeenCoordinator::new(local_user);

        // Everything already in the history that the local user has not seen
        // is acknowledged as soon as the socket is up.
        let backlog = receipts.reconcile(&log);

        let (channel, subscription) =
            Channel::connect(config, conversation, local_user, &token).await?;

        if let Some(message_ids) = backlog {
            if !channel.send(ClientFrame::Seen { message_ids }) {
                warn!("Historical seen acknowledgement dropped");
                receipts.reset();
            }
        }

        let history = log.len();
        let status_rx = channel.status();
        let state = Arc::new(Mutex::new(SessionState {
            log,
            presence,
            receipts,
        }));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Seed the UI's connection indicator before any frame lands.
        let _ = event_tx.send(SessionEvent::StatusChanged {
            status: ChannelStatus::Connected,
        });

        tokio::spawn(apply_loop(
            subscription,
            status_rx,
            Arc::clone(&state),
            event_tx,
            channel.clone(),
            conversation,
        ));
        info!(conversation_id = %conversation, history, "Session opened");

        Ok((
            Self {
                conversation_id: conversation,
                local_user,
                channel,
                state,
                api,
            },
            event_rx,
        ))
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn local_user(&self) -> UserId {
        self.local_user
    }

    // -- outbound -----------------------------------------------------------

    /// Send a text message.  Fire-and-forget: `false` means the frame was
    /// dropped (channel closed or congested), never queued.
    pub fn send_text(&self, content: &str) -> bool {
        self.channel.send(ClientFrame::Message {
            content: Some(content.to_string()),
            file_url: None,
            reply_to: None,
        })
    }

    /// Send a text message replying to an earlier one.
    pub fn send_reply(&self, content: &str, reply_to: MessageId) -> bool {
        self.channel.send(ClientFrame::Message {
            content: Some(content.to_string()),
            file_url: None,
            reply_to: Some(reply_to),
        })
    }

    /// Upload a file over REST, then send the message referencing it.
    ///
    /// The upload is awaited first; if it fails, nothing is sent.  The
    /// returned flag reports the frame hand-off, like [`send_text`](Self::send_text).
    pub async fn send_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<bool, ClientError> {
        let file_url = self.api.upload_file(file_name, bytes).await?;
        Ok(self.channel.send(ClientFrame::Message {
            content: Some(format!("[File: {}]", file_name)),
            file_url: Some(file_url),
            reply_to: None,
        }))
    }

    /// Broadcast the local user's typing state.
    pub fn set_typing(&self, status: bool) -> bool {
        self.channel.send(ClientFrame::Typing { status })
    }

    /// React to a message with an emoji.
    pub fn react(&self, message_id: MessageId, emoji: &str) -> bool {
        self.channel.send(ClientFrame::Reaction {
            message_id,
            emoji: emoji.to_string(),
        })
    }

    /// Acknowledge everything currently unseen.
    ///
    /// The apply task already does this after every merge, so this is only
    /// needed when the embedding UI regains focus or scrolls the history
    /// into view.  Returns `false` only if a due acknowledgement was
    /// dropped.
    pub fn mark_seen(&self) -> bool {
        let due = match self.state.lock() {
            Ok(mut guard) => {
                let SessionState { log, receipts, .. } = &mut *guard;
                receipts.reconcile(log)
            }
            Err(e) => {
                warn!(error = %e, "Session state lock poisoned");
                None
            }
        };

        match due {
            Some(message_ids) => push_ack(&self.state, &self.channel, message_ids),
            None => true,
        }
    }

    /// Close the channel and let the apply task wind down.  Idempotent;
    /// dropping the session does the same.
    pub fn close(&self) {
        self.channel.disconnect();
    }

    // -- read access --------------------------------------------------------

    /// Snapshot of the ordered message log.
    pub fn messages(&self) -> Vec<Message> {
        self.with_state(Vec::new(), |state| state.log.messages().to_vec())
    }

    pub fn message_count(&self) -> usize {
        self.with_state(0, |state| state.log.len())
    }

    /// Sorted snapshot of the online members.
    pub fn online_users(&self) -> Vec<UserId> {
        self.with_state(Vec::new(), |state| state.presence.online_users())
    }

    pub fn is_online(&self, user: UserId) -> bool {
        self.with_state(false, |state| state.presence.is_online(user))
    }

    /// Who is typing right now, if anyone.
    pub fn typing_user(&self) -> Option<UserId> {
        self.with_state(None, |state| state.presence.typing_user(Utc::now()))
    }

    /// Watch handle over the channel lifecycle.
    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.channel.status()
    }

    pub fn current_status(&self) -> ChannelStatus {
        self.channel.current_status()
    }

    fn with_state<T>(&self, fallback: T, read: impl FnOnce(&SessionState) -> T) -> T {
        match self.state.lock() {
            Ok(guard) => read(&guard),
            Err(e) => {
                warn!(error = %e, "Session state lock poisoned");
                fallback
            }
        }
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.channel.disconnect();
    }
}

// ---------------------------------------------------------------------------
// Apply task
// ---------------------------------------------------------------------------

async fn apply_loop(
    mut subscription: Subscription,
    mut status_rx: watch::Receiver<ChannelStatus>,
    state: Arc<Mutex<SessionState>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    channel: Channel,
    conversation: ConversationId,
) {
    let mut sweep = tokio::time::interval(Duration::from_millis(TYPING_SWEEP_INTERVAL_MS));
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_status = ChannelStatus::Connected;

    loop {
        tokio::select! {
            // --- Decoded frames from the channel ---
            frame = subscription.recv() => {
                let Some(frame) = frame else { break };
                apply_frame(&state, &events, &channel, conversation, frame);
            }

            // --- Connection lifecycle ---
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                last_status = status;
                let _ = events.send(SessionEvent::StatusChanged { status });
                if status == ChannelStatus::Connected {
                    // Back from a reconnect: acks sent while down were lost.
                    resend_pending(&state, &channel);
                }
            }

            // --- Typing staleness sweep ---
            _ = sweep.tick() => {
                let expired = match state.lock() {
                    Ok(mut guard) => guard.presence.expire_typing(Utc::now()),
                    Err(e) => {
                        warn!(error = %e, "Session state lock poisoned");
                        false
                    }
                };
                if expired {
                    let _ = events.send(SessionEvent::TypingChanged { user_id: None });
                }
            }
        }
    }

    // The subscription can end before the final watch notification is
    // observed; make sure the terminal status still reaches the UI.
    let status = *status_rx.borrow_and_update();
    if status != last_status {
        let _ = events.send(SessionEvent::StatusChanged { status });
    }

    debug!(conversation_id = %conversation, "Session apply task finished");
}

/// Merge one decoded frame into the session state, emitting an event for
/// every observable change.  Runs on the apply task only.
fn apply_frame(
    state: &Arc<Mutex<SessionState>>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    channel: &Channel,
    conversation: ConversationId,
    frame: ServerFrame,
) {
    let mut ack = None;

    {
        let mut guard = match state.lock() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "Session state lock poisoned, frame dropped");
                return;
            }
        };
        let SessionState {
            log,
            presence,
            receipts,
        } = &mut *guard;

        match frame {
            ServerFrame::Message { message } => {
                if message.conversation_id != conversation {
                    warn!(
                        message_id = %message.id,
                        conversation_id = %message.conversation_id,
                        "Frame for another conversation dropped"
                    );
                    return;
                }
                let id = message.id;
                if !log.append(message) {
                    return;
                }
                if let Some(stored) = log.get(id) {
                    let _ = events.send(SessionEvent::MessageAdded {
                        message: stored.clone(),
                    });
                }
                ack = receipts.reconcile(log);
            }

            ServerFrame::Seen {
                user_id,
                message_ids,
            } => {
                let merged = log.merge_seen(&message_ids, user_id, Utc::now());
                if merged > 0 {
                    let _ = events.send(SessionEvent::SeenUpdated {
                        user_id,
                        message_ids,
                    });
                }
                // A landed echo of our own ack releases its in-flight ids.
                ack = receipts.reconcile(log);
            }

            ServerFrame::Reaction {
                message_id,
                emoji,
                user_id,
            } => {
                if log.merge_reaction(message_id, &emoji, user_id) {
                    let _ = events.send(SessionEvent::ReactionAdded {
                        message_id,
                        emoji,
                        user_id,
                    });
                }
            }

            ServerFrame::Typing { user_id, status } => {
                let now = Utc::now();
                let before = presence.typing_user(now);
                presence.apply_typing(user_id, status, now);
                let after = presence.typing_user(now);
                if before != after {
                    let _ = events.send(SessionEvent::TypingChanged { user_id: after });
                }
            }

            ServerFrame::Presence { user_id, online } => {
                if presence.is_online(user_id) != online {
                    presence.apply_presence(user_id, online);
                    let _ = events.send(SessionEvent::PresenceChanged {
                        online: presence.online_users(),
                    });
                }
            }

            ServerFrame::OnlineList { user_ids } => {
                let before = presence.online_users();
                presence.replace_online(&user_ids);
                let after = presence.online_users();
                if after != before {
                    let _ = events.send(SessionEvent::PresenceChanged { online: after });
                }
            }
        }
    }

    if let Some(message_ids) = ack {
        push_ack(state, channel, message_ids);
    }
}

/// Re-run the receipt reconcile from scratch and push the result out, used
/// right after a reconnect since everything in flight died with the socket.
fn resend_pending(state: &Arc<Mutex<SessionState>>, channel: &Channel) {
    let due = match state.lock() {
        Ok(mut guard) => {
            let SessionState { log, receipts, .. } = &mut *guard;
            receipts.reset();
            receipts.reconcile(log)
        }
        Err(e) => {
            warn!(error = %e, "Session state lock poisoned");
            None
        }
    };

    if let Some(message_ids) = due {
        push_ack(state, channel, message_ids);
    }
}

/// Hand a computed acknowledgement to the channel.  A dropped frame rolls
/// the coordinator back so a later reconcile hands the ids out again.
fn push_ack(
    state: &Arc<Mutex<SessionState>>,
    channel: &Channel,
    message_ids: Vec<MessageId>,
) -> bool {
    if channel.send(ClientFrame::Seen { message_ids }) {
        return true;
    }

    warn!("Seen acknowledgement dropped");
    if let Ok(mut guard) = state.lock() {
        guard.receipts.reset();
    }
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
    use axum::extract::{Multipart, Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tokio::time::timeout;

    use causerie_net::channel::ReconnectPolicy;

    #[derive(Clone)]
    struct BackendDouble {
        /// Snapshot payload per conversation id; missing ids answer 403.
        snapshots: Arc<HashMap<i64, Value>>,
        /// Frames pushed to every accepted socket right away.
        greeting: Vec<String>,
        /// Text frames received from clients on sockets that stay up.
        inbound_tx: mpsc::UnboundedSender<String>,
        /// Sockets accepted so far.
        accepted: Arc<AtomicU32>,
        /// Hang up this many sockets right after the greeting.
        drop_first: u32,
        fail_uploads: bool,
    }

    async fn snapshot_endpoint(
        Path(conversation_id): Path<i64>,
        State(state): State<BackendDouble>,
    ) -> Result<Json<Value>, StatusCode> {
        state
            .snapshots
            .get(&conversation_id)
            .cloned()
            .map(Json)
            .ok_or(StatusCode::FORBIDDEN)
    }

    async fn ws_endpoint(
        ws: WebSocketUpgrade,
        Path((_conversation, _user)): Path<(i64, i64)>,
        State(state): State<BackendDouble>,
    ) -> axum::response::Response {
        ws.on_upgrade(move |socket| serve_socket(socket, state))
    }

    async fn serve_socket(mut socket: WebSocket, state: BackendDouble) {
        let n = state
            .accepted
            .fetch_add(1, Ordering::SeqCst);

        for frame in &state.greeting {
            let _ = socket.send(WsFrame::Text(frame.clone())).await;
        }

        // A dropped socket never reads, so its frames are provably lost.
        if n < state.drop_first {
            return;
        }

        while let Some(Ok(frame)) = socket.recv().await {
            if let WsFrame::Text(text) = frame {
                let _ = state.inbound_tx.send(text);
            }
        }
    }

    async fn upload_endpoint(
        State(state): State<BackendDouble>,
        mut multipart: Multipart,
    ) -> Result<Json<Value>, StatusCode> {
        if state.fail_uploads {
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
        let field = multipart.next_field().await.unwrap().unwrap();
        assert_eq!(field.name(), Some("file"));
        let name = field.file_name().unwrap().to_string();
        Ok(Json(json!({ "file_url": format!("/uploads/{}", name) })))
    }

    struct Backend {
        addr: SocketAddr,
        inbound: mpsc::UnboundedReceiver<String>,
    }

    async fn spawn_backend(double: BackendDouble) -> SocketAddr {
        let app = Router::new()
            .route("/messages/:conversation_id", get(snapshot_endpoint))
            .route("/ws/:conversation_id/:user_id", get(ws_endpoint))
            .route("/files/upload", post(upload_endpoint))
            .with_state(double);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn backend(snapshots: Vec<(i64, Value)>, greeting: Vec<String>) -> Backend {
        backend_with(snapshots, greeting, 0, false).await
    }

    async fn backend_with(
        snapshots: Vec<(i64, Value)>,
        greeting: Vec<String>,
        drop_first: u32,
        fail_uploads: bool,
    ) -> Backend {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let double = BackendDouble {
            snapshots: Arc::new(snapshots.into_iter().collect()),
            greeting,
            inbound_tx,
            accepted: Arc::new(AtomicU32::new(0)),
            drop_first,
            fail_uploads,
        };
        let addr = spawn_backend(double).await;
        Backend { addr, inbound }
    }

    fn api_for(addr: SocketAddr) -> ApiClient {
        let mut api = ApiClient::new(&format!("http://{}", addr));
        api.set_token("jwt-token");
        api
    }

    fn plain_config(addr: SocketAddr) -> ChannelConfig {
        ChannelConfig {
            server_url: format!("http://{}", addr),
            reconnect: None,
        }
    }

    /// Two historical messages from user 5, neither seen by user 2.
    fn history() -> Value {
        json!([
            {
                "id": 1, "conversation_id": 3, "sender_id": 5,
                "content": "hello", "file_url": null,
                "created_at": "2024-05-01T10:00:00Z", "seen_by": []
            },
            {
                "id": 2, "conversation_id": 3, "sender_id": 5,
                "content": "there", "file_url": null,
                "created_at": "2024-05-01T10:01:00Z", "seen_by": []
            }
        ])
    }

    fn message_frame(id: i64, sender: i64, content: &str) -> String {
        json!({
            "type": "message",
            "message": {
                "id": id, "conversation_id": 3, "sender_id": sender,
                "content": content, "file_url": null,
                "created_at": "2024-05-01T11:00:00Z", "seen_by": []
            }
        })
        .to_string()
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event stream ended")
    }

    async fn next_inbound(backend: &mut Backend) -> ClientFrame {
        let text = timeout(Duration::from_secs(5), backend.inbound.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("backend double gone");
        ClientFrame::from_json(&text).unwrap()
    }

    async fn open(
        backend: &Backend,
        conversation: i64,
        user: i64,
    ) -> Result<(SyncSession, mpsc::UnboundedReceiver<SessionEvent>), ClientError> {
        SyncSession::open(
            api_for(backend.addr),
            &plain_config(backend.addr),
            ConversationId(conversation),
            UserId(user),
        )
        .await
    }

    #[tokio::test]
    async fn test_open_loads_snapshot_and_acks_backlog() {
        let mut backend = backend(vec![(3, history())], Vec::new()).await;

        let (session, mut events) = open(&backend, 3, 2).await.unwrap();

        assert_eq!(session.message_count(), 2);
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::StatusChanged {
                status: ChannelStatus::Connected
            }
        );
        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Seen {
                message_ids: vec![MessageId(1), MessageId(2)]
            }
        );
    }

    #[tokio::test]
    async fn test_snapshot_failure_builds_no_session() {
        let backend = backend(Vec::new(), Vec::new()).await;

        let err = open(&backend, 3, 2).await.unwrap_err();
        assert!(matches!(err, ClientError::Snapshot(_)));
    }

    #[tokio::test]
    async fn test_inbound_message_emits_once_and_gets_acked() {
        // The same message twice, then a typing frame as an order marker.
        let greeting = vec![
            message_frame(7, 5, "fresh"),
            message_frame(7, 5, "fresh"),
            json!({ "type": "typing", "user_id": 5, "status": true }).to_string(),
        ];
        let mut backend = backend(vec![(3, json!([]))], greeting).await;

        let (session, mut events) = open(&backend, 3, 2).await.unwrap();

        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::StatusChanged {
                status: ChannelStatus::Connected
            }
        );
        match next_event(&mut events).await {
            SessionEvent::MessageAdded { message } => {
                assert_eq!(message.id, MessageId(7));
                assert_eq!(message.content.as_deref(), Some("fresh"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // The duplicate emitted nothing: the next event is already typing.
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::TypingChanged {
                user_id: Some(UserId(5))
            }
        );
        assert_eq!(session.message_count(), 1);
        assert_eq!(session.typing_user(), Some(UserId(5)));

        // Exactly one acknowledgement for the new arrival.
        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Seen {
                message_ids: vec![MessageId(7)]
            }
        );
    }

    #[tokio::test]
    async fn test_presence_receipts_and_reactions_flow_through() {
        let greeting = vec![
            json!({ "type": "online_list", "user_ids": [2, 5] }).to_string(),
            json!({ "type": "seen", "user_id": 2, "message_ids": [1, 2] }).to_string(),
            json!({ "type": "reaction", "message_id": 1, "emoji": "👍", "user_id": 5 }).to_string(),
            json!({ "type": "reaction", "message_id": 1, "emoji": "👍", "user_id": 5 }).to_string(),
            json!({ "type": "presence", "user_id": 5, "online": false }).to_string(),
        ];
        let backend = backend(vec![(3, history())], greeting).await;

        let (session, mut events) = open(&backend, 3, 2).await.unwrap();

        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::StatusChanged {
                status: ChannelStatus::Connected
            }
        );
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::PresenceChanged {
                online: vec![UserId(2), UserId(5)]
            }
        );
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::SeenUpdated {
                user_id: UserId(2),
                message_ids: vec![MessageId(1), MessageId(2)]
            }
        );
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::ReactionAdded {
                message_id: MessageId(1),
                emoji: "👍".to_string(),
                user_id: UserId(5)
            }
        );
        // The duplicate reaction emitted nothing.
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::PresenceChanged {
                online: vec![UserId(2)]
            }
        );

        let messages = session.messages();
        assert!(messages[0].seen_by_user(UserId(2)));
        assert_eq!(messages[0].reactions.len(), 1);
        assert_eq!(messages[0].reactions[0].count, 1);
        assert_eq!(session.online_users(), vec![UserId(2)]);
    }

    #[tokio::test]
    async fn test_outbound_frames_reach_the_backend() {
        let mut backend = backend(vec![(3, json!([]))], Vec::new()).await;

        let (session, _events) = open(&backend, 3, 2).await.unwrap();

        assert!(session.send_text("hello"));
        assert!(session.send_reply("re: hello", MessageId(4)));
        assert!(session.set_typing(true));
        assert!(session.react(MessageId(9), "🎉"));

        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Message {
                content: Some("hello".to_string()),
                file_url: None,
                reply_to: None
            }
        );
        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Message {
                content: Some("re: hello".to_string()),
                file_url: None,
                reply_to: Some(MessageId(4))
            }
        );
        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Typing { status: true }
        );
        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Reaction {
                message_id: MessageId(9),
                emoji: "🎉".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_send_file_uploads_before_sending() {
        let mut backend = backend(vec![(3, json!([]))], Vec::new()).await;

        let (session, _events) = open(&backend, 3, 2).await.unwrap();

        let sent = session
            .send_file("notes.txt", b"meeting notes".to_vec())
            .await
            .unwrap();
        assert!(sent);

        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Message {
                content: Some("[File: notes.txt]".to_string()),
                file_url: Some("/uploads/notes.txt".to_string()),
                reply_to: None
            }
        );
    }

    #[tokio::test]
    async fn test_failed_upload_sends_nothing() {
        let mut backend = backend_with(vec![(3, json!([]))], Vec::new(), 0, true).await;

        let (session, _events) = open(&backend, 3, 2).await.unwrap();

        let err = session
            .send_file("notes.txt", b"meeting notes".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Upload(_)));

        // The next frame the backend sees is the sentinel, not a file.
        assert!(session.send_text("sentinel"));
        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Message {
                content: Some("sentinel".to_string()),
                file_url: None,
                reply_to: None
            }
        );
    }

    #[tokio::test]
    async fn test_mark_seen_with_nothing_due_sends_nothing() {
        let mut backend = backend(vec![(3, history())], Vec::new()).await;

        let (session, _events) = open(&backend, 3, 2).await.unwrap();

        // The backlog ack from open covers everything.
        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Seen {
                message_ids: vec![MessageId(1), MessageId(2)]
            }
        );
        assert!(session.mark_seen());

        assert!(session.send_text("sentinel"));
        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Message {
                content: Some("sentinel".to_string()),
                file_url: None,
                reply_to: None
            }
        );
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let other_history = json!([
            {
                "id": 9, "conversation_id": 4, "sender_id": 6,
                "content": "elsewhere", "file_url": null,
                "created_at": "2024-05-01T12:00:00Z", "seen_by": []
            }
        ]);
        let backend = backend(vec![(3, history()), (4, other_history)], Vec::new()).await;

        let (first, _first_events) = open(&backend, 3, 2).await.unwrap();
        let (second, _second_events) = open(&backend, 4, 2).await.unwrap();

        assert_eq!(first.message_count(), 2);
        assert_eq!(second.message_count(), 1);
        assert_eq!(second.messages()[0].id, MessageId(9));

        // Closing the first session leaves the second fully alive.
        let mut status = first.status();
        first.close();
        while *status.borrow() != ChannelStatus::Disconnected {
            status.changed().await.unwrap();
        }

        assert!(!first.send_text("too late"));
        assert!(second.send_text("still here"));
        assert_eq!(second.message_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_resends_lost_acks() {
        let mut backend = backend_with(vec![(3, history())], Vec::new(), 1, false).await;

        let config = ChannelConfig {
            server_url: format!("http://{}", backend.addr),
            reconnect: Some(ReconnectPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(100),
            }),
        };
        let (_session, mut events) = SyncSession::open(
            api_for(backend.addr),
            &config,
            ConversationId(3),
            UserId(2),
        )
        .await
        .unwrap();

        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::StatusChanged {
                status: ChannelStatus::Connected
            }
        );
        // The first socket hangs up without reading; its ack died with it.
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::StatusChanged {
                status: ChannelStatus::Reconnecting
            }
        );
        assert_eq!(
            next_event(&mut events).await,
            SessionEvent::StatusChanged {
                status: ChannelStatus::Connected
            }
        );

        // The second socket stays up and receives the re-sent backlog ack.
        assert_eq!(
            next_inbound(&mut backend).await,
            ClientFrame::Seen {
                message_ids: vec![MessageId(1), MessageId(2)]
            }
        );
    }
}
