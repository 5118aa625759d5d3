//! Top-level entry point tying the REST surface and realtime sessions
//! together.

use tokio::sync::mpsc;

use causerie_net::rest::{ApiClient, RegisterRequest};
use causerie_shared::models::{Conversation, UserProfile, UserSummary};
use causerie_shared::types::ConversationId;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::SessionEvent;
use crate::session::SyncSession;

/// A chat client bound to one backend and, after login, one user.
///
/// The client itself is cheap state: a REST handle and the logged-in user.
/// All realtime machinery lives in the [`SyncSession`]s it opens.
#[derive(Debug)]
pub struct ChatClient {
    config: ClientConfig,
    api: ApiClient,
    user: Option<UserSummary>,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Self {
        let api = ApiClient::new(&config.server_url);
        Self {
            config,
            api,
            user: None,
        }
    }

    /// Build a client configured from the environment.
    pub fn from_env() -> Self {
        Self::new(ClientConfig::from_env())
    }

    /// Create an account.  Does not log the new user in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserProfile, ClientError> {
        Ok(self.api.register(request).await?)
    }

    /// Log in and remember the authenticated user.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<UserSummary, ClientError> {
        let login = self.api.login(username, password).await?;
        self.user = Some(login.user.clone());
        Ok(login.user)
    }

    /// The logged-in user, if any.
    pub fn user(&self) -> Option<&UserSummary> {
        self.user.as_ref()
    }

    /// Direct access to the REST surface (profiles, directory, media,
    /// conversation settings).
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The logged-in user's conversations.
    pub async fn conversations(&self) -> Result<Vec<Conversation>, ClientError> {
        Ok(self.api.my_conversations().await?)
    }

    /// Open a realtime session for one conversation.
    ///
    /// Returns the session handle plus the event stream the UI renders
    /// from.  One session per shown conversation: close (or drop) the
    /// previous one before opening the next.
    pub async fn open(
        &self,
        conversation: ConversationId,
    ) -> Result<(SyncSession, mpsc::UnboundedReceiver<SessionEvent>), ClientError> {
        let user = self.user.as_ref().ok_or(ClientError::NotLoggedIn)?;
        SyncSession::open(
            self.api.clone(),
            &self.config.channel_config(),
            conversation,
            user.id,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use causerie_shared::types::{ChannelStatus, UserId};

    async fn login_endpoint(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["username"], "alice");
        Json(json!({
            "access_token": "jwt-token",
            "token_type": "bearer",
            "user": { "id": 2, "username": "alice" }
        }))
    }

    async fn snapshot_endpoint() -> Json<Value> {
        Json(json!([
            {
                "id": 1, "conversation_id": 3, "sender_id": 5,
                "content": "hello", "file_url": null,
                "created_at": "2024-05-01T10:00:00Z", "seen_by": []
            }
        ]))
    }

    async fn ws_endpoint(ws: WebSocketUpgrade) -> axum::response::Response {
        ws.on_upgrade(|mut socket: WebSocket| async move {
            while let Some(Ok(frame)) = socket.recv().await {
                if let WsFrame::Close(_) = frame {
                    break;
                }
            }
        })
    }

    async fn spawn_backend() -> std::net::SocketAddr {
        let app = Router::new()
            .route("/auth/login", post(login_endpoint))
            .route("/messages/:conversation_id", get(snapshot_endpoint))
            .route("/ws/:conversation_id/:user_id", get(ws_endpoint));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client_for(addr: std::net::SocketAddr) -> ChatClient {
        ChatClient::new(ClientConfig {
            server_url: format!("http://{}", addr),
            reconnect: None,
        })
    }

    #[tokio::test]
    async fn test_open_before_login_fails() {
        let client = ChatClient::new(ClientConfig::default());
        let err = client.open(ConversationId(3)).await.unwrap_err();
        assert!(matches!(err, ClientError::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_login_then_open() {
        let addr = spawn_backend().await;
        let mut client = client_for(addr);

        let user = client.login("alice", "secret").await.unwrap();
        assert_eq!(user.id, UserId(2));
        assert_eq!(client.user().map(|u| u.id), Some(UserId(2)));

        let (session, mut events) = client.open(ConversationId(3)).await.unwrap();
        assert_eq!(session.message_count(), 1);
        assert_eq!(session.local_user(), UserId(2));
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::StatusChanged {
                status: ChannelStatus::Connected
            })
        );
    }
}
