//! Typed client for the backend's REST surface.
//!
//! Everything here is thin glue: one request, one typed response, no
//! interaction with the sync stores.  The exception worth naming is
//! [`ApiClient::message_snapshot`], which bootstraps a session and gets its
//! own error type so a failed load can never half-populate a store.

use chrono::{DateTime, Utc};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use causerie_shared::constants::MAX_UPLOAD_SIZE;
use causerie_shared::models::{Conversation, Message, UserProfile, UserSummary};
use causerie_shared::types::{ConversationId, MessageId, UserId};

use crate::error::{RestError, SnapshotError, UploadError};

// ---------------------------------------------------------------------------
// Request / response payloads
// ---------------------------------------------------------------------------

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Body of a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserSummary,
}

/// Partial profile update for `PUT /users/me`; unset fields stay untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,
}

/// Directory entry returned by the user listing (everyone but the caller).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DirectoryUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Body of `POST /conversations/`.
#[derive(Debug, Clone, Serialize)]
pub struct NewConversation {
    pub name: Option<String>,
    pub is_group: bool,
    pub member_ids: Vec<UserId>,
}

/// One image attachment in the media listing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MediaImage {
    pub id: MessageId,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// One non-image attachment in the media listing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MediaFile {
    pub id: MessageId,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub filename: String,
}

/// Attachments of one conversation, split by kind server-side.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaListing {
    pub images: Vec<MediaImage>,
    pub files: Vec<MediaFile>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file_url: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated client for the backend REST API.
///
/// Cheap to clone; clones share the connection pool but carry their own
/// bearer token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(server_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: server_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Install the bearer token used by authenticated endpoints.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<&str, RestError> {
        self.token.as_deref().ok_or(RestError::Unauthenticated)
    }

    // -- auth ---------------------------------------------------------------

    /// `POST /auth/register`.  The backend serves the created profile back.
    pub async fn register(&self, request: &RegisterRequest) -> Result<UserProfile, RestError> {
        let resp = self
            .http
            .post(self.url("/auth/register"))
            .json(request)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// `POST /auth/login`.  Stores the returned bearer token on success.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<LoginResponse, RestError> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        let login: LoginResponse = check(resp).await?.json().await?;
        self.token = Some(login.access_token.clone());
        info!(user_id = %login.user.id, "Logged in");
        Ok(login)
    }

    // -- users --------------------------------------------------------------

    /// `GET /users/me`.
    pub async fn current_user(&self) -> Result<UserProfile, RestError> {
        let resp = self
            .http
            .get(self.url("/users/me"))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// `PUT /users/me`.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, RestError> {
        let resp = self
            .http
            .put(self.url("/users/me"))
            .bearer_auth(self.bearer()?)
            .json(update)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// `GET /users/all`.
    pub async fn all_users(&self) -> Result<Vec<DirectoryUser>, RestError> {
        let resp = self
            .http
            .get(self.url("/users/all"))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// `GET /users/{id}`.
    pub async fn user_profile(&self, user: UserId) -> Result<UserProfile, RestError> {
        let resp = self
            .http
            .get(self.url(&format!("/users/{}", user)))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    // -- conversations ------------------------------------------------------

    /// `GET /conversations/mine`.
    pub async fn my_conversations(&self) -> Result<Vec<Conversation>, RestError> {
        let resp = self
            .http
            .get(self.url("/conversations/mine"))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// `POST /conversations/`.  The response omits the member list.
    pub async fn create_conversation(
        &self,
        request: &NewConversation,
    ) -> Result<Conversation, RestError> {
        let resp = self
            .http
            .post(self.url("/conversations/"))
            .bearer_auth(self.bearer()?)
            .json(request)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    // -- messages -----------------------------------------------------------

    /// `GET /messages/{conversation_id}`: the ordered history snapshot a
    /// session is initialized from.
    ///
    /// Read-only; on error the caller's store stays untouched.
    pub async fn message_snapshot(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<Message>, SnapshotError> {
        let resp = self
            .http
            .get(self.url(&format!("/messages/{}", conversation)))
            .bearer_auth(self.bearer()?)
            .send()
            .await
            .map_err(RestError::from)?;

        let messages: Vec<Message> = check(resp)
            .await?
            .json()
            .await
            .map_err(RestError::from)?;

        debug!(
            conversation_id = %conversation,
            count = messages.len(),
            "Snapshot loaded"
        );
        Ok(messages)
    }

    /// `GET /messages/{conversation_id}/search?q=`.
    pub async fn search_messages(
        &self,
        conversation: ConversationId,
        query: &str,
    ) -> Result<Vec<Message>, RestError> {
        let resp = self
            .http
            .get(self.url(&format!("/messages/{}/search", conversation)))
            .query(&[("q", query)])
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    // -- media / files ------------------------------------------------------

    /// `GET /media/{conversation_id}`.
    pub async fn media_listing(
        &self,
        conversation: ConversationId,
    ) -> Result<MediaListing, RestError> {
        let resp = self
            .http
            .get(self.url(&format!("/media/{}", conversation)))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// `POST /files/upload` (multipart).  Returns the backend's `file_url`.
    ///
    /// Oversized files are rejected client-side before any bytes move.
    pub async fn upload_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, UploadError> {
        if bytes.len() > MAX_UPLOAD_SIZE {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                limit: MAX_UPLOAD_SIZE,
            });
        }

        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(self.url("/files/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(RestError::from)?;

        let body: UploadResponse = check(resp)
            .await?
            .json()
            .await
            .map_err(RestError::from)?;

        info!(file_url = %body.file_url, "File uploaded");
        Ok(body.file_url)
    }

    // -- settings -----------------------------------------------------------

    /// `PUT /settings/nickname`.
    pub async fn set_nickname(
        &self,
        conversation: ConversationId,
        user: UserId,
        nickname: &str,
    ) -> Result<(), RestError> {
        let resp = self
            .http
            .put(self.url("/settings/nickname"))
            .bearer_auth(self.bearer()?)
            .json(&serde_json::json!({
                "conversation_id": conversation,
                "user_id": user,
                "nickname": nickname,
            }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// `PUT /settings/theme`.
    pub async fn set_theme(&self, conversation: ConversationId, theme: &str) -> Result<(), RestError> {
        let resp = self
            .http
            .put(self.url("/settings/theme"))
            .bearer_auth(self.bearer()?)
            .json(&serde_json::json!({
                "conversation_id": conversation,
                "theme": theme,
            }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// `POST /settings/leave`.
    pub async fn leave_conversation(&self, conversation: ConversationId) -> Result<(), RestError> {
        let resp = self
            .http
            .post(self.url("/settings/leave"))
            .bearer_auth(self.bearer()?)
            .json(&serde_json::json!({ "conversation_id": conversation }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// `DELETE /settings/{conversation_id}`.
    pub async fn delete_conversation(&self, conversation: ConversationId) -> Result<(), RestError> {
        let resp = self
            .http
            .delete(self.url(&format!("/settings/{}", conversation)))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Map non-success statuses to a typed error, keeping the backend's detail
/// text when there is one.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, RestError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let detail = resp.text().await.unwrap_or_default();
    Err(RestError::Status {
        status: status.as_u16(),
        detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use axum::extract::{Multipart, Path};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn login_endpoint(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["username"], "alice");
        Json(json!({
            "access_token": "jwt-token",
            "token_type": "bearer",
            "user": { "id": 2, "username": "alice" }
        }))
    }

    async fn messages_endpoint(Path(conversation_id): Path<i64>) -> Json<Value> {
        Json(json!([
            {
                "id": 1,
                "conversation_id": conversation_id,
                "sender_id": 5,
                "content": "first",
                "file_url": null,
                "created_at": "2024-05-01T10:00:00Z",
                "seen_by": [ { "id": 11, "user_id": 5, "seen_at": "2024-05-01T10:01:00Z" } ]
            },
            {
                "id": 2,
                "conversation_id": conversation_id,
                "sender_id": 2,
                "content": null,
                "file_url": "/uploads/abc_photo.png",
                "created_at": "2024-05-01T10:02:00Z",
                "seen_by": []
            }
        ]))
    }

    async fn upload_endpoint(mut multipart: Multipart) -> Json<Value> {
        let field = multipart.next_field().await.unwrap().unwrap();
        assert_eq!(field.name(), Some("file"));
        let name = field.file_name().unwrap().to_string();
        let bytes = field.bytes().await.unwrap();
        assert!(!bytes.is_empty());
        Json(json!({ "file_url": format!("/uploads/x_{}", name) }))
    }

    async fn spawn_rest_double(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_login_stores_token_and_snapshot_decodes() {
        let app = Router::new()
            .route("/auth/login", post(login_endpoint))
            .route("/messages/:conversation_id", get(messages_endpoint));
        let addr = spawn_rest_double(app).await;

        let mut api = ApiClient::new(&format!("http://{}", addr));
        assert!(api.token().is_none());

        let login = api.login("alice", "secret").await.unwrap();
        assert_eq!(login.user.id, UserId(2));
        assert_eq!(api.token(), Some("jwt-token"));

        let snapshot = api.message_snapshot(ConversationId(3)).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, MessageId(1));
        assert_eq!(snapshot[0].seen_by.len(), 1);
        assert!(snapshot[1].is_file());
    }

    #[tokio::test]
    async fn test_snapshot_error_carries_status() {
        let app = Router::new().route(
            "/messages/:conversation_id",
            get(|| async { (StatusCode::FORBIDDEN, "You are not a member") }),
        );
        let addr = spawn_rest_double(app).await;

        let mut api = ApiClient::new(&format!("http://{}", addr));
        api.set_token("jwt-token");

        let err = api.message_snapshot(ConversationId(3)).await.unwrap_err();
        match err {
            SnapshotError::Load(RestError::Status { status, detail }) => {
                assert_eq!(status, 403);
                assert_eq!(detail, "You are not a member");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_authenticated_endpoint_without_token() {
        let api = ApiClient::new("http://127.0.0.1:1");
        let err = api.current_user().await.unwrap_err();
        assert!(matches!(err, RestError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_upload_returns_file_url() {
        let app = Router::new().route("/files/upload", post(upload_endpoint));
        let addr = spawn_rest_double(app).await;

        let api = ApiClient::new(&format!("http://{}", addr));
        let url = api
            .upload_file("photo.png", b"not really a png".to_vec())
            .await
            .unwrap();
        assert_eq!(url, "/uploads/x_photo.png");
    }

    #[tokio::test]
    async fn test_upload_rejects_oversized_file() {
        let api = ApiClient::new("http://127.0.0.1:1");
        let err = api
            .upload_file("big.bin", vec![0u8; MAX_UPLOAD_SIZE + 1])
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { .. }));
    }
}
