//! Backend transport module
//!
//! This module defines the seam between the engine and the REST backend:
//! - The `Backend` trait, one method per backend operation the engine consumes
//! - `HttpBackend`, the `reqwest` implementation against the dashboard's REST API
//! - Classification of HTTP failures into the engine's error taxonomy
//!
//! Backend methods return raw JSON; normalization into the data model happens
//! in the directory, fetcher and controller layers (see [`crate::protocol`]).

use crate::{
    protocol::{GetOrCreateRequest, OutgoingMessage},
    session::Credentials,
    storage::Settings,
    ConversationId, Error, Result,
};
use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

/// Operations the engine consumes from the REST backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// `GET /api/me/`
    async fn fetch_me(&self) -> Result<Value>;

    /// `GET /api/users/`
    async fn fetch_users(&self) -> Result<Value>;

    /// `GET /api/conversations/` - all conversations of the current user
    async fn fetch_conversations(&self) -> Result<Value>;

    /// `GET /api/conversations/groups/` - group conversations of the current user
    async fn fetch_group_conversations(&self) -> Result<Value>;

    /// `GET /api/chat/{id}/` - messages of a conversation
    async fn fetch_messages(&self, conversation_id: ConversationId) -> Result<Value>;

    /// `GET /api/chat/{id}/unread/` - unread counter of the current user
    async fn fetch_unread(&self, conversation_id: ConversationId) -> Result<Value>;

    /// `POST /api/chat/{id}/seen/`
    async fn mark_seen(&self, conversation_id: ConversationId) -> Result<()>;

    /// `POST /api/conversations/get_or_create/`
    async fn get_or_create_conversation(&self, request: &GetOrCreateRequest) -> Result<Value>;

    /// `POST /api/chat/{id}/messages/`
    async fn send_message(
        &self,
        conversation_id: ConversationId,
        message: &OutgoingMessage,
    ) -> Result<Value>;

    /// `DELETE /api/groups/{id}/`
    async fn delete_group(&self, conversation_id: ConversationId) -> Result<()>;
}

/// REST backend over HTTP
///
/// The bearer token is read from [`Credentials`] on every request, so a login or
/// logout takes effect on the next call without rebuilding the backend.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpBackend {
    /// Create a backend from settings
    pub fn new(settings: &Settings, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| Error::Transient(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self
            .credentials
            .token()
            .ok_or_else(|| Error::Auth("No access token".to_string()))?;

        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self.request(Method::GET, path)?.send().await?;
        read_json(check_status(response, path).await?).await
    }
}

/// Map a response status onto the error taxonomy
async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => {
            warn!("Backend rejected credential on {}", path);
            Err(Error::Auth(format!("{} returned {}", path, status)))
        }
        StatusCode::BAD_REQUEST => Err(Error::Validation(if body.is_empty() {
            format!("{} returned {}", path, status)
        } else {
            body
        })),
        _ => Err(Error::Transient(format!("{} returned {}", path, status))),
    }
}

/// Parse a JSON body; an empty body reads as `null`
async fn read_json(response: Response) -> Result<Value> {
    let body = response.bytes().await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&body)
        .map_err(|e| Error::Transient(format!("Malformed backend response: {}", e)))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn fetch_me(&self) -> Result<Value> {
        self.get_json("/api/me/").await
    }

    async fn fetch_users(&self) -> Result<Value> {
        self.get_json("/api/users/").await
    }

    async fn fetch_conversations(&self) -> Result<Value> {
        self.get_json("/api/conversations/").await
    }

    async fn fetch_group_conversations(&self) -> Result<Value> {
        self.get_json("/api/conversations/groups/").await
    }

    async fn fetch_messages(&self, conversation_id: ConversationId) -> Result<Value> {
        self.get_json(&format!("/api/chat/{}/", conversation_id)).await
    }

    async fn fetch_unread(&self, conversation_id: ConversationId) -> Result<Value> {
        self.get_json(&format!("/api/chat/{}/unread/", conversation_id))
            .await
    }

    async fn mark_seen(&self, conversation_id: ConversationId) -> Result<()> {
        let path = format!("/api/chat/{}/seen/", conversation_id);
        let response = self
            .request(Method::POST, &path)?
            .json(&serde_json::json!({}))
            .send()
            .await?;
        check_status(response, &path).await?;
        Ok(())
    }

    async fn get_or_create_conversation(&self, request: &GetOrCreateRequest) -> Result<Value> {
        let path = "/api/conversations/get_or_create/";
        let response = self
            .request(Method::POST, path)?
            .json(request)
            .send()
            .await?;
        read_json(check_status(response, path).await?).await
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        message: &OutgoingMessage,
    ) -> Result<Value> {
        let path = format!("/api/chat/{}/messages/", conversation_id);

        let mut form = multipart::Form::new().text("text", message.text.clone());
        if let Some(attachment) = &message.attachment {
            let mut part = multipart::Part::bytes(attachment.data.to_vec())
                .file_name(attachment.file_name.clone());
            if let Some(mime) = &attachment.mime_type {
                part = part
                    .mime_str(mime)
                    .map_err(|e| Error::Validation(format!("Invalid attachment type: {}", e)))?;
            }
            form = form.part("attachment", part);
        }

        let response = self
            .request(Method::POST, &path)?
            .multipart(form)
            .send()
            .await?;
        read_json(check_status(response, &path).await?).await
    }

    async fn delete_group(&self, conversation_id: ConversationId) -> Result<()> {
        let path = format!("/api/groups/{}/", conversation_id);
        let response = self.request(Method::DELETE, &path)?.send().await?;
        check_status(response, &path).await?;
        Ok(())
    }
}
