//! Authenticated HTTP backend
//!
//! Wraps reqwest::Client with bearer-token injection and status checking.
//! Live queries go over a WebSocket (see `listen`).

use anyhow::{bail, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{listen, BlobStore, DocumentStore, StoreError, Subscription};
use crate::config::Config;
use crate::models::{ChatGroup, Message, NewMessage};

#[derive(Debug, Deserialize)]
struct GroupsResponse {
    groups: Option<Vec<ChatGroup>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    messages: Option<Vec<Message>>,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Backend reached over HTTP, authenticated with the session's bearer token.
#[derive(Clone)]
pub struct RestStore {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl RestStore {
    pub fn new(base_url: &str, token: impl Into<String>) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("Invalid backend URL: {}", base_url))?;
        if base.cannot_be_a_base() {
            bail!("Backend URL cannot be used as a base: {}", base_url);
        }
        // Keep a trailing slash off so segment joins stay predictable.
        if base.path().ends_with('/') {
            let trimmed = base.path().trim_end_matches('/').to_string();
            base.set_path(&trimmed);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            token: token.into(),
        })
    }

    /// Build a client from the stored backend URL and session token.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let base = config
            .backend_url
            .as_deref()
            .context("No backend configured. Run 'groupchat login' first.")?;
        let session = config
            .session
            .as_ref()
            .context("Not logged in. Run 'groupchat login' first.")?;
        if session.token.is_expired() {
            bail!("Session token expired. Run 'groupchat login'.");
        }
        Self::new(base, session.token.token.clone())
    }

    /// `{base}/v1/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Rejected(format!("bad base URL {}", self.base)))?
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, StoreError> {
        tracing::debug!("GET {}", url);
        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        decode(check_response(resp, &url).await?, &url).await
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T, StoreError>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("POST {}", url);
        let resp = self
            .http
            .post(url.clone())
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        decode(check_response(resp, &url).await?, &url).await
    }

    /// URL of the live-query socket for a group.
    fn listen_url(&self, group_id: &str, limit: usize) -> Result<Url, StoreError> {
        let mut url = self.endpoint(&["groups", group_id, "messages:listen"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("access_token", &self.token);
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| StoreError::Rejected(format!("cannot use {} for WebSocket", url)))?;
        Ok(url)
    }
}

fn transport_error(url: &Url, e: reqwest::Error) -> StoreError {
    StoreError::Unavailable(format!("request to {} failed: {}", url, e))
}

/// Map HTTP status codes onto store errors.
async fn check_response(resp: reqwest::Response, url: &Url) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(StoreError::PermissionDenied(format!(
            "HTTP {} for {} -- run 'groupchat login'",
            status.as_u16(),
            url
        )));
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(StoreError::NotFound(url.to_string()));
    }
    if status.is_server_error() {
        return Err(StoreError::Unavailable(format!("HTTP {} for {}", status.as_u16(), url)));
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StoreError::Rejected(format!(
            "HTTP {} for {}: {}",
            status.as_u16(),
            url,
            body
        )));
    }
    Ok(resp)
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response, url: &Url) -> Result<T, StoreError> {
    resp.json()
        .await
        .map_err(|e| StoreError::Decode(format!("{}: {}", url, e)))
}

impl DocumentStore for RestStore {
    async fn list_groups(&self) -> Result<Vec<ChatGroup>, StoreError> {
        let url = self.endpoint(&["groups"])?;
        let body: GroupsResponse = self.get_json(url).await?;
        let mut groups = body.groups.unwrap_or_default();
        crate::models::sort_by_recency(&mut groups);
        Ok(groups)
    }

    async fn listen(&self, group_id: &str, limit: usize) -> Result<Subscription, StoreError> {
        let url = self.listen_url(group_id, limit)?;
        listen::open(url, group_id.to_string()).await
    }

    async fn query_page(
        &self,
        group_id: &str,
        limit: usize,
        start_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, StoreError> {
        let mut url = self.endpoint(&["groups", group_id, "messages"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("orderBy", "createdAt desc")
                .append_pair("limit", &limit.to_string());
            if let Some(cursor) = start_after {
                // Full precision: a truncated cursor would skip messages.
                query.append_pair(
                    "startAfter",
                    &cursor.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                );
            }
        }
        let body: MessagesResponse = self.get_json(url).await?;
        Ok(body.messages.unwrap_or_default())
    }

    async fn append(&self, group_id: &str, message: &NewMessage) -> Result<String, StoreError> {
        let url = self.endpoint(&["groups", group_id, "messages"])?;
        let created: CreatedResponse = self.post_json(url, message).await?;
        Ok(created.id)
    }
}

impl BlobStore for RestStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let mut segments = vec!["blobs"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let url = self.endpoint(&segments)?;

        tracing::debug!("PUT {} ({} bytes)", url, bytes.len());
        let resp = self
            .http
            .put(url.clone())
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let uploaded: UploadResponse = decode(check_response(resp, &url).await?, &url).await?;
        Ok(uploaded.url)
    }
}
