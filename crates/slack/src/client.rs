use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use garagebot_core::GarageError;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Every Web API call fails after this window instead of hanging a dispatch.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One name→ID pair from a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub id: String,
    pub name: String,
}

/// One page of a paginated directory listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryPage {
    pub entries: Vec<DirectoryEntry>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("slack http client could not be built: {0}")]
    Build(#[source] reqwest::Error),
    #[error("slack {method} request failed: {source}")]
    Http { method: &'static str, source: reqwest::Error },
    #[error("slack {method} rejected: {reason}")]
    Rejected { method: &'static str, reason: String },
    #[error("slack {method} response was malformed: {detail}")]
    Decode { method: &'static str, detail: String },
}

impl From<ApiError> for GarageError {
    fn from(value: ApiError) -> Self {
        Self::Integration(value.to_string())
    }
}

/// The slice of the Slack Web API garagebot depends on.
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn users_page(&self, limit: u32, cursor: Option<&str>)
        -> Result<DirectoryPage, ApiError>;
    async fn channels_page(
        &self,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<DirectoryPage, ApiError>;
    /// Opens (or reuses) a direct conversation with the given users and
    /// returns its channel ID.
    async fn open_conversation(&self, user_ids: &[String]) -> Result<String, ApiError>;
    async fn post_message(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<(), ApiError>;
}

pub struct WebApiClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
}

impl WebApiClient {
    pub fn new(bot_token: SecretString) -> Result<Self, ApiError> {
        Self::with_base_url(bot_token, SLACK_API_BASE, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Point the client at a different API root (test servers) with an
    /// explicit request timeout.
    pub fn with_base_url(
        bot_token: SecretString,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build().map_err(ApiError::Build)?;
        Ok(Self { http, base_url: base_url.into(), bot_token })
    }

    async fn get_json(
        &self,
        method: &'static str,
        query: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        let response = self
            .http
            .get(format!("{}/{method}", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|source| ApiError::Http { method, source })?;

        let payload: Value =
            response.json().await.map_err(|source| ApiError::Http { method, source })?;
        check_envelope(method, payload)
    }

    async fn post_json(&self, method: &'static str, body: Value) -> Result<Value, ApiError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|source| ApiError::Http { method, source })?;

        let payload: Value =
            response.json().await.map_err(|source| ApiError::Http { method, source })?;
        check_envelope(method, payload)
    }
}

/// Slack reports failures inside a 200 response; `ok: false` plus an `error`
/// token is the real status.
fn check_envelope(method: &'static str, payload: Value) -> Result<Value, ApiError> {
    if payload.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(payload);
    }
    let reason = payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned();
    Err(ApiError::Rejected { method, reason })
}

fn next_cursor(payload: &Value) -> Option<String> {
    payload
        .get("response_metadata")
        .and_then(|metadata| metadata.get("next_cursor"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|cursor| !cursor.is_empty())
        .map(ToOwned::to_owned)
}

#[derive(Deserialize)]
struct UserRecord {
    id: Option<String>,
    profile: Option<UserProfile>,
}

#[derive(Deserialize)]
struct UserProfile {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct ChannelRecord {
    id: Option<String>,
    name: Option<String>,
}

fn paging_query(limit: u32, cursor: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", limit.to_string())];
    if let Some(cursor) = cursor {
        query.push(("cursor", cursor.to_owned()));
    }
    query
}

#[async_trait]
impl SlackApi for WebApiClient {
    async fn users_page(
        &self,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<DirectoryPage, ApiError> {
        const METHOD: &str = "users.list";
        let payload = self.get_json(METHOD, &paging_query(limit, cursor)).await?;

        let members: Vec<UserRecord> =
            serde_json::from_value(payload.get("members").cloned().unwrap_or_default()).map_err(
                |err| ApiError::Decode { method: METHOD, detail: err.to_string() },
            )?;

        let entries = members
            .into_iter()
            .filter_map(|member| {
                let id = member.id?;
                let name = member.profile?.display_name?;
                (!name.is_empty()).then_some(DirectoryEntry { id, name })
            })
            .collect();

        Ok(DirectoryPage { entries, next_cursor: next_cursor(&payload) })
    }

    async fn channels_page(
        &self,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<DirectoryPage, ApiError> {
        const METHOD: &str = "conversations.list";
        let payload = self.get_json(METHOD, &paging_query(limit, cursor)).await?;

        let channels: Vec<ChannelRecord> =
            serde_json::from_value(payload.get("channels").cloned().unwrap_or_default()).map_err(
                |err| ApiError::Decode { method: METHOD, detail: err.to_string() },
            )?;

        let entries = channels
            .into_iter()
            .filter_map(|channel| {
                Some(DirectoryEntry { id: channel.id?, name: channel.name? })
            })
            .collect();

        Ok(DirectoryPage { entries, next_cursor: next_cursor(&payload) })
    }

    async fn open_conversation(&self, user_ids: &[String]) -> Result<String, ApiError> {
        const METHOD: &str = "conversations.open";
        let payload = self.post_json(METHOD, json!({ "users": user_ids.join(",") })).await?;

        payload
            .get("channel")
            .and_then(|channel| channel.get("id"))
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .ok_or_else(|| ApiError::Decode {
                method: METHOD,
                detail: "missing channel.id".to_string(),
            })
    }

    async fn post_message(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<(), ApiError> {
        const METHOD: &str = "chat.postMessage";
        let mut body = json!({ "channel": channel_id, "text": text });
        if let Some(thread_ts) = thread_ts {
            body["thread_ts"] = Value::String(thread_ts.to_owned());
        }

        self.post_json(METHOD, body).await?;
        Ok(())
    }
}
