//! Intent classification seam. The classifier itself is an external
//! collaborator (a trained NLP service); this crate defines the taxonomy the
//! dispatcher branches on, the classification result it consumes, and an
//! HTTP client for a remote classifier endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Intent tags the dispatcher understands. Tags on the wire follow the
/// training corpus convention (`OPEN_DOOR`, `QUERY_STATE`, ...); anything
/// else maps to `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    OpenDoor,
    CloseDoor,
    QueryState,
    Help,
    None,
}

impl Intent {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "GREETING" => Self::Greeting,
            "OPEN_DOOR" => Self::OpenDoor,
            "CLOSE_DOOR" => Self::CloseDoor,
            "QUERY_STATE" => Self::QueryState,
            "HELP" => Self::Help,
            _ => Self::None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Greeting => "GREETING",
            Self::OpenDoor => "OPEN_DOOR",
            Self::CloseDoor => "CLOSE_DOOR",
            Self::QueryState => "QUERY_STATE",
            Self::Help => "HELP",
            Self::None => "NONE",
        }
    }
}

/// One classified utterance: intent, confidence in `[0, 1]`, and the
/// classifier's canned answer when it has one. Consumed once and discarded.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub score: f64,
    pub answer: Option<String>,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn process(&self, utterance: &str) -> Result<Classification>;
}

/// Classifier that understands nothing. Placeholder wiring and tests.
#[derive(Default)]
pub struct NoopClassifier;

#[async_trait]
impl IntentClassifier for NoopClassifier {
    async fn process(&self, _utterance: &str) -> Result<Classification> {
        Ok(Classification { intent: Intent::None, score: 0.0, answer: None })
    }
}

#[derive(Serialize)]
struct ProcessRequest<'a> {
    utterance: &'a str,
}

#[derive(Deserialize)]
struct ProcessResponse {
    intent: String,
    score: f64,
    answer: Option<String>,
}

/// Client for the external classifier service. No latency bound is assumed
/// beyond the configured (generous) timeout.
pub struct RemoteClassifier {
    http: reqwest::Client,
    endpoint: String,
}

impl RemoteClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building nlp http client")?;
        Ok(Self { http, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl IntentClassifier for RemoteClassifier {
    async fn process(&self, utterance: &str) -> Result<Classification> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&ProcessRequest { utterance })
            .send()
            .await
            .context("nlp classifier request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("nlp classifier returned {status}");
        }

        let payload: ProcessResponse =
            response.json().await.context("nlp classifier response was not valid JSON")?;

        let classification = Classification {
            intent: Intent::parse(&payload.intent),
            score: payload.score.clamp(0.0, 1.0),
            answer: payload.answer.filter(|answer| !answer.trim().is_empty()),
        };
        debug!(
            intent = classification.intent.tag(),
            score = classification.score,
            "classified utterance"
        );
        Ok(classification)
    }
}
