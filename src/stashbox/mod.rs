//! Remote registry client (C4): GraphQL-over-HTTPS access to one stash-box
//! endpoint.
//!
//! Payloads are built and parsed by hand as raw `serde_json::Value`, the
//! same way the teacher's `semantic::api` module talks to its embedding
//! endpoints, rather than through a codegen'd GraphQL client crate — this
//! crate never needs anything beyond the handful of operations in
//! [`StashBoxClient`], and hand-built multipart bodies are required for
//! draft uploads regardless.

mod wire;

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::IdentifyConfig;
use crate::fingerprint::Fingerprint;
use crate::scraped::{ScrapedPerformer, ScrapedScene};

pub use wire::{DraftSubmission, FingerprintQuery, PerformerDraftInput, SceneDraftInput};

/// Maximum number of [`FingerprintQuery`] values a single
/// `find_scenes_by_full_fingerprints` call may carry. Chunking to this
/// bound is the caller's (C6's) responsibility.
pub const MAX_FINGERPRINT_BATCH: usize = 100;

/// Default connect/request timeouts, used by [`StashBoxClient::new`] when no
/// [`IdentifyConfig`] is available to source them from.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("stash-box request failed: {0}")]
    Transport(String),

    #[error("stash-box returned {status}: {message}")]
    ErrRemote { status: u16, message: String },

    #[error("malformed stash-box response: {0}")]
    MalformedResponse(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("fingerprint batch of {0} exceeds the {MAX_FINGERPRINT_BATCH}-per-call bound")]
    BatchTooLarge(usize),
}

fn build_http_client(connect_timeout: Duration, request_timeout: Duration) -> Client {
    Client::builder()
        .timeout(request_timeout)
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(32)
        .build()
        .expect("failed to build stash-box HTTP client")
}

/// Client for one stash-box endpoint, identified by its GraphQL URL and
/// API key. Each instance owns a connection-pooled `reqwest::Client` sized
/// by its configured timeouts, shared across every call this instance makes
/// (SPEC_FULL §5's "shared resource policy"), mirroring the teacher's
/// `Lazy<reqwest::Client>` static generalised to per-endpoint configuration.
pub struct StashBoxClient {
    endpoint: String,
    api_key: String,
    http: Client,
}

impl StashBoxClient {
    /// Builds a client using the default connect/request timeouts.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_timeouts(
            endpoint,
            api_key,
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    /// Builds a client using the connect/request timeouts from a loaded
    /// [`IdentifyConfig`].
    pub fn from_config(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        config: &IdentifyConfig,
    ) -> Self {
        Self::with_timeouts(
            endpoint,
            api_key,
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn with_timeouts(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            http: build_http_client(connect_timeout, request_timeout),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post_json(
        &self,
        payload: Value,
        cancel: &crate::CancellationToken,
    ) -> Result<Value, RemoteError> {
        let request = self
            .http
            .post(&self.endpoint)
            .header("ApiKey", &self.api_key)
            .json(&payload)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
            result = request => result.map_err(|e| RemoteError::Transport(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::ErrRemote {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))
    }

    async fn post_multipart(
        &self,
        operations: Value,
        image: Option<Vec<u8>>,
        cancel: &crate::CancellationToken,
    ) -> Result<Value, RemoteError> {
        let map = if image.is_some() {
            json!({"0": ["variables.input.image"]})
        } else {
            json!({})
        };

        let mut form = reqwest::multipart::Form::new()
            .text("operations", operations.to_string())
            .text("map", map.to_string());
        if let Some(bytes) = image {
            form = form.part("0", reqwest::multipart::Part::bytes(bytes).file_name("draft"));
        }

        let request = self
            .http
            .post(&self.endpoint)
            .header("ApiKey", &self.api_key)
            .multipart(form)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RemoteError::Cancelled),
            result = request => result.map_err(|e| RemoteError::Transport(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::ErrRemote {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))
    }

    pub async fn search_scene(
        &self,
        term: &str,
        cancel: &crate::CancellationToken,
    ) -> Result<Vec<ScrapedScene>, RemoteError> {
        let payload = wire::search_scene_query(term);
        let body = self.post_json(payload, cancel).await?;
        wire::parse_scenes(&body, "searchScene")
    }

    pub async fn search_performer(
        &self,
        term: &str,
        cancel: &crate::CancellationToken,
    ) -> Result<Vec<ScrapedPerformer>, RemoteError> {
        let payload = wire::search_performer_query(term);
        let body = self.post_json(payload, cancel).await?;
        wire::parse_performers(&body, "searchPerformer")
    }

    pub async fn find_performer_by_id(
        &self,
        remote_id: &str,
        cancel: &crate::CancellationToken,
    ) -> Result<Option<ScrapedPerformer>, RemoteError> {
        let payload = wire::find_performer_query(remote_id);
        let body = self.post_json(payload, cancel).await?;
        wire::parse_single_performer(&body, "findPerformer")
    }

    pub async fn find_scenes_by_full_fingerprints(
        &self,
        fingerprints: &[FingerprintQuery],
        cancel: &crate::CancellationToken,
    ) -> Result<Vec<ScrapedScene>, RemoteError> {
        if fingerprints.len() > MAX_FINGERPRINT_BATCH {
            return Err(RemoteError::BatchTooLarge(fingerprints.len()));
        }
        let payload = wire::find_scenes_by_fingerprints_query(fingerprints);
        let body = self.post_json(payload, cancel).await?;
        wire::parse_scenes(&body, "findScenesByFullFingerprints")
    }

    pub async fn submit_fingerprint(
        &self,
        scene_remote_id: &str,
        fingerprint: &Fingerprint,
        cancel: &crate::CancellationToken,
    ) -> Result<bool, RemoteError> {
        let payload = wire::submit_fingerprint_mutation(scene_remote_id, fingerprint);
        let body = self.post_json(payload, cancel).await?;
        wire::parse_bool(&body, "submitFingerprint")
    }

    pub async fn submit_scene_draft(
        &self,
        input: &SceneDraftInput,
        image: Option<Vec<u8>>,
        cancel: &crate::CancellationToken,
    ) -> Result<DraftSubmission, RemoteError> {
        let operations = wire::scene_draft_operations(input);
        let body = self.post_multipart(operations, image, cancel).await?;
        wire::parse_draft(&body, "submitSceneDraft")
    }

    pub async fn submit_performer_draft(
        &self,
        input: &PerformerDraftInput,
        image: Option<Vec<u8>>,
        cancel: &crate::CancellationToken,
    ) -> Result<DraftSubmission, RemoteError> {
        let operations = wire::performer_draft_operations(input);
        let body = self.post_multipart(operations, image, cancel).await?;
        wire::parse_draft(&body, "submitPerformerDraft")
    }

    /// Credential probe: confirms the configured API key authenticates,
    /// returning the authenticated user's remote ID.
    pub async fn me(&self, cancel: &crate::CancellationToken) -> Result<String, RemoteError> {
        let payload = wire::me_query();
        let body = self.post_json(payload, cancel).await?;
        wire::parse_me(&body)
    }
}
