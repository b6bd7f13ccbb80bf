//! HTTP client for the topic/artifact backend.
//!
//! Every request attaches `Authorization: Bearer <token>` from the injected
//! [`TokenProvider`]; a missing token fails with `AuthRequired` before any
//! bytes go out. 401 responses map to `AuthRequired`, other non-2xx to
//! `Server` with the backend's `detail` message, transport failures to
//! `Network`.

use crate::api::types::{
    ArtifactData, ArtifactResponse, FileUrlResponse, GenerateRequest, TopicDiscovery,
    TopicDiscoveryResponse,
};
use crate::auth::TokenProvider;
use crate::defaults;
use crate::error::{LisnError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::Arc;

/// Raw bytes of a server-push response body.
pub type ByteStream = Pin<Box<dyn futures_util::Stream<Item = Result<Vec<u8>>> + Send>>;

/// The subset of the backend the player core depends on.
///
/// This trait allows swapping implementations (real HTTP vs mock) so the
/// progress listener and fetch orchestrator are testable without a network.
#[async_trait]
pub trait StoryApi: Send + Sync {
    /// Current artifact state, used by the fallback poll and the post-done
    /// fetch of final segment durations.
    async fn artifact(&self, id: i64) -> Result<ArtifactData>;

    /// Final playable resource location for a finished artifact.
    async fn artifact_file(&self, id: i64) -> Result<FileUrlResponse>;

    /// Open the live generation-progress stream for an artifact.
    async fn progress_stream(&self, id: i64) -> Result<ByteStream>;
}

/// Normalize a search query: lowercase, collapse runs of whitespace, trim.
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate a normalized query against the product minimum length.
pub fn validate_query(normalized: &str) -> Result<()> {
    if normalized.is_empty() {
        return Err(LisnError::Validation {
            message: "enter a topic to search".to_string(),
        });
    }
    if normalized.chars().count() < defaults::MIN_QUERY_LEN {
        return Err(LisnError::Validation {
            message: format!(
                "query must be at least {} characters",
                defaults::MIN_QUERY_LEN
            ),
        });
    }
    Ok(())
}

/// HTTP client for the story backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    /// Create a client for the given backend base URL.
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<String> {
        self.tokens.token().ok_or(LisnError::AuthRequired)
    }

    /// Discover sub-topics for a query.
    ///
    /// The query is normalized and validated locally first; validation
    /// failures never reach the network.
    pub async fn discover_topics(&self, query: &str) -> Result<TopicDiscovery> {
        let normalized = normalize_query(query);
        validate_query(&normalized)?;
        let token = self.bearer()?;

        let response = self
            .http
            .post(self.url("/topics/discover"))
            .query(&[("user_query", normalized.as_str())])
            .header("accept", "application/json")
            .bearer_auth(&token)
            .send()
            .await
            .map_err(LisnError::from_request)?;

        let response = check_status(response).await?;
        let body: TopicDiscoveryResponse =
            response.json().await.map_err(LisnError::from_request)?;
        Ok(body.data)
    }

    /// Request generation of a narration from selected topics.
    ///
    /// Selections beyond the product cap of 8 are truncated.
    pub async fn generate(
        &self,
        topic_discovery_id: i64,
        selected_topic_ids: &[i64],
        duration: u32,
        style: &str,
    ) -> Result<ArtifactData> {
        let token = self.bearer()?;
        let mut ids: Vec<i64> = selected_topic_ids.to_vec();
        ids.truncate(defaults::MAX_SELECTED_TOPICS);

        let body = GenerateRequest {
            duration,
            selected_topic_ids: ids,
            style: style.to_string(),
            topic_discovery_id,
        };

        let response = self
            .http
            .post(self.url("/audio-bytes/generate"))
            .header("accept", "application/json")
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(LisnError::from_request)?;

        let response = check_status(response).await?;
        let body: ArtifactResponse = response.json().await.map_err(LisnError::from_request)?;
        Ok(body.data)
    }

    async fn get_artifact(&self, id: i64) -> Result<ArtifactData> {
        let token = self.bearer()?;
        let response = self
            .http
            .get(self.url(&format!("/audio-bytes/{id}")))
            .header("accept", "application/json")
            .bearer_auth(&token)
            .send()
            .await
            .map_err(LisnError::from_request)?;

        let response = check_status(response).await?;
        let body: ArtifactResponse = response.json().await.map_err(LisnError::from_request)?;
        Ok(body.data)
    }

    async fn get_artifact_file(&self, id: i64) -> Result<FileUrlResponse> {
        let token = self.bearer()?;
        let response = self
            .http
            .get(self.url(&format!("/audio-bytes/{id}/file")))
            .header("accept", "application/json")
            .bearer_auth(&token)
            .send()
            .await
            .map_err(LisnError::from_request)?;

        let response = check_status(response).await?;
        response.json().await.map_err(LisnError::from_request)
    }

    async fn open_progress_stream(&self, id: i64) -> Result<ByteStream> {
        let token = self.bearer()?;
        let response = self
            .http
            .get(self.url(&format!("/audio-bytes/{id}/progress")))
            .header("accept", "text/event-stream")
            .bearer_auth(&token)
            .send()
            .await
            .map_err(LisnError::from_request)?;

        let response = check_status(response).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(LisnError::from_request));
        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl StoryApi for ApiClient {
    async fn artifact(&self, id: i64) -> Result<ArtifactData> {
        self.get_artifact(id).await
    }

    async fn artifact_file(&self, id: i64) -> Result<FileUrlResponse> {
        self.get_artifact_file(id).await
    }

    async fn progress_stream(&self, id: i64) -> Result<ByteStream> {
        self.open_progress_stream(id).await
    }
}

/// Map a non-2xx response to the error taxonomy, reading the backend's
/// `{"detail": "..."}` body when present.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));

    Err(LisnError::from_status(status.as_u16(), detail))
}

/// Mock backend for testing the player core without a network.
#[derive(Default)]
pub struct MockStoryApi {
    artifacts: std::sync::Mutex<std::collections::VecDeque<ArtifactData>>,
    file_url: std::sync::Mutex<Option<String>>,
    fail_file_fetch: std::sync::atomic::AtomicBool,
    stream_chunks: std::sync::Mutex<Vec<Vec<u8>>>,
    stream_tail_error: std::sync::atomic::AtomicBool,
    stream_hangs: std::sync::atomic::AtomicBool,
    artifact_calls: std::sync::atomic::AtomicUsize,
    file_calls: std::sync::atomic::AtomicUsize,
    stream_calls: std::sync::atomic::AtomicUsize,
}

impl MockStoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an artifact response. Responses are consumed in order; the last
    /// one keeps repeating, so a single scripted state answers any number of
    /// polls.
    pub fn with_artifact(self, artifact: ArtifactData) -> Self {
        self.artifacts
            .lock()
            .expect("mock lock")
            .push_back(artifact);
        self
    }

    /// Set the file-URL response for finished artifacts.
    pub fn with_file_url(self, url: &str) -> Self {
        *self.file_url.lock().expect("mock lock") = Some(url.to_string());
        self
    }

    /// Make `artifact_file` fail with a server error.
    pub fn with_failing_file_fetch(self) -> Self {
        self.fail_file_fetch
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// Script the raw bytes the progress stream yields, one chunk per call.
    pub fn with_stream_chunks(self, chunks: Vec<&[u8]>) -> Self {
        *self.stream_chunks.lock().expect("mock lock") =
            chunks.into_iter().map(|c| c.to_vec()).collect();
        self
    }

    /// Append a transport error after the scripted chunks.
    pub fn with_stream_error(self) -> Self {
        self.stream_tail_error
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// Keep the stream open forever after the scripted chunks, like a live
    /// connection with a silent server.
    pub fn with_hanging_stream(self) -> Self {
        self.stream_hangs
            .store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    pub fn artifact_call_count(&self) -> usize {
        self.artifact_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn file_call_count(&self) -> usize {
        self.file_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn stream_call_count(&self) -> usize {
        self.stream_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl StoryApi for MockStoryApi {
    async fn artifact(&self, _id: i64) -> Result<ArtifactData> {
        self.artifact_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut queue = self.artifacts.lock().expect("mock lock");
        match queue.len() {
            0 => Err(LisnError::Other("no scripted artifact".to_string())),
            1 => Ok(queue.front().cloned().expect("front exists")),
            _ => Ok(queue.pop_front().expect("front exists")),
        }
    }

    async fn artifact_file(&self, _id: i64) -> Result<FileUrlResponse> {
        self.file_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self
            .fail_file_fetch
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(LisnError::Server {
                status: 500,
                detail: "file not ready".to_string(),
            });
        }
        let url = self
            .file_url
            .lock()
            .expect("mock lock")
            .clone()
            .ok_or_else(|| LisnError::Other("no scripted file url".to_string()))?;
        Ok(FileUrlResponse { success: true, url })
    }

    async fn progress_stream(&self, _id: i64) -> Result<ByteStream> {
        self.stream_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let chunks = self.stream_chunks.lock().expect("mock lock").clone();
        let mut items: Vec<Result<Vec<u8>>> = chunks.into_iter().map(Ok).collect();
        if self
            .stream_tail_error
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            items.push(Err(LisnError::Network {
                message: "connection reset".to_string(),
            }));
        }
        let scripted = futures_util::stream::iter(items);
        if self.stream_hangs.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(Box::pin(scripted.chain(futures_util::stream::pending())))
        } else {
            Ok(Box::pin(scripted))
        }
    }
}
