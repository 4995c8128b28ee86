//! OpenRouter chat-completions client.
//!
//! The session only needs "a stream of text chunks, or a terminal failure":
//! [`OpenRouterClient::stream_chat`] forwards each content delta to a callback
//! and returns the full response once the stream completes.
//!
//! # Error Handling
//!
//! Every failure is terminal and surfaces as a [`ProviderError`]. Chunks that
//! were already forwarded stay with the caller; the partial text is not
//! returned.

pub mod retry;

use std::sync::OnceLock;
use std::time::Duration;

use futures_util::StreamExt;
use procoder_types::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical OpenRouter API base URL.
pub const OPENROUTER_API_BASE_URL: &str = "https://openrouter.ai/api/v1";

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
const TCP_KEEPALIVE_SECS: u64 = 60;
const MAX_SSE_BUFFER_BYTES: usize = 4 * 1024 * 1024;
const MAX_SSE_PARSE_ERRORS: usize = 3;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no OpenRouter API key configured (set OPENROUTER_API_KEY)")]
    MissingApiKey,
    #[error("request failed after {attempts} attempt(s): {source}")]
    Connection {
        attempts: u32,
        source: reqwest::Error,
    },
    #[error("API error {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("stream read failed: {0}")]
    Stream(#[source] reqwest::Error),
    #[error("stream idle for more than {}s", .0.as_secs())]
    IdleTimeout(Duration),
    #[error("SSE buffer exceeded maximum size (4 MiB)")]
    BufferOverflow,
    #[error("received invalid UTF-8 from SSE stream")]
    InvalidUtf8,
    #[error("invalid stream payload: {0}")]
    InvalidPayload(String),
    #[error("model error: {0}")]
    Api(String),
    #[error("connection closed before stream completed")]
    Closed,
}

impl ProviderError {
    /// Short operator-facing hint for common failures.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingApiKey => Some("Add `openrouter_key` under [api] in ~/.procoder/config.toml."),
            Self::Http { status, .. } if status.as_u16() == 401 => {
                Some("Authentication failed. Check your OPENROUTER_API_KEY.")
            }
            Self::Http { status, .. } if status.as_u16() == 400 => {
                Some("Bad request. The model name is often the culprit.")
            }
            Self::Http { status, .. } if status.as_u16() == 429 => {
                Some("Rate limit exceeded. Wait a moment and retry.")
            }
            _ => None,
        }
    }
}

/// Shared HTTP client for production use.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build configured HTTP client: {e}. Using defaults.");
                reqwest::Client::new()
            })
    })
}

#[derive(Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    site_url: Option<String>,
    site_name: Option<String>,
    retry: retry::RetryConfig,
    idle_timeout: Duration,
}

// Manual Debug impl to prevent leaking the API key in logs.
impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ChunkError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<ChunkDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkError {
    message: Option<String>,
}

impl OpenRouterClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ProviderError::MissingApiKey)?;
        Ok(Self {
            http: http_client().clone(),
            base_url: OPENROUTER_API_BASE_URL.to_string(),
            api_key,
            model: model.into(),
            site_url: None,
            site_name: None,
            retry: retry::RetryConfig::default(),
            idle_timeout: Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
        })
    }

    /// Optional attribution headers (`HTTP-Referer`, `X-Title`).
    #[must_use]
    pub fn with_site(mut self, url: Option<String>, name: Option<String>) -> Self {
        self.site_url = url;
        self.site_name = name;
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: retry::RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Stream a chat completion, forwarding each content delta to `on_chunk`.
    ///
    /// Returns the concatenated response text.
    pub async fn stream_chat(
        &self,
        messages: &[Message],
        mut on_chunk: impl FnMut(&str),
    ) -> Result<String, ProviderError> {
        let url = format!("{}{CHAT_COMPLETIONS_PATH}", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };
        tracing::info!(model = %self.model, messages = messages.len(), "Sending chat request");

        let build = || {
            let mut request = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .header(reqwest::header::ACCEPT, "text/event-stream")
                .json(&body);
            if let Some(site_url) = &self.site_url {
                request = request.header("HTTP-Referer", site_url);
            }
            if let Some(site_name) = &self.site_name {
                request = request.header("X-Title", site_name);
            }
            request
        };

        let response = match retry::send_with_retry(build, &self.retry).await {
            retry::RetryOutcome::Success(response) => response,
            retry::RetryOutcome::HttpError(response) => {
                let status = response.status();
                let body = read_capped_error_body(response).await;
                return Err(ProviderError::Http { status, body });
            }
            retry::RetryOutcome::ConnectionError { attempts, source } => {
                return Err(ProviderError::Connection { attempts, source });
            }
        };

        let text = process_sse_stream(response, self.idle_timeout, &mut on_chunk).await?;
        tracing::info!(bytes = text.len(), "Chat response complete");
        Ok(text)
    }
}

/// Position and length of the first blank-line event delimiter.
fn find_sse_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn drain_next_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_sse_event_boundary(buffer)?;
    let event: Vec<u8> = buffer.drain(..pos + delim_len).take(pos).collect();
    Some(event)
}

/// Join the `data:` lines of one event. Comment-only events yield `None`.
fn extract_sse_data(event: &str) -> Option<String> {
    let lines: Vec<&str> = event
        .lines()
        .filter_map(|line| line.trim_end_matches('\r').strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

enum ChunkAction {
    Continue,
    Finished,
    /// The provider reported an error inside the stream.
    Failed(String),
}

fn apply_chunk(
    data: &str,
    out: &mut String,
    on_chunk: &mut impl FnMut(&str),
) -> Result<ChunkAction, serde_json::Error> {
    let chunk: ChatChunk = serde_json::from_str(data)?;
    if let Some(err) = chunk.error {
        let message = err.message.unwrap_or_else(|| "unknown error".to_string());
        return Ok(ChunkAction::Failed(message));
    }
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(ChunkAction::Continue);
    };
    if let Some(content) = choice.delta.and_then(|d| d.content)
        && !content.is_empty()
    {
        on_chunk(&content);
        out.push_str(&content);
    }
    Ok(if choice.finish_reason.is_some() {
        ChunkAction::Finished
    } else {
        ChunkAction::Continue
    })
}

/// Consume an SSE body until `[DONE]`.
///
/// Enforces the idle timeout and buffer cap, and gives up after a run of
/// unparseable payloads. EOF without `[DONE]` is accepted only after a
/// `finish_reason` was seen.
async fn process_sse_stream(
    response: reqwest::Response,
    idle_timeout: Duration,
    on_chunk: &mut impl FnMut(&str),
) -> Result<String, ProviderError> {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut out = String::new();
    let mut parse_errors = 0usize;
    let mut finished = false;

    loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, stream.next()).await else {
            return Err(ProviderError::IdleTimeout(idle_timeout));
        };
        let Some(chunk) = next else { break };
        buffer.extend_from_slice(&chunk.map_err(ProviderError::Stream)?);

        if buffer.len() > MAX_SSE_BUFFER_BYTES {
            return Err(ProviderError::BufferOverflow);
        }

        while let Some(event) = drain_next_sse_event(&mut buffer) {
            if event.is_empty() {
                continue;
            }
            let event = std::str::from_utf8(&event).map_err(|_| ProviderError::InvalidUtf8)?;
            let Some(data) = extract_sse_data(event) else {
                continue;
            };
            if data.trim() == "[DONE]" {
                return Ok(out);
            }

            match apply_chunk(&data, &mut out, on_chunk) {
                Ok(ChunkAction::Continue) => parse_errors = 0,
                Ok(ChunkAction::Finished) => {
                    parse_errors = 0;
                    finished = true;
                }
                Ok(ChunkAction::Failed(message)) => return Err(ProviderError::Api(message)),
                Err(e) => {
                    parse_errors += 1;
                    tracing::warn!(%e, payload_bytes = data.len(), "Invalid SSE JSON payload");
                    if parse_errors >= MAX_SSE_PARSE_ERRORS {
                        return Err(ProviderError::InvalidPayload(e.to_string()));
                    }
                }
            }
        }
    }

    if finished {
        Ok(out)
    } else {
        Err(ProviderError::Closed)
    }
}

async fn read_capped_error_body(response: reqwest::Response) -> String {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(Ok(chunk)) = stream.next().await {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            return format!("{}...(truncated)", String::from_utf8_lossy(&body));
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
