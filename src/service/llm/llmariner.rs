//! Streaming chat completions against the LLMariner API.
//!
//! The API is OpenAI compatible: a `POST /chat/completions` with `stream: true`
//! answers with server-sent events, one `data: {chunk}` line per delta and a
//! final `data: [DONE]`.

use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument};

use crate::base::{
    config::Config,
    types::{Res, Void},
};

use super::{FragmentStream, GenericLlmClient, LlmClient};

/// Prefix of a payload line in the event stream.
const DATA_PREFIX: &str = "data: ";

/// Payload (everything after `data:`) that marks the end of the stream.
const DONE_SENTINEL: &str = " [DONE]";

// Extra methods on `LlmClient` applied by the llmariner implementation.

impl LlmClient {
    pub fn llmariner(config: &Config, api_key: &str) -> Self {
        let client = LlmarinerClient::new(config, api_key);
        Self { inner: Arc::new(client) }
    }
}

// Wire types.

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionMessage>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ChatCompletionMessage {
    pub content: String,
    pub role: String,
}

/// One streamed chunk. Everything but the deltas is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChunkChoice>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatCompletionChunkChoice {
    #[serde(default)]
    pub delta: ChatCompletionDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatCompletionDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionRequest {
    /// A streaming request with a single user message.
    pub fn streaming(model: &str, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatCompletionMessage {
                content: prompt.to_string(),
                role: "user".to_string(),
            }],
            stream: true,
        }
    }
}

// Specific implementations.

/// LLMariner client implementation.
#[derive(Clone)]
pub struct LlmarinerClient {
    http: reqwest::Client,
    endpoint: String,
    model_id: String,
    api_key: String,
}

impl LlmarinerClient {
    /// Create a new LLMariner client.
    pub fn new(config: &Config, api_key: &str) -> Self {
        let endpoint = format!("{}/chat/completions", config.llmariner_base_url.trim_end_matches('/'));

        Self {
            http: reqwest::Client::new(),
            endpoint,
            model_id: config.model_id.clone(),
            api_key: api_key.to_string(),
        }
    }

    /// Send the request and forward every delta into `tx`; `tx` is dropped on return.
    #[instrument(name = "LlmarinerClient::stream_chat_completion", skip_all, fields(model = %self.model_id))]
    async fn stream_chat_completion(&self, prompt: &str, tx: mpsc::Sender<String>) -> Void {
        let request = ChatCompletionRequest::streaming(&self.model_id, prompt);

        info!("Sending a chat completion request ...");
        debug!("Prompt: {prompt}");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .context("send request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body);
            return Err(anyhow!("unexpected status code: {status} (message: {message:?})"));
        }

        info!("Receiving chat completions ...");

        forward_fragments(response.bytes_stream(), &tx).await
    }
}

#[async_trait]
impl GenericLlmClient for LlmarinerClient {
    #[instrument(name = "LlmarinerClient::create_chat_completion", skip_all)]
    async fn create_chat_completion(&self, prompt: &str) -> Res<FragmentStream> {
        // A single slot: the producer waits for the consumer on every fragment.
        let (tx, rx) = mpsc::channel(1);

        let client = self.clone();
        let prompt = prompt.to_string();

        let producer = tokio::spawn(
            async move {
                let result = client.stream_chat_completion(&prompt, tx).await;

                if let Err(err) = &result {
                    error!("Failed to create chat completion: {err:#}");
                }

                result
            }
            .in_current_span(),
        );

        Ok(FragmentStream::new(rx, producer))
    }
}

// Event stream decoding.

/// What a single line of the event stream means.
#[derive(Debug)]
pub enum SseLine {
    /// Not a payload line.
    Skip,
    /// The end-of-stream sentinel.
    Done,
    /// A decoded chunk.
    Chunk(ChatCompletionChunk),
}

/// Classify and decode one line (without its line terminator).
pub fn parse_sse_line(line: &str) -> Res<SseLine> {
    if !line.starts_with(DATA_PREFIX) {
        return Ok(SseLine::Skip);
    }

    // Keep the space after the colon; the sentinel is matched with it.
    let payload = &line["data:".len()..];
    if payload == DONE_SENTINEL {
        return Ok(SseLine::Done);
    }

    let chunk = serde_json::from_str(payload).context("unmarshal response")?;

    Ok(SseLine::Chunk(chunk))
}

/// Read a byte stream line by line and send the first choice's delta of every chunk.
///
/// Returns once the sentinel is seen, the body ends, or the receiver is gone.
pub async fn forward_fragments<S, B, E>(body: S, tx: &mpsc::Sender<String>) -> Void
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut body = std::pin::pin!(body);
    let mut buffer: Vec<u8> = Vec::new();
    // Bytes before this offset are known to hold no newline.
    let mut scanned = 0;

    while let Some(bytes) = body.next().await {
        buffer.extend_from_slice(bytes.context("read response body")?.as_ref());

        while let Some(offset) = buffer[scanned..].iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=scanned + offset).collect();
            scanned = 0;

            if !handle_line(&line, tx).await? {
                return Ok(());
            }
        }

        scanned = buffer.len();
    }

    // The last line may come without a terminator.
    if !buffer.is_empty() {
        handle_line(&buffer, tx).await?;
    }

    Ok(())
}

/// Returns `false` when the caller should stop reading.
async fn handle_line(raw: &[u8], tx: &mpsc::Sender<String>) -> Res<bool> {
    let line = std::str::from_utf8(raw).context("decode response line")?;
    let line = line.trim_end_matches(['\r', '\n']);

    match parse_sse_line(line)? {
        SseLine::Skip => Ok(true),
        SseLine::Done => Ok(false),
        SseLine::Chunk(chunk) => {
            // Only the first choice is relayed.
            let Some(choice) = chunk.choices.into_iter().next() else {
                return Ok(true);
            };

            let content = choice.delta.content.unwrap_or_default();

            // A closed receiver means nobody is reading any more.
            Ok(tx.send(content).await.is_ok())
        }
    }
}

// Error bodies.

#[derive(Deserialize, Default)]
#[serde(default)]
struct ErrorBody {
    /// gRPC gateway style.
    message: String,
    /// Ollama / OpenAI style.
    error: NestedErrorBody,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct NestedErrorBody {
    message: String,
}

/// Pull a readable message out of an error response body.
///
/// Prefers `error.message`, then `message`; a body that is not JSON is returned as is.
pub fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
        Ok(parsed) => parsed.message,
        Err(_) => body.to_string(),
    }
}

// Tests.
