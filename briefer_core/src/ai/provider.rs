//! Model provider clients.
//!
//! Every backend takes a single user prompt and answers with plain text, either
//! as one completion or as a stream of text deltas.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Protocol(String),

    #[error("provider returned no completion")]
    EmptyCompletion,

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

pub type TokenStream = BoxStream<'static, Result<String, LlmError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Backends without incremental output yield the whole completion once.
    async fn stream(&self, prompt: &str) -> Result<TokenStream, LlmError> {
        let text = self.complete(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEndpoint {
    OpenAi { base_url: String, model: String },
    Azure { endpoint: String, deployment: String, api_version: String },
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChunkChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

/// OpenAI chat completions, also served by Azure OpenAI deployments.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: ChatEndpoint,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, endpoint: ChatEndpoint, api_key: String) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }

    fn url(&self) -> String {
        match &self.endpoint {
            ChatEndpoint::OpenAi { base_url, .. } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            ChatEndpoint::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, LlmError> {
        let model = match &self.endpoint {
            ChatEndpoint::OpenAi { model, .. } => Some(model.as_str()),
            ChatEndpoint::Azure { .. } => None,
        };

        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
            stream,
        };

        let request = self.client.post(self.url()).json(&body);
        let request = match &self.endpoint {
            ChatEndpoint::OpenAi { .. } => request.bearer_auth(&self.api_key),
            ChatEndpoint::Azure { .. } => request.header("api-key", &self.api_key),
        };

        let response = request.send().await?;
        ensure_success(response).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        match self.endpoint {
            ChatEndpoint::OpenAi { .. } => "openai",
            ChatEndpoint::Azure { .. } => "azure-openai",
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let completion: ChatCompletion = self.send(prompt, false).await?.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyCompletion)
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream, LlmError> {
        let response = self.send(prompt, true).await?;
        Ok(sse_deltas(response.bytes_stream().boxed()))
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Skip,
    Done,
    Delta(String),
}

/// Interprets one line of a chat-completions event stream.
pub(crate) fn parse_sse_line(line: &str) -> Result<SseEvent, LlmError> {
    let line = line.trim();
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None => return Ok(SseEvent::Skip),
    };

    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::Protocol(format!("bad stream chunk: {}", e)))?;

    match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(content) if !content.is_empty() => Ok(SseEvent::Delta(content)),
        _ => Ok(SseEvent::Skip),
    }
}

struct SseState<S> {
    body: S,
    buffer: Vec<u8>,
    finished: bool,
}

/// Turns a raw server-sent-events body into the text deltas it carries.
pub(crate) fn sse_deltas<S, E>(body: S) -> TokenStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Into<LlmError> + Send + 'static,
{
    let state = SseState {
        body,
        buffer: Vec::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_sse_line(&line) {
                    Ok(SseEvent::Skip) => continue,
                    Ok(SseEvent::Done) => return None,
                    Ok(SseEvent::Delta(text)) => return Some((Ok(text), state)),
                    Err(e) => {
                        state.buffer.clear();
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }

            if state.finished {
                if state.buffer.is_empty() {
                    return None;
                }
                // Trailing line without a newline terminator.
                state.buffer.push(b'\n');
                continue;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(e.into()), state));
                }
                None => {
                    debug!("Event stream closed by provider");
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Amazon Bedrock through the Converse API, authenticated with a Bedrock API
/// key. Output is not streamed incrementally.
pub struct BedrockProvider {
    client: reqwest::Client,
    region: String,
    model_id: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ConverseResponse {
    output: ConverseOutput,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: ConverseMessage,
}

#[derive(Debug, Deserialize)]
struct ConverseMessage {
    content: Vec<ConverseContent>,
}

#[derive(Debug, Deserialize)]
struct ConverseContent {
    text: Option<String>,
}

impl BedrockProvider {
    pub fn new(client: reqwest::Client, region: String, model_id: String, api_key: String) -> Self {
        Self {
            client,
            region,
            model_id,
            api_key,
        }
    }

    fn url(&self) -> Result<reqwest::Url, LlmError> {
        let mut url = reqwest::Url::parse(&format!(
            "https://bedrock-runtime.{}.amazonaws.com",
            self.region
        ))
        .map_err(|e| LlmError::NotConfigured(format!("invalid Bedrock region: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| LlmError::NotConfigured("invalid Bedrock url".to_string()))?
            .pop_if_empty()
            .extend(["model", self.model_id.as_str(), "converse"]);

        Ok(url)
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "messages": [{ "role": "user", "content": [{ "text": prompt }] }],
            "inferenceConfig": { "temperature": 0 },
        });

        let response = self
            .client
            .post(self.url()?)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let response: ConverseResponse = ensure_success(response).await?.json().await?;

        let text: String = response
            .output
            .message
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect();

        if text.is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("").unwrap(), SseEvent::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseEvent::Skip);
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseEvent::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"SEL"}}]}"#).unwrap(),
            SseEvent::Delta("SEL".to_string())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseEvent::Skip
        );
        // Azure sends a prompt-filter chunk without choices first.
        assert_eq!(parse_sse_line(r#"data: {"choices":[]}"#).unwrap(), SseEvent::Skip);
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[tokio::test]
    async fn test_sse_deltas_across_chunk_boundaries() {
        let raw: Vec<Result<Bytes, LlmError>> = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"sql\\\"")),
            Ok(Bytes::from_static(b"\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\": 1}\"}}]}\n")),
            Ok(Bytes::from_static(b"data: [DONE]\n")),
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n")),
        ];

        let deltas: Vec<String> = sse_deltas(stream::iter(raw))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(deltas, vec!["{\"sql\"".to_string(), ": 1}".to_string()]);
    }

    #[tokio::test]
    async fn test_sse_deltas_flushes_unterminated_line() {
        let raw: Vec<Result<Bytes, LlmError>> = vec![Ok(Bytes::from_static(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}",
        ))];

        let deltas: Vec<String> = sse_deltas(stream::iter(raw))
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(deltas, vec!["tail".to_string()]);
    }

    #[test]
    fn test_endpoint_urls() {
        let client = reqwest::Client::new();
        let openai = OpenAiProvider::new(
            client.clone(),
            ChatEndpoint::OpenAi {
                base_url: "https://api.openai.com/v1/".to_string(),
                model: "gpt-4o".to_string(),
            },
            "key".to_string(),
        );
        assert_eq!(openai.url(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(openai.name(), "openai");

        let azure = OpenAiProvider::new(
            client.clone(),
            ChatEndpoint::Azure {
                endpoint: "https://acme.openai.azure.com".to_string(),
                deployment: "gpt4".to_string(),
                api_version: "2024-02-01".to_string(),
            },
            "key".to_string(),
        );
        assert_eq!(
            azure.url(),
            "https://acme.openai.azure.com/openai/deployments/gpt4/chat/completions?api-version=2024-02-01"
        );

        let bedrock = BedrockProvider::new(
            client,
            "us-west-2".to_string(),
            "cohere.command-r-plus-v1:0".to_string(),
            "key".to_string(),
        );
        let url = bedrock.url().unwrap();
        assert_eq!(url.host_str(), Some("bedrock-runtime.us-west-2.amazonaws.com"));
        assert!(url.path().starts_with("/model/cohere.command-r-plus-v1"));
        assert!(url.path().ends_with("/converse"));
    }
}
