use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use tracing::debug;

use crate::error::Error;

/// The default API endpoint base URL.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// The default model to send prompts to.
pub const DEFAULT_MODEL_ID: &str = "gemini-1.5-flash";

/// A lazy, finite sequence of generated text fragments. It can only be consumed once.
pub type FragmentStream = BoxStream<'static, Result<String, Error>>;

/// Anything that can turn a prompt into a stream of generated text.
#[async_trait]
pub trait ResponseStreamer: Send + Sync {
    async fn stream_response(&self, prompt: &str, api_key: &str) -> Result<FragmentStream, Error>;
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,

    // Only present when the prompt itself was rejected
    prompt_feedback: Option<PromptFeedback>,

    // Usually only on the final event of a stream
    usage_metadata: Option<UsageMetadata>,

    model_version: Option<String>,

    // A failure reported inside an otherwise successful stream
    error: Option<ErrorResponse>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,

    // Ex: 'STOP' | 'MAX_TOKENS' | 'SAFETY' | 'RECITATION'
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Clone)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
struct ErrorResponse {
    code: i32,
    message: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
struct ErrorResponseContainer {
    error: ErrorResponse,
}

/// `GeminiClient` talks to the Gemini `streamGenerateContent` endpoint.
///
/// Each request sends a single user turn and asks for server-sent events, which are turned
/// into a [`FragmentStream`] that pulls from the network only as fragments are requested.
pub struct GeminiClient {
    // The API endpoint base URL
    api: String,

    model_id: String,

    client: Client,
}

impl GeminiClient {
    pub fn new(api: impl Into<String>, model_id: impl Into<String>) -> Self {
        GeminiClient {
            api: api.into().trim_end_matches('/').to_string(),
            model_id: model_id.into(),
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.api, self.model_id
        )
    }
}

#[async_trait]
impl ResponseStreamer for GeminiClient {
    /// Posts the prompt and returns the response as a fragment stream.
    ///
    /// # Returns:
    /// - `Ok(FragmentStream)` once the service accepted the request. Errors that happen while
    ///   the body is being streamed are yielded by the stream itself.
    /// - `Err(Error::RemoteService)` if the request could not be sent or the service answered
    ///   with a non-success status.
    async fn stream_response(&self, prompt: &str, api_key: &str) -> Result<FragmentStream, Error> {
        let url = self.endpoint();
        debug!("requesting completion from {}", url);

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
        });

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(api_error(status, &text));
        }

        Ok(fragments(response))
    }
}

/// Builds the error for a non-success response, preferring the service's own message.
fn api_error(status: StatusCode, body: &str) -> Error {
    match serde_json::from_str::<ErrorResponseContainer>(body) {
        Ok(container) => {
            let error = container.error;
            debug!("service error status: {:?}", error.status);
            Error::RemoteService(format!(
                "API request failed with code {}: {}",
                error.code, error.message
            ))
        }
        Err(_) => Error::RemoteService(format!(
            "API request failed with status {}: {}",
            status, body
        )),
    }
}

/// Splits a byte stream into server-sent event lines and hands back their `data:` payloads.
///
/// Bytes are buffered until a full line is available, so multi-byte characters cut in half by
/// the network are decoded once both halves have arrived.
#[derive(Debug, Default)]
struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&String::from_utf8_lossy(&line)) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flushes a final line that was not newline terminated.
    fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&String::from_utf8_lossy(&line))
    }
}

fn data_payload(line: &str) -> Option<String> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        None
    } else {
        Some(payload.to_string())
    }
}

/// Turns one event payload into the text it carries, if any.
fn parse_event(json_str: &str) -> Result<Option<String>, Error> {
    let response: GenerateContentResponse = serde_json::from_str(json_str).map_err(|e| {
        Error::RemoteService(format!(
            "Failed to parse JSON: {}\nRaw JSON: {}",
            e, json_str
        ))
    })?;

    if let Some(error) = response.error {
        debug!("service error status: {:?}", error.status);
        return Err(Error::RemoteService(format!(
            "API request failed with code {}: {}",
            error.code, error.message
        )));
    }

    if let Some(usage) = &response.usage_metadata {
        debug!(
            "usage: prompt={:?} candidates={:?} total={:?} model={:?}",
            usage.prompt_token_count,
            usage.candidates_token_count,
            usage.total_token_count,
            response.model_version
        );
    }

    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(Error::RemoteService(format!(
            "Prompt was blocked: {}",
            reason
        )));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(None);
    };

    let text: String = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    if !text.is_empty() {
        return Ok(Some(text));
    }
    match candidate.finish_reason.as_deref() {
        None | Some("STOP") => Ok(None),
        Some(reason) => Err(Error::RemoteService(format!(
            "Response stopped early: {}",
            reason
        ))),
    }
}

struct FragmentState {
    response: reqwest::Response,
    sse: SseBuffer,
    pending: VecDeque<String>,
    finished: bool,
}

fn fragments(response: reqwest::Response) -> FragmentStream {
    let state = FragmentState {
        response,
        sse: SseBuffer::default(),
        pending: VecDeque::new(),
        finished: false,
    };
    stream::try_unfold(state, next_fragment).boxed()
}

async fn next_fragment(mut state: FragmentState) -> Result<Option<(String, FragmentState)>, Error> {
    loop {
        if let Some(payload) = state.pending.pop_front() {
            if let Some(text) = parse_event(&payload)? {
                return Ok(Some((text, state)));
            }
            continue;
        }

        if state.finished {
            return Ok(None);
        }

        match state.response.chunk().await? {
            Some(chunk) => {
                let payloads = state.sse.push(&chunk);
                state.pending.extend(payloads);
            }
            None => {
                state.finished = true;
                let tail = state.sse.finish();
                state.pending.extend(tail);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_message(result: Result<Option<String>, Error>) -> String {
        match result {
            Err(Error::RemoteService(msg)) => msg,
            other => panic!("expected a remote service error, got {other:?}"),
        }
    }

    #[test]
    fn test_endpoint_uses_model_and_sse() {
        let client = GeminiClient::new("http://localhost:8080/", "gemini-1.5-flash");
        assert_eq!(
            client.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_sse_buffer_handles_split_lines() {
        let mut sse = SseBuffer::default();
        assert!(sse.push(b"data: {\"a\"").is_empty());
        assert_eq!(sse.push(b":1}\r\n\r\ndata: [DONE]\n"), vec!["{\"a\":1}"]);
        assert_eq!(sse.finish(), None);
    }

    #[test]
    fn test_sse_buffer_joins_split_utf8() {
        let mut sse = SseBuffer::default();
        let line = "data: héllo\n".as_bytes();
        // split in the middle of the two byte 'é'
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(sse.push(&line[..split]).is_empty());
        assert_eq!(sse.push(&line[split..]), vec!["héllo"]);
    }

    #[test]
    fn test_sse_buffer_flushes_unterminated_tail() {
        let mut sse = SseBuffer::default();
        assert!(sse.push(b": keep-alive\nevent: message\ndata: tail").is_empty());
        assert_eq!(sse.finish().as_deref(), Some("tail"));
    }

    #[test]
    fn test_parse_event_joins_text_parts() {
        let event = r#"{"candidates":[{"content":{"parts":[{"text":"Hi "},{"text":"there"}],"role":"model"}}],"modelVersion":"gemini-1.5-flash"}"#;
        assert_eq!(parse_event(event).unwrap().as_deref(), Some("Hi there"));
    }

    #[test]
    fn test_parse_event_without_text() {
        let usage_only = r#"{"candidates":[{"content":{"parts":[],"role":"model"},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":5,"totalTokenCount":8}}"#;
        assert_eq!(parse_event(usage_only).unwrap(), None);
        assert_eq!(parse_event("{}").unwrap(), None);
    }

    #[test]
    fn test_parse_event_blocked_prompt() {
        let blocked = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert_eq!(
            remote_message(parse_event(blocked)),
            "Prompt was blocked: SAFETY"
        );
    }

    #[test]
    fn test_parse_event_stopped_without_text() {
        let stopped = r#"{"candidates":[{"finishReason":"RECITATION"}]}"#;
        assert_eq!(
            remote_message(parse_event(stopped)),
            "Response stopped early: RECITATION"
        );
    }

    #[test]
    fn test_parse_event_errors() {
        let mid_stream = r#"{"error":{"code":503,"message":"overloaded","status":"UNAVAILABLE"}}"#;
        assert_eq!(
            remote_message(parse_event(mid_stream)),
            "API request failed with code 503: overloaded"
        );
        assert!(remote_message(parse_event("not json")).starts_with("Failed to parse JSON"));
    }

    #[test]
    fn test_api_error_prefers_service_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        let Error::RemoteService(msg) = api_error(StatusCode::BAD_REQUEST, body) else {
            panic!("expected remote service error");
        };
        assert_eq!(
            msg,
            "API request failed with code 400: API key not valid. Please pass a valid API key."
        );

        let Error::RemoteService(msg) = api_error(StatusCode::BAD_GATEWAY, "upstream down") else {
            panic!("expected remote service error");
        };
        assert_eq!(
            msg,
            "API request failed with status 502 Bad Gateway: upstream down"
        );
    }

    fn sse_response(chunks: Vec<&'static str>) -> reqwest::Response {
        let body = reqwest::Body::wrap_stream(stream::iter(
            chunks.into_iter().map(Ok::<_, std::io::Error>),
        ));
        reqwest::Response::from(http::Response::new(body))
    }

    async fn collect(response: reqwest::Response) -> Vec<Result<String, String>> {
        fragments(response)
            .map(|fragment| fragment.map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_fragments_across_network_chunks() {
        let response = sse_response(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi \"}]}}]}\r\n\r\n: keep",
            "-alive\n\ndata: {\"candidates\":[{\"content\":{\"parts\":[{\"te",
            "xt\":\"there\"}]}}]}\n\ndata: {\"usageMetadata\":{\"totalTokenCount\":4}}",
        ]);
        assert_eq!(
            collect(response).await,
            vec![Ok("Hi ".to_string()), Ok("there".to_string())]
        );
    }

    #[tokio::test]
    async fn test_fragments_flush_unterminated_last_event() {
        let response = sse_response(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"last\"}]}}]}",
        ]);
        assert_eq!(collect(response).await, vec![Ok("last".to_string())]);
    }

    #[tokio::test]
    async fn test_fragments_surface_error_event_after_text() {
        let response = sse_response(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n\n",
            "data: {\"error\":{\"code\":503,\"message\":\"overloaded\"}}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"never\"}]}}]}\n\n",
        ]);
        assert_eq!(
            collect(response).await,
            vec![
                Ok("a".to_string()),
                Err("API request failed with code 503: overloaded".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_fragments_surface_early_stop() {
        let response = sse_response(vec![
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"finishReason\":\"SAFETY\"}]}\n\n",
        ]);
        assert_eq!(
            collect(response).await,
            vec![
                Ok("a".to_string()),
                Err("Response stopped early: SAFETY".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_fragments_of_empty_body() {
        assert!(collect(sse_response(vec![])).await.is_empty());
    }

    // Talks to the real service; run with `API_KEY=... cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn test_live_generation_streams_text() {
        let api_key = std::env::var("API_KEY").expect("API_KEY must be set for the live test");
        let client = GeminiClient::new(DEFAULT_API_BASE, DEFAULT_MODEL_ID);
        let mut fragments = client
            .stream_response("Reply with the single word: pong", &api_key)
            .await
            .unwrap();

        let mut text = String::new();
        while let Some(fragment) = fragments.next().await {
            text.push_str(&fragment.unwrap());
        }
        assert!(!text.trim().is_empty());
    }
}
