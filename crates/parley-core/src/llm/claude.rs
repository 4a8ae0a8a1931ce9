use crate::constants::{defaults, endpoints, models};
use crate::error::{ProviderError, Result};
use crate::llm::sse::SseBuffer;
use crate::llm::traits::*;
use futures::channel::mpsc;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub struct ClaudeClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl ClaudeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: models::DEFAULT_ANTHROPIC_MODEL.to_string(),
            base_url: endpoints::ANTHROPIC_BASE_URL.to_string(),
            max_tokens: defaults::MAX_TOKENS,
            temperature: defaults::TEMPERATURE,
            timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    fn build_request_body(&self, messages: &[Message], stream: bool) -> Value {
        // Anthropic takes system text as a top-level field, not a message.
        let system_prompt: String = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let conv_messages: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": conv_messages,
        });

        if !system_prompt.is_empty() {
            body["system"] = Value::String(system_prompt);
        }

        if stream {
            body["stream"] = Value::Bool(true);
        }

        body
    }

    async fn post(&self, body: &Value, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/messages", self.base_url);
        tracing::debug!(model = %self.model, stream, "anthropic request");

        let mut request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", endpoints::ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body);
        if !stream {
            request = request.timeout(self.timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("Anthropic", status.as_u16(), &text).into());
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct ClaudeApiResponse {
    content: Vec<ClaudeContent>,
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Outcome of one Anthropic stream event.
#[derive(Debug, PartialEq)]
enum ClaudeChunk {
    Text(String),
    Stop,
    Skip,
}

fn parse_stream_event(data: &str) -> std::result::Result<ClaudeChunk, ProviderError> {
    let event: Value = serde_json::from_str(data)
        .map_err(|e| ProviderError::MalformedResponse(format!("bad stream event: {e}")))?;

    match event.get("type").and_then(|t| t.as_str()) {
        Some("content_block_delta") => {
            let text = event
                .get("delta")
                .filter(|d| d.get("type").and_then(|t| t.as_str()) == Some("text_delta"))
                .and_then(|d| d.get("text"))
                .and_then(|t| t.as_str());
            Ok(match text {
                Some(t) if !t.is_empty() => ClaudeChunk::Text(t.to_string()),
                _ => ClaudeChunk::Skip,
            })
        }
        Some("message_stop") => Ok(ClaudeChunk::Stop),
        Some("error") => {
            let err = event.get("error");
            let kind = err
                .and_then(|e| e.get("type"))
                .and_then(|t| t.as_str())
                .unwrap_or("");
            let message = err
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("stream error")
                .to_string();
            Err(match kind {
                "rate_limit_error" => ProviderError::RateLimit(message),
                "authentication_error" | "permission_error" => {
                    ProviderError::Authentication(message)
                }
                "not_found_error" => ProviderError::ModelUnavailable(message),
                _ => ProviderError::Network(message),
            })
        }
        _ => Ok(ClaudeChunk::Skip),
    }
}

#[async_trait::async_trait]
impl LlmClient for ClaudeClient {
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse> {
        let request_body = self.build_request_body(messages, false);
        let response = self.post(&request_body, false).await?;
        let response_text = response.text().await?;

        let api_response: ClaudeApiResponse = serde_json::from_str(&response_text).map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse response: {e}"))
        })?;

        let content: String = api_response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect();

        Ok(LlmResponse {
            message: Message::assistant(content),
            usage: api_response.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        })
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<mpsc::UnboundedReceiver<StreamEvent>> {
        let request_body = self.build_request_body(messages, true);
        let response = self.post(&request_body, true).await?;

        let (tx, rx) = mpsc::unbounded();

        let mut stream = response.bytes_stream();
        tokio::spawn(async move {
            use futures::StreamExt;
            let mut sse = SseBuffer::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.unbounded_send(StreamEvent::Error(ProviderError::Network(
                            e.to_string(),
                        )));
                        return;
                    }
                };

                for data in sse.push(&chunk) {
                    match parse_stream_event(&data) {
                        Ok(ClaudeChunk::Text(text)) => {
                            let _ = tx.unbounded_send(StreamEvent::TextDelta(text));
                        }
                        Ok(ClaudeChunk::Stop) => {
                            let _ = tx.unbounded_send(StreamEvent::Done);
                            return;
                        }
                        Ok(ClaudeChunk::Skip) => {}
                        Err(e) => {
                            let _ = tx.unbounded_send(StreamEvent::Error(e));
                            return;
                        }
                    }
                }
            }

            tracing::warn!("Anthropic stream closed without a terminator");
            let _ = tx.unbounded_send(StreamEvent::Error(ProviderError::stream_truncated(
                "Anthropic",
            )));
        });

        Ok(rx)
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_messages_lifted_out() {
        let client = ClaudeClient::new("sk-ant-test");
        let messages = vec![
            Message::system("rule one"),
            Message::system("rule two"),
            Message::user("hello"),
            Message::assistant("hi"),
        ];
        let body = client.build_request_body(&messages, false);

        assert_eq!(body["system"], "rule one\n\nrule two");
        let conv = body["messages"].as_array().unwrap();
        assert_eq!(conv.len(), 2);
        assert_eq!(conv[0]["role"], "user");
        assert_eq!(conv[1]["role"], "assistant");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_no_system_field_without_system_messages() {
        let client = ClaudeClient::new("k");
        let body = client.build_request_body(&[Message::user("x")], true);
        assert!(body.get("system").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_parse_stream_event() {
        let delta = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
        assert_eq!(parse_stream_event(delta).unwrap(), ClaudeChunk::Text("Hi".into()));
        assert_eq!(
            parse_stream_event(r#"{"type":"message_stop"}"#).unwrap(),
            ClaudeChunk::Stop
        );
        assert_eq!(
            parse_stream_event(r#"{"type":"ping"}"#).unwrap(),
            ClaudeChunk::Skip
        );

        let overloaded = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow"}}"#;
        assert_eq!(
            parse_stream_event(overloaded),
            Err(ProviderError::RateLimit("slow".into()))
        );
    }
}
