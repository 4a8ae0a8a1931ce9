use crate::constants::{defaults, endpoints, models};
use crate::error::{ParleyError, ProviderError, Result};
use crate::llm::sse::SseBuffer;
use crate::llm::traits::*;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl OpenAIClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: models::DEFAULT_OPENAI_MODEL.to_string(),
            base_url: endpoints::OPENAI_BASE_URL.to_string(),
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

    fn build_request_body(&self, messages: &[Message], stream: bool) -> OpenAIRequest {
        let oai_messages = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                })
            })
            .collect();

        OpenAIRequest {
            model: self.model.clone(),
            messages: oai_messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: if stream { Some(true) } else { None },
        }
    }

    async fn post(&self, body: &OpenAIRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(
            model = %self.model,
            messages = body.messages.len(),
            stream = body.stream.unwrap_or(false),
            "openai request"
        );

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body);
        if body.stream.is_none() {
            request = request.timeout(self.timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status("OpenAI", status.as_u16(), &text).into());
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<Value>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Extract the text delta from one streaming chunk, if any.
fn parse_stream_chunk(data: &str) -> std::result::Result<Option<String>, ProviderError> {
    let event: Value = serde_json::from_str(data)
        .map_err(|e| ProviderError::MalformedResponse(format!("bad stream chunk: {e}")))?;

    if let Some(err) = event.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("stream error");
        return Err(ProviderError::Network(message.to_string()));
    }

    Ok(event
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string))
}

#[async_trait::async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(&self, messages: &[Message]) -> Result<LlmResponse> {
        let request_body = self.build_request_body(messages, false);
        let response = self.post(&request_body).await?;
        let response_text = response.text().await?;

        let api_response: OpenAIResponse = serde_json::from_str(&response_text).map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse response: {e}"))
        })?;

        let choice = api_response.choices.first().ok_or_else(|| {
            ParleyError::from(ProviderError::MalformedResponse(
                "No choices in response".into(),
            ))
        })?;

        let content = choice.message.content.clone().unwrap_or_default();

        Ok(LlmResponse {
            message: Message::assistant(content),
            usage: api_response.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }

    async fn chat_stream(&self, messages: &[Message]) -> Result<mpsc::UnboundedReceiver<StreamEvent>> {
        let request_body = self.build_request_body(messages, true);
        let response = self.post(&request_body).await?;

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
                    if data == "[DONE]" {
                        let _ = tx.unbounded_send(StreamEvent::Done);
                        return;
                    }
                    match parse_stream_chunk(&data) {
                        Ok(Some(text)) if !text.is_empty() => {
                            let _ = tx.unbounded_send(StreamEvent::TextDelta(text));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let _ = tx.unbounded_send(StreamEvent::Error(e));
                            return;
                        }
                    }
                }
            }

            tracing::warn!("OpenAI stream closed without a terminator");
            let _ = tx.unbounded_send(StreamEvent::Error(ProviderError::stream_truncated(
                "OpenAI",
            )));
        });

        Ok(rx)
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let client = OpenAIClient::new("sk-test")
            .with_model("gpt-4o-mini")
            .with_max_tokens(256)
            .with_temperature(0.2);
        let messages = vec![Message::system("be brief"), Message::user("hi")];

        let body = serde_json::to_value(client.build_request_body(&messages, false)).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body["messages"][1].get("timestamp").is_none());
        assert!(body.get("stream").is_none());

        let body = serde_json::to_value(client.build_request_body(&messages, true)).unwrap();
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_parse_stream_chunk() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_stream_chunk(data).unwrap(), Some("Hel".to_string()));

        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_stream_chunk(data).unwrap(), None);

        assert!(matches!(
            parse_stream_chunk("not json"),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OpenAIClient::new("k").with_base_url("http://localhost:9/v1/");
        assert_eq!(client.base_url, "http://localhost:9/v1");
    }
}
