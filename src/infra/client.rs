//! Chat-completions client for OpenAI-compatible endpoints (Groq by default).

use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::infra::config::ModelConfig;

/// Token accounting reported by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no API key configured (use --api-key, GROQ_API_KEYS in .env or `apikey`)")]
    MissingKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("API returned no message")]
    EmptyResponse,
}

/// One request string in, one reply out.
pub trait ModelClient {
    fn complete(&self, request: &str) -> Result<Completion, ClientError>;

    /// Model name shown in the status line.
    fn model(&self) -> &str;

    fn has_key(&self) -> bool;

    /// Replace the credentials used for subsequent requests.
    fn set_api_key(&mut self, key: String);
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

pub struct ChatClient {
    http: HttpClient,
    settings: ModelConfig,
    api_key: Option<String>,
}

impl ChatClient {
    /// Starts with the configured key; see [`KeyRing`](crate::infra::keys::KeyRing)
    /// for keys from the environment.
    pub fn new(settings: ModelConfig) -> Result<Self, ClientError> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        let api_key = settings.api_key.clone().filter(|k| !k.trim().is_empty());
        Ok(Self { http, settings, api_key })
    }
}

impl ModelClient for ChatClient {
    #[instrument(skip_all, fields(model = %self.settings.name, chars = request.len()))]
    fn complete(&self, request: &str) -> Result<Completion, ClientError> {
        let key = self.api_key.as_deref().ok_or(ClientError::MissingKey)?;

        let body = ChatRequest {
            model: &self.settings.name,
            messages: [Message { role: "user", content: request }],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .http
            .post(&self.settings.endpoint)
            .bearer_auth(key)
            .json(&body)
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let parsed: ChatResponse = response.json()?;
        debug!(usage = ?parsed.usage, "completion received");
        parse_completion(parsed)
    }

    fn model(&self) -> &str {
        &self.settings.name
    }

    fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key);
    }
}

fn parse_completion(parsed: ChatResponse) -> Result<Completion, ClientError> {
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or(ClientError::EmptyResponse)?;
    Ok(Completion { text, usage: parsed.usage })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = ChatRequest {
            model: "m",
            messages: [Message { role: "user", content: "hi" }],
            temperature: 0.5,
            max_tokens: 16,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["max_tokens"], 16);
    }

    #[test]
    fn parses_reply_and_usage() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": "print(1)"}}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let c = parse_completion(parsed).unwrap();
        assert_eq!(c.text, "print(1)");
        assert_eq!(c.usage.map(|u| u.total_tokens), Some(5));
    }

    #[test]
    fn empty_choices_are_an_error() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(parse_completion(parsed), Err(ClientError::EmptyResponse)));

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(matches!(parse_completion(parsed), Err(ClientError::EmptyResponse)));
    }

    #[test]
    fn missing_key_fails_before_network() {
        let settings = ModelConfig {
            api_key: None,
            endpoint: "http://127.0.0.1:9/unused".into(),
            ..ModelConfig::default()
        };
        let mut client = ChatClient::new(settings).unwrap();
        assert!(!client.has_key());
        assert!(matches!(client.complete("hi"), Err(ClientError::MissingKey)));

        client.set_api_key("k".into());
        assert!(client.has_key());
        assert_eq!(client.model(), "llama-3.3-70b-versatile");
    }
}
