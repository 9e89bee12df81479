//! HTTP client for the supported decision backends.
//!
//! One client type covers all three vendors; the provider kind selects the
//! request shape and the tool-call extraction. Network and server failures
//! are classified into transient (retryable by the adapter) and fatal
//! (terminates the session).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use super::request::{build_prompt, tool_definitions, DecisionRequest, SYSTEM_PROMPT};
use crate::command::Button;
use crate::config::{ProviderConfig, ProviderKind};

/// Backend failure modes, per the session error taxonomy.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Network timeout, rate limit, server error. Retried with bounded
    /// backoff; after the ceiling the fallback command is used.
    #[error("transient provider failure: {0}")]
    Transient(String),
    /// Invalid credentials, malformed configuration. Surfaced
    /// immediately; the session terminates.
    #[error("fatal provider failure: {0}")]
    Fatal(String),
}

/// Raw extraction from one backend reply, before fallback handling.
#[derive(Debug, Clone, Default)]
pub struct RawDecision {
    pub button: Option<Button>,
    pub notepad: Option<String>,
    pub text: String,
}

/// Client for one configured backend. Fixed for the session's lifetime.
#[derive(Debug)]
pub struct ProviderClient {
    kind: ProviderKind,
    config: ProviderConfig,
    http: Client,
    tools: Value,
}

impl ProviderClient {
    pub fn new(kind: ProviderKind, config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Fatal(format!(
                "no API key configured for provider {kind}"
            )));
        }
        if config.model_name.is_empty() {
            return Err(ProviderError::Fatal(format!(
                "no model name configured for provider {kind}"
            )));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            kind,
            tools: tool_definitions(kind),
            config,
            http,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// One round trip to the backend: build the vendor request, post it,
    /// extract tool calls and free text from the reply.
    pub async fn request_once(
        &self,
        request: &DecisionRequest,
    ) -> Result<RawDecision, ProviderError> {
        let prompt = build_prompt(request);
        let image = &request.screenshot.base64_data;

        let (url, builder) = match self.kind {
            ProviderKind::Anthropic => {
                let url = format!("{}/v1/messages", self.base_url("https://api.anthropic.com"));
                let body = json!({
                    "model": self.config.model_name,
                    "max_tokens": self.config.max_tokens,
                    "system": SYSTEM_PROMPT,
                    "tools": self.tools,
                    "messages": [{
                        "role": "user",
                        "content": [
                            { "type": "text", "text": prompt },
                            {
                                "type": "image",
                                "source": {
                                    "type": "base64",
                                    "media_type": "image/png",
                                    "data": image
                                }
                            }
                        ]
                    }]
                });
                let builder = self
                    .http
                    .post(&url)
                    .header("x-api-key", &self.config.api_key)
                    .header("anthropic-version", "2023-06-01")
                    .json(&body);
                (url, builder)
            }
            ProviderKind::OpenAi => {
                let url = format!(
                    "{}/chat/completions",
                    self.base_url("https://api.openai.com/v1")
                );
                let body = json!({
                    "model": self.config.model_name,
                    "max_tokens": self.config.max_tokens,
                    "tools": self.tools,
                    "tool_choice": "auto",
                    "messages": [
                        { "role": "system", "content": SYSTEM_PROMPT },
                        {
                            "role": "user",
                            "content": [
                                { "type": "text", "text": prompt },
                                {
                                    "type": "image_url",
                                    "image_url": {
                                        "url": format!("data:image/png;base64,{image}")
                                    }
                                }
                            ]
                        }
                    ]
                });
                let builder = self.http.post(&url).bearer_auth(&self.config.api_key).json(&body);
                (url, builder)
            }
            ProviderKind::Google => {
                let url = format!(
                    "{}/models/{}:generateContent?key={}",
                    self.base_url("https://generativelanguage.googleapis.com/v1beta"),
                    self.config.model_name,
                    self.config.api_key
                );
                let body = json!({
                    "system_instruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
                    "tools": self.tools,
                    "generationConfig": { "maxOutputTokens": self.config.max_tokens },
                    "contents": [{
                        "role": "user",
                        "parts": [
                            { "text": prompt },
                            { "inline_data": { "mime_type": "image/png", "data": image } }
                        ]
                    }]
                });
                let builder = self.http.post(&url).json(&body);
                (url, builder)
            }
        };

        tracing::debug!(provider = %self.kind, %url, "requesting decision");

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(format!("unreadable response body: {e}")))?;

        Ok(extract_decision(self.kind, &body))
    }

    fn base_url(&self, default: &str) -> String {
        self.config
            .base_url
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ProviderError {
    // Builder misuse would be fatal, but everything observable here
    // (connect, timeout, body) is a network condition.
    ProviderError::Transient(err.to_string())
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let detail = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Fatal(detail),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::Fatal(detail)
        }
        _ => ProviderError::Transient(detail),
    }
}

/// Pull tool calls and free text out of a backend reply body.
pub(crate) fn extract_decision(kind: ProviderKind, body: &Value) -> RawDecision {
    let mut decision = RawDecision::default();
    let mut texts: Vec<String> = Vec::new();

    match kind {
        ProviderKind::Anthropic => {
            for item in body["content"].as_array().into_iter().flatten() {
                match item["type"].as_str() {
                    Some("text") => {
                        if let Some(t) = item["text"].as_str() {
                            texts.push(t.to_string());
                        }
                    }
                    Some("tool_use") => apply_tool_call(
                        &mut decision,
                        item["name"].as_str().unwrap_or_default(),
                        &item["input"],
                    ),
                    _ => {}
                }
            }
        }
        ProviderKind::OpenAi => {
            let message = &body["choices"][0]["message"];
            if let Some(t) = message["content"].as_str() {
                texts.push(t.to_string());
            }
            for call in message["tool_calls"].as_array().into_iter().flatten() {
                let function = &call["function"];
                // OpenAI ships arguments as a JSON-encoded string.
                let args: Value = function["arguments"]
                    .as_str()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or(Value::Null);
                apply_tool_call(
                    &mut decision,
                    function["name"].as_str().unwrap_or_default(),
                    &args,
                );
            }
        }
        ProviderKind::Google => {
            for candidate in body["candidates"].as_array().into_iter().flatten() {
                for part in candidate["content"]["parts"].as_array().into_iter().flatten() {
                    if let Some(t) = part["text"].as_str() {
                        texts.push(t.to_string());
                    }
                    let call = &part["functionCall"];
                    if call.is_object() {
                        apply_tool_call(
                            &mut decision,
                            call["name"].as_str().unwrap_or_default(),
                            &call["args"],
                        );
                    }
                }
            }
        }
    }

    decision.text = texts.join("\n");
    decision
}

fn apply_tool_call(decision: &mut RawDecision, name: &str, args: &Value) {
    match name {
        "press_button" => {
            // Keep the first recognizable button; later calls are ignored.
            if decision.button.is_none() {
                decision.button = args["button"].as_str().and_then(Button::from_name);
            }
        }
        "update_notepad" => {
            if let Some(content) = args["content"].as_str() {
                if !content.is_empty() {
                    decision.notepad = Some(content.to_string());
                }
            }
        }
        other => tracing::debug!(tool = other, "ignoring unknown tool call"),
    }
}
