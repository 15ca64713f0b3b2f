use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::{
    ContentPart, Credentials, FinishReason, GatewayConfig, Message, Request, Response, Role,
    ToolCallResult, ToolChoice, Usage,
};
use relaykey_types::RelaykeyError;

pub const API_KEY_HEADER: &str = "x-portkey-api-key";
pub const VIRTUAL_KEY_HEADER: &str = "x-portkey-virtual-key";
pub const TRACE_ID_HEADER: &str = "x-portkey-trace-id";

// ---------------------------------------------------------------------------
// CompletionBackend
// ---------------------------------------------------------------------------

/// Executes one chat-completion call against the gateway on behalf of a provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        credentials: &Credentials,
        request: &Request,
    ) -> Result<Response, RelaykeyError>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// HttpGateway
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RelaykeyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelaykeyError::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, RelaykeyError> {
        Self::new(config.base_url(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Builds the chat-completions body the gateway forwards to the provider.
pub fn build_request_body(request: &Request) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = request.messages.iter().map(convert_message).collect();

    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });

    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }

    if !request.tools.is_empty() {
        let tools: Vec<serde_json::Value> = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }

    if let Some(ref choice) = request.tool_choice {
        body["tool_choice"] = match choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::None => json!("none"),
            ToolChoice::Required => json!("required"),
            ToolChoice::Specific(name) => json!({
                "type": "function",
                "function": { "name": name }
            }),
        };
    }

    body
}

/// Decodes a chat-completions response body.
pub fn parse_response(provider: &str, body: serde_json::Value) -> Result<Response, RelaykeyError> {
    let choice = body["choices"]
        .as_array()
        .and_then(|choices| choices.first())
        .ok_or_else(|| RelaykeyError::InvalidResponse {
            provider: provider.to_string(),
            message: "response has no choices".into(),
        })?;

    let message = &choice["message"];
    let text = message["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let function = &call["function"];
            // Arguments arrive as a JSON-encoded string; keep the raw text if it
            // does not parse.
            let arguments = match &function["arguments"] {
                serde_json::Value::String(raw) => serde_json::from_str(raw)
                    .unwrap_or_else(|_| serde_json::Value::String(raw.clone())),
                serde_json::Value::Null => json!({}),
                other => other.clone(),
            };
            tool_calls.push(ToolCallResult {
                id: call["id"].as_str().unwrap_or("").to_string(),
                name: function["name"].as_str().unwrap_or("").to_string(),
                arguments,
            });
        }
    }

    let mut finish_reason = FinishReason::from_wire(choice["finish_reason"].as_str());
    if !tool_calls.is_empty() && finish_reason == FinishReason::EndTurn {
        finish_reason = FinishReason::ToolUse;
    }

    let usage_obj = &body["usage"];
    let input_tokens = usage_obj["prompt_tokens"].as_u64().unwrap_or(0);
    let output_tokens = usage_obj["completion_tokens"].as_u64().unwrap_or(0);
    let usage = Usage {
        input_tokens,
        output_tokens,
        total_tokens: usage_obj["total_tokens"]
            .as_u64()
            .unwrap_or(input_tokens + output_tokens),
    };

    Ok(Response {
        id: body["id"].as_str().unwrap_or("").to_string(),
        text,
        tool_calls,
        usage,
        model: body["model"].as_str().unwrap_or("").to_string(),
        finish_reason,
    })
}

// ---------------------------------------------------------------------------
// Message conversion helpers
// ---------------------------------------------------------------------------

fn convert_message(msg: &Message) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    // Plain-text messages go out as a string; anything with an image keeps
    // the parts array.
    let content = if msg.is_text_only() {
        json!(msg.text_content())
    } else {
        let parts: Vec<serde_json::Value> = msg
            .content
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                ContentPart::ImageUrl { image_url } => json!({
                    "type": "image_url",
                    "image_url": { "url": image_url.url }
                }),
            })
            .collect();
        json!(parts)
    };

    let mut value = json!({
        "role": role,
        "content": content,
    });
    if let Some(ref id) = msg.tool_call_id {
        value["tool_call_id"] = json!(id);
    }
    value
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(
    provider: &str,
    status: reqwest::StatusCode,
    retry_after: Option<&str>,
    body: &str,
) -> RelaykeyError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = retry_after
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            RelaykeyError::RateLimited {
                provider: provider.into(),
                retry_after_ms: retry_ms,
            }
        }
        401 | 403 => RelaykeyError::AuthError {
            provider: provider.into(),
        },
        500..=599 => RelaykeyError::ProviderError {
            provider: provider.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => RelaykeyError::ProviderError {
            provider: provider.into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["message"].as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

fn map_transport_error(provider: &str, timeout: Duration, e: reqwest::Error) -> RelaykeyError {
    if e.is_timeout() {
        RelaykeyError::RequestTimeout {
            provider: provider.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        RelaykeyError::ProviderError {
            provider: provider.into(),
            status: 0,
            message: e.to_string(),
            retryable: true,
        }
    }
}

// ---------------------------------------------------------------------------
// CompletionBackend implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CompletionBackend for HttpGateway {
    async fn complete(
        &self,
        credentials: &Credentials,
        request: &Request,
    ) -> Result<Response, RelaykeyError> {
        let provider = credentials.provider.as_str();
        let body = build_request_body(request);
        let trace_id = uuid::Uuid::new_v4().to_string();

        tracing::debug!(
            provider,
            model = %request.model,
            trace_id = %trace_id,
            url = %self.endpoint(),
            "Sending gateway request"
        );

        let resp = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &credentials.api_key)
            .header(VIRTUAL_KEY_HEADER, &credentials.virtual_key)
            .header(TRACE_ID_HEADER, &trace_id)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(provider, self.timeout, e))?;

        let status = resp.status();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let response_body = resp
            .text()
            .await
            .map_err(|e| map_transport_error(provider, self.timeout, e))?;

        if !status.is_success() {
            return Err(map_error(
                provider,
                status,
                retry_after.as_deref(),
                &response_body,
            ));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| RelaykeyError::InvalidResponse {
                provider: provider.into(),
                message: format!("Failed to parse response JSON: {e}"),
            })?;

        parse_response(provider, json)
    }

    fn name(&self) -> &str {
        "portkey"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
