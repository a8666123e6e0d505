//! Google Gemini oracle.
//!
//! Talks to the Generative Language `generateContent` endpoint. Calls and
//! results travel as `functionCall` / `functionResponse` parts.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{API_KEY_ENV, OracleConfig};
use crate::error::OracleError;
use crate::message::{FunctionCall, Message, Payload};
use crate::oracle::{Oracle, OracleReply, OracleRequest};

pub struct GeminiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
}

impl GeminiOracle {
    pub fn new(api_key: impl Into<String>, config: &OracleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: config.model.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }

    /// Build from `GEMINI_API_KEY`, if set and non-empty.
    pub fn from_env(config: &OracleConfig) -> Option<Self> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|key| Self::new(key, config))
    }

    fn api_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    /// Build the JSON request body.
    fn build_request_body(&self, request: &OracleRequest) -> Value {
        let contents: Vec<Value> = request.messages.iter().map(to_content).collect();

        let mut body = json!({ "contents": contents });

        if !request.system_instruction.is_empty() {
            body["systemInstruction"] = json!({
                "parts": [{ "text": request.system_instruction }]
            });
        }

        if !request.tools.is_empty() {
            body["tools"] = json!([{ "functionDeclarations": request.tools }]);
        }

        let mut generation = serde_json::Map::new();
        if let Some(temperature) = self.temperature {
            generation.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = self.max_output_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }

        body
    }
}

fn to_content(message: &Message) -> Value {
    let mut parts = Vec::new();
    if !message.content.is_empty() {
        parts.push(json!({ "text": message.content }));
    }

    match &message.payload {
        Some(Payload::Calls(calls)) => {
            for call in calls {
                let args = if call.arguments.is_null() {
                    json!({})
                } else {
                    call.arguments.clone()
                };
                parts.push(json!({ "functionCall": { "name": call.name, "args": args } }));
            }
        }
        Some(Payload::Results(results)) => {
            for result in results {
                parts.push(json!({
                    "functionResponse": { "name": result.name, "response": result.response }
                }));
            }
        }
        None => {}
    }

    if parts.is_empty() {
        parts.push(json!({ "text": "" }));
    }

    json!({ "role": message.role.as_str(), "parts": parts })
}

/// Parse a `generateContent` response.
fn parse_response(json: &Value) -> Result<OracleReply, OracleError> {
    let candidate = json["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = json["promptFeedback"]["blockReason"]
                .as_str()
                .unwrap_or("no candidates");
            OracleError::Parse(format!("response has no candidates ({reason})"))
        })?;

    let parts = candidate["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let mut text = String::new();
    let mut calls = Vec::new();

    for part in &parts {
        if let Some(fc) = part.get("functionCall") {
            let name = fc["name"]
                .as_str()
                .ok_or_else(|| OracleError::Parse("functionCall without name".to_string()))?;
            let args = match fc.get("args") {
                Some(Value::Null) | None => json!({}),
                Some(args) => args.clone(),
            };
            calls.push(FunctionCall::new(name, args));
        } else if let Some(t) = part["text"].as_str() {
            text.push_str(t);
        }
    }

    if !calls.is_empty() {
        return Ok(OracleReply::Calls(calls));
    }

    if text.trim().is_empty() {
        let finish = candidate["finishReason"].as_str().unwrap_or("unknown");
        return Err(OracleError::Parse(format!(
            "response has no text (finishReason: {finish})"
        )));
    }

    Ok(OracleReply::Text(text))
}

#[async_trait]
impl Oracle for GeminiOracle {
    async fn respond(&self, request: &OracleRequest) -> Result<OracleReply, OracleError> {
        let body = self.build_request_body(request);

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Gemini API request"
        );

        let response = self
            .http
            .post(self.api_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OracleError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        parse_response(&json)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
