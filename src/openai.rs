//! OpenAI API client: Responses API requests and reply extraction.

use anyhow::{Context, Result, anyhow};
use reqwest::Client as HttpClient;
use serde_json::{Value, json};

use crate::constants::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use crate::util::env_first;

/// Thin wrapper around the OpenAI HTTP API.
#[derive(Clone)]
pub struct OpenAiClient {
    pub model: String,
    pub base_url: String,
    http_client: HttpClient,
}

impl OpenAiClient {
    pub fn new() -> Self {
        let model = env_first(&["OPENAI_MODEL"]).unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
        let base_url = env_first(&["OPENAI_BASE_URL", "OPENAI_API_BASE"])
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        OpenAiClient {
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: HttpClient::new(),
        }
    }

    /// Generate one reply for `input` under the given system `instructions`.
    pub async fn reply(&self, key: &str, instructions: &str, input: &[Value]) -> Result<String> {
        let body = json!({
            "model": self.model,
            "instructions": instructions,
            "input": input,
        });
        let response = self.request(key, "responses", body).await?;
        let text = extract_output_text(&extract_output_items(&response));
        if text.trim().is_empty() {
            return Err(anyhow!("OpenAI returned no text"));
        }
        Ok(text)
    }

    async fn request(&self, key: &str, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self
            .http_client
            .post(url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .context("send OpenAI request")?;
        let status = response.status();
        let text = response.text().await.context("read OpenAI response")?;
        let json: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({"raw": text}));
        if !status.is_success() {
            return Err(anyhow!("OpenAI error {status}: {json}"));
        }
        Ok(json)
    }
}

/// A Responses API input message.
pub fn input_message(role: &str, text: &str) -> Value {
    json!({ "role": role, "content": text })
}

/// Pull the top-level `output` array from an OpenAI response.
pub fn extract_output_items(response: &Value) -> Vec<Value> {
    response
        .get("output")
        .and_then(|value| value.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Concatenate all `output_text` blocks from the output items into a single string.
pub fn extract_output_text(output_items: &[Value]) -> String {
    let mut parts = Vec::new();
    for item in output_items {
        if item.get("type").and_then(|v| v.as_str()) != Some("message") {
            continue;
        }
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for block in content {
            if block.get("type").and_then(|v| v.as_str()) != Some("output_text") {
                continue;
            }
            if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                parts.push(text.to_string());
            }
        }
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_text_skips_non_message_items() {
        let response = json!({
            "output": [
                { "type": "reasoning", "content": [{ "type": "output_text", "text": "hidden" }] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "Hello" },
                    { "type": "refusal", "refusal": "no" },
                    { "type": "output_text", "text": "again" }
                ]}
            ]
        });
        let text = extract_output_text(&extract_output_items(&response));
        assert_eq!(text, "Hello\nagain");
    }

    #[test]
    fn missing_output_is_empty() {
        assert!(extract_output_items(&json!({"id": "resp_1"})).is_empty());
        assert_eq!(extract_output_text(&[]), "");
    }

    #[test]
    fn input_message_shape() {
        assert_eq!(
            input_message("user", "hi"),
            json!({ "role": "user", "content": "hi" })
        );
    }
}
