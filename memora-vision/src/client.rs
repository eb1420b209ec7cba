//! HTTP client for OpenAI-compatible multimodal backends (LM Studio, Ollama, vLLM).

use crate::config::{VisionConfig, VisionTimeouts};
use crate::error::{Result, VisionError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const DESCRIBE_PROMPT: &str = "You are indexing a personal photo library for search. \
Look at the image and reply with a single JSON object and nothing else, using the keys \
\"caption\" (one short sentence), \"summary\" (two or three sentences naming people, places, \
objects, activities and any legible text) and \"tags\" (an array of 3 to 10 lowercase keywords).";

const EXPAND_PROMPT: &str = "Rewrite the user's photo search query as a short, concrete \
description of what matching photos would show. Keep every name and literal term from the \
query. Reply with the rewritten query only.";

/// Caption output for one image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescription {
    pub caption: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    /// The model's message content as returned, kept for the catalog's `vision_json`.
    pub raw: String,
}

/// Result of a reachability check against a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub ok: bool,
    pub details: String,
}

#[derive(Debug, Clone)]
pub struct VisionClient {
    config: VisionConfig,
    timeouts: VisionTimeouts,
    http: Client,
}

impl VisionClient {
    pub fn new(config: VisionConfig, timeouts: VisionTimeouts) -> Result<Self> {
        config.validate()?;
        let http = Client::builder().build()?;
        Ok(Self {
            config,
            timeouts,
            http,
        })
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    pub fn timeouts(&self) -> VisionTimeouts {
        self.timeouts
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Caption an encoded image (`mime` is e.g. `image/jpeg`).
    pub async fn describe_image(&self, image: &[u8], mime: &str) -> Result<ImageDescription> {
        let data_url = format!("data:{mime};base64,{}", BASE64.encode(image));
        let messages = json!([
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": DESCRIBE_PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }
        ]);

        let content = self.chat(messages, 0.2, self.timeouts.describe).await?;
        parse_description(&content)
    }

    /// Ask the backend for a richer rewrite of a search query.
    ///
    /// Returns the trimmed rewrite without judging it; callers decide whether to use it.
    pub async fn expand_query(&self, query: &str) -> Result<String> {
        let messages = json!([
            { "role": "system", "content": EXPAND_PROMPT },
            { "role": "user", "content": query }
        ]);

        let content = self.chat(messages, 0.3, self.timeouts.expand).await?;
        Ok(content
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string())
    }

    async fn chat(&self, messages: Value, temperature: f32, timeout: Duration) -> Result<String> {
        let url = self.config.chat_completions_url();
        let body = json!({
            "model": self.config.model_name,
            "temperature": temperature,
            "messages": messages,
        });

        debug!("POST {} (model {})", url, self.config.model_name);
        let response = self
            .authorized(self.http.post(&url))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::from_request(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| VisionError::MalformedResponse(e.to_string()))?;
        parse_chat_content(&json)
    }

    /// Probe the configured backend by listing its models.
    pub async fn probe(&self) -> ProbeReport {
        probe_endpoint(&self.http, &self.config, self.timeouts.probe).await
    }
}

/// Check that a backend is reachable without requiring a fully valid config.
///
/// Tries `{endpoint}/v1/models` first. Endpoints that look like Ollama get a
/// second attempt against `{endpoint}/api/tags`. Never fails; problems are
/// reported in [`ProbeReport::details`].
pub async fn probe(config: &VisionConfig, timeout: Duration) -> ProbeReport {
    match Client::builder().build() {
        Ok(http) => probe_endpoint(&http, config, timeout).await,
        Err(e) => ProbeReport {
            ok: false,
            details: e.to_string(),
        },
    }
}

async fn probe_endpoint(http: &Client, config: &VisionConfig, timeout: Duration) -> ProbeReport {
    let mut request = http.get(config.models_url()).timeout(timeout);
    if let Some(token) = config.bearer_token() {
        request = request.bearer_auth(token);
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            return ProbeReport {
                ok: false,
                details: VisionError::from_request(e, timeout).to_string(),
            };
        }
    };

    if response.status().is_success() {
        let count = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|json| json.get("data").and_then(Value::as_array).map(Vec::len))
            .unwrap_or(0);
        return ProbeReport {
            ok: true,
            details: format!("Connected. Found {count} models."),
        };
    }

    if config.looks_like_ollama() {
        if let Ok(tags) = http.get(config.ollama_tags_url()).timeout(timeout).send().await {
            if tags.status().is_success() {
                return ProbeReport {
                    ok: true,
                    details: "Connected to Ollama.".to_string(),
                };
            }
        }
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ProbeReport {
        ok: false,
        details: format!("Status {status}: {body}"),
    }
}

fn parse_chat_content(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            VisionError::MalformedResponse("response has no choices[0].message.content".into())
        })
}

/// Interpret a captioning reply.
///
/// Accepts a JSON object (optionally wrapped in a markdown code fence) with
/// `caption`, `summary`/`description` and `tags` keys. The summary falls back
/// to the caption, and plain prose becomes both. Empty content is malformed.
pub fn parse_description(content: &str) -> Result<ImageDescription> {
    let trimmed = strip_code_fence(content.trim());
    if trimmed.is_empty() {
        return Err(VisionError::MalformedResponse(
            "empty message content".to_string(),
        ));
    }

    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(trimmed) else {
        return Ok(ImageDescription {
            caption: Some(trimmed.to_string()),
            summary: Some(trimmed.to_string()),
            tags: Vec::new(),
            raw: content.to_string(),
        });
    };

    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let tags = match fields.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(normalize_tag)
            .collect(),
        Some(Value::String(list)) => list.split(',').filter_map(normalize_tag).collect(),
        _ => Vec::new(),
    };

    let caption = text("caption");
    Ok(ImageDescription {
        summary: text("summary")
            .or_else(|| text("description"))
            .or_else(|| caption.clone()),
        caption,
        tags,
        raw: trimmed.to_string(),
    })
}

/// Lowercased tag with its words separated by single spaces. Tags are stored
/// comma separated, so commas inside a tag become spaces.
fn normalize_tag(tag: &str) -> Option<String> {
    let words: Vec<&str> = tag
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .collect();
    (!words.is_empty()).then(|| words.join(" ").to_lowercase())
}

fn strip_code_fence(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    // Skip an optional language tag on the opening fence.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}
