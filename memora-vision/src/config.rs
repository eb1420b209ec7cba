//! Vision backend configuration

use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection details for an OpenAI-compatible multimodal endpoint.
///
/// `endpoint_url` is the server root (for example `http://localhost:1234`);
/// request paths such as `/v1/chat/completions` are appended to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionConfig {
    pub endpoint_url: String,
    pub model_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl VisionConfig {
    pub fn new(endpoint_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            model_name: model_name.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self
        }
    }

    /// The endpoint without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.endpoint_url.trim_end_matches('/')
    }

    /// The API key to send as a Bearer token, if a non-blank one is set.
    pub fn bearer_token(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url())
    }

    pub fn models_url(&self) -> String {
        format!("{}/v1/models", self.base_url())
    }

    pub fn ollama_tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url())
    }

    /// Ollama servers answer `/api/tags` even when the OpenAI shim is disabled.
    pub fn looks_like_ollama(&self) -> bool {
        self.endpoint_url.to_lowercase().contains("ollama")
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.endpoint_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(VisionError::InvalidConfig(format!(
                "endpoint_url must start with http:// or https://, got '{url}'"
            )));
        }
        if self.model_name.trim().is_empty() {
            return Err(VisionError::InvalidConfig(
                "model_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-call deadlines for the vision backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisionTimeouts {
    /// Captioning a single image during a scan
    pub describe: Duration,
    /// Expanding a search query
    pub expand: Duration,
    /// Reachability probe against the models listing
    pub probe: Duration,
}

impl Default for VisionTimeouts {
    fn default() -> Self {
        Self {
            describe: Duration::from_secs(10),
            expand: Duration::from_secs(3),
            probe: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_ignore_trailing_slash() {
        let config = VisionConfig::new("http://localhost:1234/", "llava");
        assert_eq!(config.base_url(), "http://localhost:1234");
        assert_eq!(
            config.chat_completions_url(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(config.models_url(), "http://localhost:1234/v1/models");
        assert_eq!(config.ollama_tags_url(), "http://localhost:1234/api/tags");
    }

    #[test]
    fn test_bearer_token_skips_blank_keys() {
        let config = VisionConfig::new("http://x", "m");
        assert_eq!(config.bearer_token(), None);
        assert_eq!(config.clone().with_api_key("  ").bearer_token(), None);
        assert_eq!(
            config.with_api_key("lm-studio").bearer_token(),
            Some("lm-studio")
        );
    }

    #[test]
    fn test_validate() {
        assert!(VisionConfig::new("http://ollama:11434", "llava").validate().is_ok());
        assert!(VisionConfig::new("localhost:1234", "llava").validate().is_err());
        assert!(VisionConfig::new("http://localhost", " ").validate().is_err());
    }

    #[test]
    fn test_ollama_detection() {
        assert!(VisionConfig::new("http://Ollama.local:11434", "llava").looks_like_ollama());
        assert!(!VisionConfig::new("http://127.0.0.1:1234", "llava").looks_like_ollama());
    }
}
