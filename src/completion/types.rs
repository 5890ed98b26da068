use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{CompletionError, CompletionResult};

/// A completion request as seen by workflow nodes.
///
/// Unset sampling fields fall back to the adapter's configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    /// Create a request with just a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
            stop: None,
        }
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    /// Set stop sequences
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

/// Body of `POST /v1/completions`
#[derive(Debug, Clone, Serialize)]
pub struct CompletionBody {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Vec<String>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CompletionBody {
    /// Merge a request with configured defaults
    pub fn from_request(request: &CompletionRequest, defaults: &LlmConfig, stream: bool) -> Self {
        Self {
            prompt: request.prompt.clone(),
            max_tokens: request.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: request.temperature.unwrap_or(defaults.temperature),
            stop: request
                .stop
                .clone()
                .unwrap_or_else(|| defaults.stop.clone()),
            stream,
            model: Some(defaults.model_name.clone()),
        }
    }
}

/// Response (or one streamed chunk) from `/v1/completions`
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
    pub model: Option<String>,
    pub usage: Option<Usage>,
}

/// One completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub text: String,
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl CompletionResponse {
    /// Text of the first choice.
    pub fn into_text(self) -> CompletionResult<String> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| CompletionError::InvalidResponse {
                message: "response contained no choices".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = CompletionRequest::new("hi")
            .with_max_tokens(10)
            .with_temperature(5.0)
            .with_stop(vec!["###".to_string()]);
        assert_eq!(req.prompt, "hi");
        assert_eq!(req.max_tokens, Some(10));
        assert_eq!(req.temperature, Some(2.0));
        assert_eq!(req.stop, Some(vec!["###".to_string()]));
    }

    #[test]
    fn test_body_uses_config_defaults() {
        let defaults = LlmConfig::default();
        let body = CompletionBody::from_request(&CompletionRequest::new("p"), &defaults, false);
        assert_eq!(body.max_tokens, 512);
        assert!((body.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(body.stop, vec!["\n\n".to_string()]);
        assert!(!body.stream);
    }

    #[test]
    fn test_body_prefers_request_overrides() {
        let defaults = LlmConfig::default();
        let req = CompletionRequest::new("p")
            .with_max_tokens(8)
            .with_temperature(0.0)
            .with_stop(vec![]);
        let body = CompletionBody::from_request(&req, &defaults, true);
        assert_eq!(body.max_tokens, 8);
        assert_eq!(body.temperature, 0.0);
        assert!(body.stop.is_empty());
        assert!(body.stream);
    }

    #[test]
    fn test_into_text_first_choice() {
        let resp: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"text":"yes","finish_reason":"stop"},{"text":"no"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.into_text().unwrap(), "yes");
    }

    #[test]
    fn test_into_text_no_choices_is_malformed() {
        let resp: CompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            resp.into_text(),
            Err(CompletionError::InvalidResponse { .. })
        ));
    }
}
