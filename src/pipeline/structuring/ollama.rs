use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::ollama_types::{
    validate_base_url, validate_model_name, GenerateRequest, GenerationParams, OllamaError,
};
use super::types::{LlmClient, ModelResponse};

/// Ollama HTTP client for local text and vision generation.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    /// Create a client pointing at a local Ollama instance.
    ///
    /// Every request is bounded by `timeout_secs`; there is no way to abort
    /// a call early.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, OllamaError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OllamaError::Network(e.to_string()))?;

        Ok(Self {
            base_url,
            client,
            timeout_secs,
        })
    }

    /// Default Ollama instance at localhost:11434 with a 60-second timeout.
    pub fn default_local() -> Result<Self, OllamaError> {
        Self::new("http://localhost:11434", 60)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_transport_error(&self, e: reqwest::Error) -> OllamaError {
        if e.is_timeout() {
            OllamaError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            OllamaError::NotReachable(self.base_url.clone())
        } else {
            OllamaError::Network(e.to_string())
        }
    }

    fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelResponse, OllamaError> {
        validate_model_name(request.model)?;

        let url = format!("{}/api/generate", self.base_url);
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(OllamaError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .map_err(|e| self.map_transport_error(e))?;
        let parsed = ModelResponse::from_body(body.to_vec());

        tracing::debug!(
            model = request.model,
            elapsed_ms = %start.elapsed().as_millis(),
            body_len = parsed.body.len(),
            fragments = parsed.fragments.len(),
            "Ollama generate complete"
        );

        Ok(parsed)
    }
}

impl LlmClient for OllamaClient {
    fn complete_text(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ModelResponse, OllamaError> {
        self.generate(&GenerateRequest::new(model, prompt, None, params))
    }

    fn complete_vision(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
        params: &GenerationParams,
    ) -> Result<ModelResponse, OllamaError> {
        self.generate(&GenerateRequest::new(model, prompt, Some(images), params))
    }
}

/// Mock LLM client for testing: scripted response bodies per path.
///
/// A path without a scripted body fails as if Ollama were not running.
#[derive(Default)]
pub struct MockLlmClient {
    text_reply: Option<String>,
    vision_reply: Option<String>,
    text_calls: AtomicUsize,
    vision_calls: AtomicUsize,
    vision_images: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text_reply(mut self, body: &str) -> Self {
        self.text_reply = Some(body.to_string());
        self
    }

    pub fn with_vision_reply(mut self, body: &str) -> Self {
        self.vision_reply = Some(body.to_string());
        self
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn vision_calls(&self) -> usize {
        self.vision_calls.load(Ordering::SeqCst)
    }

    /// Images received by the most recent vision call.
    pub fn last_vision_images(&self) -> Vec<String> {
        self.vision_images
            .lock()
            .map(|imgs| imgs.clone())
            .unwrap_or_default()
    }

    fn reply(body: &Option<String>) -> Result<ModelResponse, OllamaError> {
        match body {
            Some(b) => Ok(ModelResponse::from_body(b.as_bytes().to_vec())),
            None => Err(OllamaError::NotReachable("mock".into())),
        }
    }
}

impl LlmClient for MockLlmClient {
    fn complete_text(
        &self,
        _model: &str,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<ModelResponse, OllamaError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        Self::reply(&self.text_reply)
    }

    fn complete_vision(
        &self,
        _model: &str,
        _prompt: &str,
        images: &[String],
        _params: &GenerationParams,
    ) -> Result<ModelResponse, OllamaError> {
        self.vision_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.vision_images.lock() {
            *last = images.to_vec();
        }
        Self::reply(&self.vision_reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structuring::types::ResponseFragment;

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 60).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.timeout_secs, 60);
    }

    #[test]
    fn ollama_client_rejects_remote_host() {
        let result = OllamaClient::new("http://10.0.0.2:11434", 60);
        assert!(matches!(result, Err(OllamaError::NonLocalEndpoint)));
    }

    #[test]
    fn default_local_uses_standard_port() {
        let client = OllamaClient::default_local().unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn invalid_model_name_fails_before_network() {
        let client = OllamaClient::default_local().unwrap();
        let result = client.complete_text("../bad", "p", &GenerationParams::default());
        assert!(matches!(result, Err(OllamaError::InvalidModelName(_))));
    }

    #[test]
    fn unreachable_port_is_model_unavailable() {
        // Port 9 (discard) is essentially never served on loopback.
        let client = OllamaClient::new("http://127.0.0.1:9", 2).unwrap();
        let result = client.complete_text("llava", "p", &GenerationParams::default());
        assert!(result.is_err());
    }

    #[test]
    fn mock_counts_calls_and_splits_body() {
        let mock = MockLlmClient::new().with_text_reply("{\"response\":\"x\"}\n");
        let resp = mock
            .complete_text("m", "p", &GenerationParams::default())
            .unwrap();
        assert_eq!(resp.fragments, vec![ResponseFragment::Answer("x".into())]);
        assert_eq!(mock.text_calls(), 1);
        assert_eq!(mock.vision_calls(), 0);
    }

    #[test]
    fn mock_without_reply_is_unreachable() {
        let mock = MockLlmClient::new();
        let result = mock.complete_vision("m", "p", &["img".into()], &GenerationParams::default());
        assert!(matches!(result, Err(OllamaError::NotReachable(_))));
        assert_eq!(mock.last_vision_images(), vec!["img".to_string()]);
    }
}
