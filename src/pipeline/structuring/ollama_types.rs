//! Ollama `/api/generate` contract, error taxonomy, and endpoint validators.

use serde::Serialize;

// ──────────────────────────────────────────────
// Generation parameters
// ──────────────────────────────────────────────

/// Sampling parameters shared by both model paths.
///
/// Extraction must be reproducible: temperature 0 and a bounded output length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 512,
        }
    }
}

/// Request body for POST `/api/generate`.
///
/// `temperature`/`max_tokens` are sent at top level and mirrored in
/// `options`, which is where Ollama itself reads sampling settings.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub options: GenerateOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<&'a [String]>,
}

/// Ollama-native sampling options.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

impl<'a> GenerateRequest<'a> {
    pub fn new(
        model: &'a str,
        prompt: &'a str,
        images: Option<&'a [String]>,
        params: &GenerationParams,
    ) -> Self {
        Self {
            model,
            prompt,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: true,
            options: GenerateOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
            images,
        }
    }
}

// ──────────────────────────────────────────────
// Error taxonomy
// ──────────────────────────────────────────────

/// Model transport failures. Every variant means "the model is unavailable"
/// for routing purposes; the variant is kept for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum OllamaError {
    #[error("Ollama is not reachable at {0}")]
    NotReachable(String),

    #[error("Ollama returned an error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid model name: '{0}'")]
    InvalidModelName(String),

    #[error("Only localhost connections are allowed")]
    NonLocalEndpoint,

    #[error("Invalid URL format")]
    InvalidUrl,
}

// ──────────────────────────────────────────────
// Validators
// ──────────────────────────────────────────────

/// Validate that a base URL points to localhost only.
///
/// Certificate images and their text never leave the machine.
/// Accepts: localhost, 127.0.0.1, [::1].
pub fn validate_base_url(url: &str) -> Result<(), OllamaError> {
    let after_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or(OllamaError::InvalidUrl)?;

    let host = if after_scheme.starts_with('[') {
        after_scheme
            .split(']')
            .next()
            .unwrap_or("")
            .trim_start_matches('[')
    } else {
        after_scheme
            .split(':')
            .next()
            .unwrap_or("")
            .split('/')
            .next()
            .unwrap_or("")
    };

    match host {
        "localhost" | "127.0.0.1" | "::1" => Ok(()),
        "" => Err(OllamaError::InvalidUrl),
        _ => Err(OllamaError::NonLocalEndpoint),
    }
}

/// Validate a model name against the Ollama naming convention:
/// `[namespace/]model[:tag]`, each segment starting alphanumeric.
pub fn validate_model_name(name: &str) -> Result<(), OllamaError> {
    let valid = regex::Regex::new(
        r"^[a-zA-Z0-9][a-zA-Z0-9._-]*(/[a-zA-Z0-9][a-zA-Z0-9._-]*)?(:[a-zA-Z0-9._-]+)?$",
    )
    .map_err(|_| OllamaError::InvalidModelName(name.to_string()))?;

    if !valid.is_match(name) {
        return Err(OllamaError::InvalidModelName(name.to_string()));
    }
    Ok(())
}
