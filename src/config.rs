//! Extractor configuration.
//!
//! Defaults reproduce the stock local setup (Ollama on localhost, `mistral:instruct`
//! for text, `llava` for images). `ExtractorConfig::from_env()` layers
//! `CERTEXTRACT_*` environment variables on top.

use std::path::PathBuf;

use serde::Deserialize;

use crate::pipeline::extraction::{PreprocessConfig, PreprocessStrategy, DEFAULT_MAX_WIDTH};
use crate::pipeline::structuring::GenerationParams;

/// Application-level constants
pub const APP_NAME: &str = "certextract";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "CERTEXTRACT_";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "certextract=info"
}

// ═══════════════════════════════════════════════════════════
// ExtractorConfig
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Ollama base URL. Must be loopback.
    pub ollama_url: String,
    pub text_model: String,
    pub vision_model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Trimmed OCR text must be strictly longer than this (in characters)
    /// for the text path to run.
    pub text_path_min_chars: usize,
    pub max_width: u32,
    pub preprocess: PreprocessStrategy,
    /// Per-request diagnostic dumps go here when set.
    pub dump_dir: Option<PathBuf>,
    /// `None` uses Tesseract's own lookup (`TESSDATA_PREFIX`).
    pub tessdata_dir: Option<PathBuf>,
    pub ocr_lang: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            text_model: "mistral:instruct".to_string(),
            vision_model: "llava".to_string(),
            timeout_secs: 60,
            max_tokens: 512,
            temperature: 0.0,
            text_path_min_chars: 60,
            max_width: DEFAULT_MAX_WIDTH,
            preprocess: PreprocessStrategy::Standard,
            dump_dir: None,
            tessdata_dir: None,
            ocr_lang: "eng".to_string(),
        }
    }
}

impl ExtractorConfig {
    /// Defaults overridden by `CERTEXTRACT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup(CERTEXTRACT_<FIELD>)`.
    ///
    /// Unparseable values are ignored with a warning; the default stays.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("OLLAMA_URL") {
            config.ollama_url = v;
        }
        if let Some(v) = get("TEXT_MODEL") {
            config.text_model = v;
        }
        if let Some(v) = get("VISION_MODEL") {
            config.vision_model = v;
        }
        if let Some(v) = get("OCR_LANG") {
            config.ocr_lang = v;
        }
        if let Some(v) = get("DUMP_DIR") {
            config.dump_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("TESSDATA_DIR") {
            config.tessdata_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("PREPROCESS") {
            match PreprocessStrategy::parse(&v) {
                Some(s) => config.preprocess = s,
                None => warn_ignored("PREPROCESS", &v),
            }
        }

        parse_into(get("TIMEOUT_SECS"), "TIMEOUT_SECS", &mut config.timeout_secs);
        parse_into(get("MAX_TOKENS"), "MAX_TOKENS", &mut config.max_tokens);
        parse_into(get("TEMPERATURE"), "TEMPERATURE", &mut config.temperature);
        parse_into(
            get("TEXT_PATH_MIN_CHARS"),
            "TEXT_PATH_MIN_CHARS",
            &mut config.text_path_min_chars,
        );
        parse_into(get("MAX_WIDTH"), "MAX_WIDTH", &mut config.max_width);

        config
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn preprocess_config(&self) -> PreprocessConfig {
        PreprocessConfig {
            strategy: self.preprocess,
            max_width: self.max_width,
        }
    }
}

fn parse_into<T: std::str::FromStr>(raw: Option<String>, name: &str, slot: &mut T) {
    if let Some(v) = raw {
        match v.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn_ignored(name, &v),
        }
    }
}

fn warn_ignored(name: &str, value: &str) {
    tracing::warn!(
        variable = %format!("{ENV_PREFIX}{name}"),
        value = %value,
        "Ignoring invalid configuration value"
    );
}
