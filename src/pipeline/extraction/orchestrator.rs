//! Hybrid extraction: OCR-gated text model with a vision-model fallback.
//!
//! ```text
//! START ─preprocess+OCR─▶ OCR_DONE ─┬─(text > threshold)─▶ TEXT_PATH ─┬─parsed─▶ SUCCESS
//!                                   │                                 └─else──┐
//!                                   └─(otherwise)──────────────────────────▶ VISION_PATH ─┬─parsed─▶ SUCCESS
//!                                                                                          └─else───▶ RAW_FALLBACK
//! ```
//!
//! At most two model calls per request, strictly sequential. Only failing
//! to prepare the image is an error; everything else ends in a result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use super::preprocess::{CertificatePreprocessor, ImagePreprocessor};
use super::types::{
    AttemptOutcome, ExtractionRequest, ExtractionResult, ModelPath, OcrEngine, PathAttempt,
};
use super::ExtractionError;
use crate::config::ExtractorConfig;
use crate::pipeline::diagnostic;
use crate::pipeline::structuring::{
    aggregate_response, build_text_prompt, build_vision_prompt, extract_first_json,
    validate_model_name, CertificateFields, GenerationParams, LlmClient, OllamaClient,
    OllamaError,
};

// ──────────────────────────────────────────────
// Transition function
// ──────────────────────────────────────────────

/// How one model path ended.
#[derive(Debug)]
pub enum PathOutcome {
    /// A schema object was found in the aggregated answer.
    Parsed { fields: CertificateFields, raw: String },
    /// The model answered, but no usable object could be extracted.
    NoObjectFound { raw: String },
    /// The model could not be reached or errored.
    Unavailable(OllamaError),
}

impl PathOutcome {
    /// Classify an aggregated answer.
    ///
    /// Any non-empty object is parsed and projected onto the schema, with
    /// `null` for keys it lacks. No object, a non-object value, or `{}`
    /// counts as not found.
    pub fn from_answer(raw: String) -> Self {
        match extract_first_json(&raw)
            .as_ref()
            .and_then(CertificateFields::from_json)
        {
            Some(fields) => PathOutcome::Parsed { fields, raw },
            None => PathOutcome::NoObjectFound { raw },
        }
    }

    pub fn attempt(&self, path: ModelPath) -> PathAttempt {
        let (outcome, detail) = match self {
            PathOutcome::Parsed { .. } => (AttemptOutcome::Parsed, None),
            PathOutcome::NoObjectFound { .. } => (AttemptOutcome::NoObjectFound, None),
            PathOutcome::Unavailable(e) => (AttemptOutcome::ModelUnavailable, Some(e.to_string())),
        };
        PathAttempt {
            path,
            outcome,
            detail,
        }
    }
}

/// Next state after a path attempt.
#[derive(Debug)]
pub enum Transition {
    Done(ExtractionResult),
    Next(ModelPath),
}

/// First model path for the given (trimmed) OCR text.
///
/// The text path needs strictly more than `min_chars` characters.
pub fn route_after_ocr(ocr_text: &str, min_chars: usize) -> ModelPath {
    if ocr_text.trim().chars().count() > min_chars {
        ModelPath::Text
    } else {
        ModelPath::Vision
    }
}

/// Record the attempt and decide where to go next.
///
/// The vision path is always terminal.
pub fn transition(
    path: ModelPath,
    outcome: PathOutcome,
    attempts: &mut Vec<PathAttempt>,
) -> Transition {
    attempts.push(outcome.attempt(path));

    match (path, outcome) {
        (_, PathOutcome::Parsed { fields, raw }) => Transition::Done(ExtractionResult::from_path(
            path,
            fields,
            raw,
            std::mem::take(attempts),
        )),
        (ModelPath::Text, _) => Transition::Next(ModelPath::Vision),
        (ModelPath::Vision, PathOutcome::NoObjectFound { raw }) => {
            Transition::Done(ExtractionResult::raw_fallback(raw, std::mem::take(attempts)))
        }
        (ModelPath::Vision, PathOutcome::Unavailable(e)) => Transition::Done(
            ExtractionResult::raw_fallback(format!("model unavailable: {e}"), std::mem::take(attempts)),
        ),
    }
}

// ──────────────────────────────────────────────
// HybridExtractor
// ──────────────────────────────────────────────

/// Composes preprocessing, OCR and the two model paths.
///
/// Holds no per-request state; one instance serves any number of calls.
pub struct HybridExtractor {
    preprocessor: Box<dyn ImagePreprocessor>,
    ocr: Arc<dyn OcrEngine>,
    llm: Arc<dyn LlmClient>,
    text_model: String,
    vision_model: String,
    params: GenerationParams,
    text_path_min_chars: usize,
    dump_dir: Option<PathBuf>,
}

impl HybridExtractor {
    pub fn new(
        preprocessor: Box<dyn ImagePreprocessor>,
        ocr: Arc<dyn OcrEngine>,
        llm: Arc<dyn LlmClient>,
        config: &ExtractorConfig,
    ) -> Self {
        Self {
            preprocessor,
            ocr,
            llm,
            text_model: config.text_model.clone(),
            vision_model: config.vision_model.clone(),
            params: config.generation_params(),
            text_path_min_chars: config.text_path_min_chars,
            dump_dir: config.dump_dir.clone(),
        }
    }

    /// Production wiring: configured preprocessor and a local Ollama client.
    ///
    /// Fails early on a non-local endpoint or malformed model names.
    pub fn from_config(
        config: &ExtractorConfig,
        ocr: Arc<dyn OcrEngine>,
    ) -> Result<Self, OllamaError> {
        validate_model_name(&config.text_model)?;
        validate_model_name(&config.vision_model)?;
        let llm = OllamaClient::new(&config.ollama_url, config.timeout_secs)?;

        tracing::info!(
            ollama = llm.base_url(),
            text_model = %config.text_model,
            vision_model = %config.vision_model,
            strategy = ?config.preprocess,
            "Hybrid extractor ready"
        );

        Ok(Self::new(
            Box::new(CertificatePreprocessor::new(config.preprocess_config())),
            ocr,
            Arc::new(llm),
            config,
        ))
    }

    /// Run one extraction end to end.
    ///
    /// Errors are limited to preparing the image: `ImageDecode` for unusable
    /// input, `ImageEncode` or `Io` when the preprocessed artifact cannot be
    /// written. Model and OCR failures end in a result.
    pub fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, ExtractionError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "extract",
            request_id = %request_id,
            filename = request.filename.as_deref().unwrap_or("-")
        );
        let _enter = span.enter();
        let start = Instant::now();
        let dump = diagnostic::dump_dir_for(self.dump_dir.as_deref(), &request_id);

        let ocr_text = self.run_ocr(&request.image_bytes)?;
        if let Some(dir) = &dump {
            diagnostic::dump_text(dir, diagnostic::OCR_TEXT_FILE, &ocr_text);
        }

        let mut path = route_after_ocr(&ocr_text, self.text_path_min_chars);
        tracing::info!(
            text_len = ocr_text.chars().count(),
            threshold = self.text_path_min_chars,
            path = ?path,
            "OCR complete, path selected"
        );

        let mut attempts = Vec::new();
        let result = loop {
            let outcome = match path {
                ModelPath::Text => self.run_text_path(&ocr_text, dump.as_deref()),
                ModelPath::Vision => self.run_vision_path(&request.image_bytes, dump.as_deref()),
            };
            match transition(path, outcome, &mut attempts) {
                Transition::Done(result) => break result,
                Transition::Next(next) => {
                    tracing::info!(from = ?path, to = ?next, "Falling back");
                    path = next;
                }
            }
        };

        if let Some(dir) = &dump {
            diagnostic::dump_json(dir, diagnostic::RESULT_FILE, &result);
        }

        tracing::info!(
            method = ?result.method(),
            attempts = result.attempts().len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "Extraction complete"
        );

        Ok(result)
    }

    /// `extract` on the blocking thread pool, for async hosts.
    pub async fn extract_async(
        self: Arc<Self>,
        request: ExtractionRequest,
    ) -> Result<ExtractionResult, ExtractionError> {
        tokio::task::spawn_blocking(move || self.extract(&request))
            .await
            .map_err(|e| ExtractionError::Task(e.to_string()))?
    }

    /// Preprocess and OCR. The temporary artifact is gone when this returns.
    fn run_ocr(&self, image_bytes: &[u8]) -> Result<String, ExtractionError> {
        let prepared = self.preprocessor.preprocess(image_bytes)?;

        let text = match self.ocr.recognize(&prepared) {
            Ok(page) => page.text,
            Err(e) => {
                tracing::warn!(error = %e, "OCR failed, continuing with empty text");
                String::new()
            }
        };
        drop(prepared);

        Ok(text.trim().to_string())
    }

    fn run_text_path(&self, ocr_text: &str, dump: Option<&Path>) -> PathOutcome {
        let prompt = build_text_prompt(ocr_text);
        if let Some(dir) = dump {
            diagnostic::dump_text(dir, diagnostic::TEXT_PROMPT_FILE, &prompt);
        }

        let start = Instant::now();
        let outcome = match self.llm.complete_text(&self.text_model, &prompt, &self.params) {
            Ok(response) => {
                let raw = aggregate_response(&response);
                if let Some(dir) = dump {
                    diagnostic::dump_text(dir, diagnostic::TEXT_RESPONSE_FILE, &raw);
                }
                PathOutcome::from_answer(raw)
            }
            Err(e) => PathOutcome::Unavailable(e),
        };

        log_outcome(ModelPath::Text, &self.text_model, &outcome, start);
        outcome
    }

    fn run_vision_path(&self, image_bytes: &[u8], dump: Option<&Path>) -> PathOutcome {
        let vision = build_vision_prompt(image_bytes);
        if let Some(dir) = dump {
            diagnostic::dump_text(dir, diagnostic::VISION_PROMPT_FILE, &vision.prompt);
        }

        let start = Instant::now();
        let outcome = match self.llm.complete_vision(
            &self.vision_model,
            &vision.prompt,
            &vision.images,
            &self.params,
        ) {
            Ok(response) => {
                let raw = aggregate_response(&response);
                if let Some(dir) = dump {
                    diagnostic::dump_text(dir, diagnostic::VISION_RESPONSE_FILE, &raw);
                }
                PathOutcome::from_answer(raw)
            }
            Err(e) => PathOutcome::Unavailable(e),
        };

        log_outcome(ModelPath::Vision, &self.vision_model, &outcome, start);
        outcome
    }
}

fn log_outcome(path: ModelPath, model: &str, outcome: &PathOutcome, start: Instant) {
    let elapsed_ms = start.elapsed().as_millis();
    match outcome {
        PathOutcome::Parsed { raw, .. } => tracing::info!(
            path = ?path, model, elapsed_ms = %elapsed_ms, raw_len = raw.len(),
            "Model answer parsed"
        ),
        PathOutcome::NoObjectFound { raw } => tracing::warn!(
            path = ?path, model, elapsed_ms = %elapsed_ms, raw_len = raw.len(),
            "No JSON object in model answer"
        ),
        PathOutcome::Unavailable(e) => tracing::warn!(
            path = ?path, model, elapsed_ms = %elapsed_ms, error = %e,
            "Model unavailable"
        ),
    }
}
