use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use super::ExtractionError;
use crate::pipeline::structuring::CertificateFields;

/// One extraction call's input.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub image_bytes: Vec<u8>,
    /// Original upload name, used only for logging.
    pub filename: Option<String>,
}

impl ExtractionRequest {
    pub fn new(image_bytes: Vec<u8>) -> Self {
        Self {
            image_bytes,
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }
}

/// Image normalized for OCR, backed by a temporary PNG on disk.
///
/// The temporary file lives exactly as long as this value: dropping it on
/// any path (success, fallback, error, panic unwind) removes the file.
#[derive(Debug)]
pub struct PreprocessedImage {
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
    artifact: NamedTempFile,
}

impl PreprocessedImage {
    /// Wrap encoded PNG bytes and write them to a fresh temporary file.
    pub fn new(
        png_bytes: Vec<u8>,
        (width, height): (u32, u32),
        (original_width, original_height): (u32, u32),
    ) -> Result<Self, ExtractionError> {
        let mut artifact = tempfile::Builder::new()
            .prefix("certextract-")
            .suffix(".png")
            .tempfile()?;
        artifact.write_all(&png_bytes)?;
        artifact.flush()?;

        Ok(Self {
            png_bytes,
            width,
            height,
            original_width,
            original_height,
            artifact,
        })
    }

    /// Path of the temporary PNG. Valid only while `self` is alive.
    pub fn path(&self) -> &Path {
        self.artifact.path()
    }
}

/// Pixel rectangle of a recognized word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One recognized word with its layout position.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    /// Engine confidence 0-100; -1 when the engine gives none.
    pub confidence: i32,
    pub bounding_box: BoundingBox,
    /// (page, block, paragraph, line) identifying the word's line.
    pub line_key: (u32, u32, u32, u32),
}

/// OCR output for one image.
#[derive(Debug, Clone, Default)]
pub struct OcrPage {
    pub text: String,
    /// Per-word layout; empty for plain-text engines.
    pub words: Vec<OcrWord>,
}

/// OCR engine abstraction (allows mocking for tests).
///
/// One instance is built at startup and shared. Implementations that are not
/// safe for concurrent inference must serialize internally.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &PreprocessedImage) -> Result<OcrPage, ExtractionError>;
}

/// Which path produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    OcrTextModel,
    VisionModel,
    RawFallback,
}

/// A model path the orchestrator can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelPath {
    Text,
    Vision,
}

/// How one path attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Parsed,
    NoObjectFound,
    ModelUnavailable,
}

/// Diagnostic record of one path attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathAttempt {
    pub path: ModelPath,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Final output of one extraction.
///
/// `parsed` is `None` exactly when `method` is `RawFallback`; the
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    method: ExtractionMethod,
    parsed: Option<CertificateFields>,
    raw: String,
    attempts: Vec<PathAttempt>,
}

impl ExtractionResult {
    /// Successful parse from one of the model paths.
    pub fn from_path(
        path: ModelPath,
        fields: CertificateFields,
        raw: String,
        attempts: Vec<PathAttempt>,
    ) -> Self {
        let method = match path {
            ModelPath::Text => ExtractionMethod::OcrTextModel,
            ModelPath::Vision => ExtractionMethod::VisionModel,
        };
        Self {
            method,
            parsed: Some(fields),
            raw,
            attempts,
        }
    }

    /// No object could be parsed from any path.
    pub fn raw_fallback(raw: String, attempts: Vec<PathAttempt>) -> Self {
        Self {
            method: ExtractionMethod::RawFallback,
            parsed: None,
            raw,
            attempts,
        }
    }

    pub fn method(&self) -> ExtractionMethod {
        self.method
    }

    pub fn parsed(&self) -> Option<&CertificateFields> {
        self.parsed.as_ref()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn attempts(&self) -> &[PathAttempt] {
        &self.attempts
    }
}
