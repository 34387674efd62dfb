pub mod types;
pub mod preprocess;
pub mod ocr;
pub mod boxes;
pub mod orchestrator;

pub use types::*;
pub use preprocess::*;
pub use ocr::*;
pub use boxes::*;
pub use orchestrator::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image could not be decoded: {0}")]
    ImageDecode(String),

    #[error("Image encoding failed: {0}")]
    ImageEncode(String),

    #[error("Tesseract OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("Tessdata not found at: {0}")]
    TessdataNotFound(PathBuf),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Extraction task failed: {0}")]
    Task(String),
}
