//! Certificate field extraction from photographed or scanned images.
//!
//! OCR text goes to a local text model when it looks usable; otherwise, or
//! when no JSON object comes back, the original image goes to a vision model.
//! Both models are served by a local Ollama instance.

pub mod config;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use config::ExtractorConfig;
pub use pipeline::extraction::{
    ExtractionError, ExtractionMethod, ExtractionRequest, ExtractionResult, HybridExtractor,
};
pub use pipeline::structuring::{CertificateField, CertificateFields, OllamaError};

/// Install the fmt subscriber. `RUST_LOG` wins over the default filter.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
}
