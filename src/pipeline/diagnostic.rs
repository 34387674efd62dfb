//! Extraction diagnostic dump: writes intermediate artifacts to disk.
//!
//! Disabled unless a dump directory is configured (`dump_dir` in
//! `ExtractorConfig`, or `CERTEXTRACT_DUMP_DIR`).
//!
//! **Output structure**:
//! ```text
//! {dump_dir}/{request_id}/
//!   01-ocr-text.txt
//!   02-text-prompt.txt
//!   03-text-response.txt
//!   04-vision-prompt.txt
//!   05-vision-response.txt
//!   06-result.json
//! ```
//!
//! Files for a path that was not taken are simply absent. Write failures are
//! logged and never change the extraction result.

use std::path::{Path, PathBuf};

use uuid::Uuid;

pub const OCR_TEXT_FILE: &str = "01-ocr-text.txt";
pub const TEXT_PROMPT_FILE: &str = "02-text-prompt.txt";
pub const TEXT_RESPONSE_FILE: &str = "03-text-response.txt";
pub const VISION_PROMPT_FILE: &str = "04-vision-prompt.txt";
pub const VISION_RESPONSE_FILE: &str = "05-vision-response.txt";
pub const RESULT_FILE: &str = "06-result.json";

// ──────────────────────────────────────────────
// Dump directory resolution
// ──────────────────────────────────────────────

/// Returns the dump directory for a request, or `None` if diagnostics are disabled.
///
/// Creates the directory tree on first call. Returns `None` (with a warning) if
/// directory creation fails. Never panics, never blocks the pipeline.
pub fn dump_dir_for(base: Option<&Path>, request_id: &Uuid) -> Option<PathBuf> {
    let dir = base?.join(request_id.to_string());

    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(
            path = %dir.display(),
            error = %e,
            "Diagnostic dump: failed to create directory"
        );
        return None;
    }

    Some(dir)
}

// ──────────────────────────────────────────────
// Dump writers
// ──────────────────────────────────────────────

/// Write a JSON artifact (any serde-serializable value), pretty-printed.
pub fn dump_json<T: serde::Serialize>(dir: &Path, filename: &str, value: &T) {
    let path = dir.join(filename);
    match serde_json::to_string_pretty(value) {
        Ok(json) => match std::fs::write(&path, json.as_bytes()) {
            Ok(()) => tracing::debug!(
                path = %path.display(),
                size = json.len(),
                "Diagnostic dump: JSON written"
            ),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Diagnostic dump: failed to write JSON"
            ),
        },
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to serialize JSON"
        ),
    }
}

/// Write a text artifact (OCR text, prompt, raw model response).
pub fn dump_text(dir: &Path, filename: &str, text: &str) {
    let path = dir.join(filename);
    match std::fs::write(&path, text.as_bytes()) {
        Ok(()) => tracing::debug!(
            path = %path.display(),
            size = text.len(),
            "Diagnostic dump: text written"
        ),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "Diagnostic dump: failed to write text"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_dir_for_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let dir = dump_dir_for(Some(tmp.path()), &id).unwrap();
        assert!(dir.exists());
        assert!(dir.ends_with(id.to_string()));
    }

    #[test]
    fn dump_dir_for_disabled_without_base() {
        assert!(dump_dir_for(None, &Uuid::new_v4()).is_none());
    }

    #[test]
    fn dump_dir_for_unwritable_base_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        assert!(dump_dir_for(Some(&file), &Uuid::new_v4()).is_none());
    }

    #[test]
    fn dump_json_writes_pretty_json() {
        let tmp = tempfile::tempdir().unwrap();
        dump_json(tmp.path(), RESULT_FILE, &serde_json::json!({"method": "raw_fallback"}));
        let content = std::fs::read_to_string(tmp.path().join(RESULT_FILE)).unwrap();
        assert!(content.contains("\"method\": \"raw_fallback\""));
        assert!(content.contains('\n'));
    }

    #[test]
    fn dump_text_writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        dump_text(tmp.path(), OCR_TEXT_FILE, "CERTIFICATE");
        let content = std::fs::read_to_string(tmp.path().join(OCR_TEXT_FILE)).unwrap();
        assert_eq!(content, "CERTIFICATE");
    }

    #[test]
    fn dump_to_missing_directory_does_not_panic() {
        dump_text(Path::new("/nonexistent/certextract/dump"), "x.txt", "data");
        dump_json(Path::new("/nonexistent/certextract/dump"), "x.json", &1);
    }
}
