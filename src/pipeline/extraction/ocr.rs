use std::sync::Mutex;

use super::types::{BoundingBox, OcrEngine, OcrPage, OcrWord, PreprocessedImage};
use super::ExtractionError;

/// Page segmentation mode: assume a single uniform block of text.
pub const PAGE_SEG_MODE: &str = "6";

/// How page text is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OcrLayout {
    /// Tesseract's own plain-text rendering.
    #[default]
    Plain,
    /// Rebuilt from word layout: one output line per recognized line.
    Lines,
}

/// Tesseract OCR engine reading the preprocessed PNG from disk.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct TesseractOcr {
    /// `None` uses the system tessdata location.
    tessdata_dir: Option<std::path::PathBuf>,
    lang: String,
    layout: OcrLayout,
}

#[cfg(feature = "ocr")]
impl TesseractOcr {
    /// Use Tesseract's default tessdata lookup with English.
    pub fn system() -> Self {
        Self {
            tessdata_dir: None,
            lang: "eng".to_string(),
            layout: OcrLayout::Plain,
        }
    }

    /// Initialize with an explicit tessdata directory.
    pub fn with_tessdata(tessdata_dir: &std::path::Path) -> Result<Self, ExtractionError> {
        if !tessdata_dir.join("eng.traineddata").exists() {
            return Err(ExtractionError::TessdataNotFound(tessdata_dir.to_path_buf()));
        }
        Ok(Self {
            tessdata_dir: Some(tessdata_dir.to_path_buf()),
            lang: "eng".to_string(),
            layout: OcrLayout::Plain,
        })
    }

    /// Set language(s) for OCR (e.g., "eng", "eng+fra")
    pub fn with_languages(mut self, langs: &str) -> Self {
        self.lang = langs.to_string();
        self
    }

    pub fn with_layout(mut self, layout: OcrLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Engine for the hybrid path as configured.
    pub fn from_config(config: &crate::config::ExtractorConfig) -> Result<Self, ExtractionError> {
        let engine = match &config.tessdata_dir {
            Some(dir) => Self::with_tessdata(dir)?,
            None => Self::system(),
        };
        tracing::info!(lang = %config.ocr_lang, "Tesseract OCR configured");
        Ok(engine.with_languages(&config.ocr_lang))
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &PreprocessedImage) -> Result<OcrPage, ExtractionError> {
        let tessdata = match &self.tessdata_dir {
            Some(dir) => Some(
                dir.to_str()
                    .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?,
            ),
            None => None,
        };
        let image_path = image
            .path()
            .to_str()
            .ok_or_else(|| ExtractionError::OcrProcessing("Non-UTF-8 image path".into()))?;

        let tess = tesseract::Tesseract::new(tessdata, Some(&self.lang))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?
            .set_variable("tessedit_pageseg_mode", PAGE_SEG_MODE)
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        let mut tess = tess
            .set_image(image_path)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        match self.layout {
            OcrLayout::Plain => {
                let text = tess
                    .get_text()
                    .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

                // Layout is best effort here; the text alone is enough for routing.
                let words = match tess.get_tsv_text(0) {
                    Ok(tsv) => parse_tsv_words(&tsv),
                    Err(e) => {
                        tracing::debug!(error = ?e, "Tesseract TSV output unavailable");
                        Vec::new()
                    }
                };
                Ok(OcrPage { text, words })
            }
            OcrLayout::Lines => {
                let tsv = tess
                    .get_tsv_text(0)
                    .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;
                let words = parse_tsv_words(&tsv);
                Ok(OcrPage {
                    text: join_lines(&words),
                    words,
                })
            }
        }
    }
}

/// Mock OCR engine for unit testing without Tesseract.
#[derive(Default)]
pub struct MockOcrEngine {
    text: String,
    words: Vec<OcrWord>,
    fail: bool,
    seen_paths: Mutex<Vec<std::path::PathBuf>>,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    /// Engine that errors on every call.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Engine returning word layout; page text is rebuilt from the words.
    pub fn with_words(words: Vec<OcrWord>) -> Self {
        Self {
            text: join_lines(&words),
            words,
            ..Self::default()
        }
    }

    /// Artifact paths this engine was asked to read, in call order.
    pub fn seen_paths(&self) -> Vec<std::path::PathBuf> {
        self.seen_paths
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, image: &PreprocessedImage) -> Result<OcrPage, ExtractionError> {
        if let Ok(mut seen) = self.seen_paths.lock() {
            seen.push(image.path().to_path_buf());
        }
        if self.fail {
            return Err(ExtractionError::OcrProcessing("mock failure".into()));
        }
        Ok(OcrPage {
            text: self.text.clone(),
            words: self.words.clone(),
        })
    }
}

/// Parse Tesseract TSV output into word records.
/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
/// Level 5 = individual word entries. Confidence is rounded to an integer;
/// Tesseract's "no confidence" (negative) becomes -1.
pub fn parse_tsv_words(tsv: &str) -> Vec<OcrWord> {
    let mut results = Vec::new();

    for line in tsv.lines().skip(1) {
        // Skip header row
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = match fields[0].parse() {
            Ok(l) => l,
            Err(_) => continue,
        };
        if level != 5 {
            continue;
        }

        let conf: f32 = match fields[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };

        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        let (Some(bounding_box), Some(line_key)) = (
            parse_bounding_box(fields[6], fields[7], fields[8], fields[9]),
            parse_line_key(fields[1], fields[2], fields[3], fields[4]),
        ) else {
            continue;
        };

        let confidence = if conf < 0.0 { -1 } else { conf.round() as i32 };

        results.push(OcrWord {
            text: word.to_string(),
            confidence,
            bounding_box,
            line_key,
        });
    }

    results
}

/// Rebuild page text from words: spaces within a line, newlines between lines.
pub fn join_lines(words: &[OcrWord]) -> String {
    let mut out = String::new();
    let mut current = None;
    for word in words {
        match current {
            Some(key) if key == word.line_key => out.push(' '),
            Some(_) => out.push('\n'),
            None => {}
        }
        out.push_str(&word.text);
        current = Some(word.line_key);
    }
    out
}

fn parse_bounding_box(left: &str, top: &str, width: &str, height: &str) -> Option<BoundingBox> {
    Some(BoundingBox {
        x: left.parse().ok()?,
        y: top.parse().ok()?,
        width: width.parse().ok()?,
        height: height.parse().ok()?,
    })
}

fn parse_line_key(page: &str, block: &str, par: &str, line: &str) -> Option<(u32, u32, u32, u32)> {
    Some((
        page.parse().ok()?,
        block.parse().ok()?,
        par.parse().ok()?,
        line.parse().ok()?,
    ))
}
