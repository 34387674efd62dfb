//! Box-level OCR report: per-word text, confidence and position, plus a
//! debug image with every word outlined.

use std::path::{Path, PathBuf};

use image::{GenericImageView, Rgb, RgbImage};
use serde::Serialize;

use super::preprocess::{
    apply_orientation, encode_png, read_exif_orientation, validate_image_bytes,
    CertificatePreprocessor, ImagePreprocessor,
};
use super::types::{OcrEngine, OcrWord};
use super::ExtractionError;

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);

/// One recognized word as written to `{stem}_ocr.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxRecord {
    pub text: String,
    /// 0-100, or -1 when the engine reports none.
    pub conf: i32,
    /// `[x, y, width, height]` in preprocessed-image pixels.
    #[serde(rename = "box")]
    pub bbox: [u32; 4],
}

impl From<&OcrWord> for BoxRecord {
    fn from(word: &OcrWord) -> Self {
        let b = word.bounding_box;
        Self {
            text: word.text.clone(),
            conf: word.confidence,
            bbox: [b.x, b.y, b.width, b.height],
        }
    }
}

/// Files written by `write_box_report`.
#[derive(Debug, Clone)]
pub struct BoxReport {
    pub json_path: PathBuf,
    pub debug_path: PathBuf,
}

/// Preprocessor used by the box tool: denoise, binarize, deskew.
pub fn box_preprocessor() -> CertificatePreprocessor {
    CertificatePreprocessor::strict()
}

/// Preprocess, OCR with layout, and keep every non-empty word.
pub fn recognize_boxes(
    preprocessor: &dyn ImagePreprocessor,
    engine: &dyn OcrEngine,
    image_bytes: &[u8],
) -> Result<Vec<BoxRecord>, ExtractionError> {
    let prepared = preprocessor.preprocess(image_bytes)?;
    let page = engine.recognize(&prepared)?;
    drop(prepared);

    let records: Vec<BoxRecord> = page
        .words
        .iter()
        .filter(|w| !w.text.trim().is_empty())
        .map(BoxRecord::from)
        .collect();

    tracing::info!(elements = records.len(), "Box-level OCR complete");
    Ok(records)
}

/// Write `{stem}_ocr.json` and `{stem}_debug.png` into `dir`.
///
/// The debug image is the (orientation-corrected) original with a 1-pixel
/// green outline per record. Outlines are clipped to the image.
pub fn write_box_report(
    dir: &Path,
    stem: &str,
    original_bytes: &[u8],
    records: &[BoxRecord],
) -> Result<BoxReport, ExtractionError> {
    validate_image_bytes(original_bytes)?;
    let img = image::load_from_memory(original_bytes)
        .map_err(|e| ExtractionError::ImageDecode(e.to_string()))?;
    let img = apply_orientation(img, read_exif_orientation(original_bytes));
    let (w, h) = img.dimensions();
    let mut canvas = img.to_rgb8();

    for record in records {
        draw_outline(&mut canvas, record.bbox);
    }

    std::fs::create_dir_all(dir)?;
    let json_path = dir.join(format!("{stem}_ocr.json"));
    let debug_path = dir.join(format!("{stem}_debug.png"));

    std::fs::write(&json_path, serde_json::to_vec_pretty(records)?)?;
    std::fs::write(
        &debug_path,
        encode_png(&image::DynamicImage::ImageRgb8(canvas))?,
    )?;

    tracing::info!(
        json = %json_path.display(),
        debug = %debug_path.display(),
        size = format!("{w}x{h}"),
        "Box report written"
    );

    Ok(BoxReport {
        json_path,
        debug_path,
    })
}

/// Rectangle from (x, y) to (x + w, y + h) inclusive.
fn draw_outline(canvas: &mut RgbImage, [x, y, w, h]: [u32; 4]) {
    let (cw, ch) = canvas.dimensions();
    if cw == 0 || ch == 0 || x >= cw || y >= ch {
        return;
    }
    let x1 = x.saturating_add(w).min(cw - 1);
    let y1 = y.saturating_add(h).min(ch - 1);

    for px in x..=x1 {
        canvas.put_pixel(px, y, OUTLINE);
        if y.saturating_add(h) < ch {
            canvas.put_pixel(px, y1, OUTLINE);
        }
    }
    for py in y..=y1 {
        canvas.put_pixel(x, py, OUTLINE);
        if x.saturating_add(w) < cw {
            canvas.put_pixel(x1, py, OUTLINE);
        }
    }
}
