//! Image preprocessing ahead of OCR.
//!
//! Two strategies share one entry point (`CertificatePreprocessor`):
//!
//! - **Standard**: RGB, autocontrast, proportional downscale of wide images.
//!   Used by the hybrid extraction path.
//! - **Strict**: grayscale, bilateral denoise, adaptive Gaussian binarization,
//!   rotation correction from the minimum-area rectangle around the ink.
//!   Used by the box-level OCR tool.
//!
//! Both apply EXIF orientation first: phone photos of certificates usually
//! carry a rotation tag instead of rotated pixels.

use std::cmp::Ordering;
use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageOutputFormat, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::PreprocessedImage;
use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// Maximum input image size (in bytes) before rejecting.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024; // 50 MB

/// Images wider than this are downscaled by the standard strategy.
pub const DEFAULT_MAX_WIDTH: u32 = 1600;

/// Bilateral filter: 9-pixel diameter, sigma 75 in both colour and space.
const BILATERAL_RADIUS: u32 = 4;
const BILATERAL_SIGMA_COLOR: f32 = 75.0;
const BILATERAL_SIGMA_SPACE: f32 = 75.0;

/// Adaptive threshold: 31x31 Gaussian neighbourhood, offset 10.
const THRESHOLD_BLOCK: u32 = 31;
const THRESHOLD_C: f32 = 10.0;

/// Pixels darker than this count as ink for skew estimation.
const INK_THRESHOLD: u8 = 128;

/// Skew below this (degrees) is left alone.
const MIN_DESKEW_DEGREES: f64 = 0.05;

// ═══════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════

/// Which preprocessing chain to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessStrategy {
    Standard,
    Strict,
}

impl PreprocessStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub strategy: PreprocessStrategy,
    /// Standard strategy only.
    pub max_width: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            strategy: PreprocessStrategy::Standard,
            max_width: DEFAULT_MAX_WIDTH,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// ImagePreprocessor trait
// ═══════════════════════════════════════════════════════════

/// Turns raw upload bytes into an OCR-ready image.
///
/// Undecodable input is `ExtractionError::ImageDecode`, which is fatal for
/// the request.
pub trait ImagePreprocessor: Send + Sync {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<PreprocessedImage, ExtractionError>;
}

/// Production preprocessor, strategy chosen by config.
pub struct CertificatePreprocessor {
    config: PreprocessConfig,
}

impl CertificatePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn standard() -> Self {
        Self::new(PreprocessConfig::default())
    }

    pub fn strict() -> Self {
        Self::new(PreprocessConfig {
            strategy: PreprocessStrategy::Strict,
            ..PreprocessConfig::default()
        })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }
}

impl ImagePreprocessor for CertificatePreprocessor {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<PreprocessedImage, ExtractionError> {
        validate_image_bytes(image_bytes)?;

        let img = image::load_from_memory(image_bytes)
            .map_err(|e| ExtractionError::ImageDecode(e.to_string()))?;
        let (orig_w, orig_h) = img.dimensions();
        let img = apply_orientation(img, read_exif_orientation(image_bytes));

        let (png_bytes, dims) = match self.config.strategy {
            PreprocessStrategy::Standard => {
                let rgb = standard_pipeline(img.to_rgb8(), self.config.max_width);
                let dims = rgb.dimensions();
                (encode_png(&DynamicImage::ImageRgb8(rgb))?, dims)
            }
            PreprocessStrategy::Strict => {
                let gray = strict_pipeline(&img.to_luma8());
                let dims = gray.dimensions();
                (encode_png(&DynamicImage::ImageLuma8(gray))?, dims)
            }
        };

        debug!(
            strategy = ?self.config.strategy,
            original = format!("{orig_w}x{orig_h}"),
            output = format!("{}x{}", dims.0, dims.1),
            png_size = png_bytes.len(),
            "Image preprocessed for OCR"
        );

        PreprocessedImage::new(png_bytes, dims, (orig_w, orig_h))
    }
}

// ═══════════════════════════════════════════════════════════
// Standard strategy
// ═══════════════════════════════════════════════════════════

/// Autocontrast, then downscale if wider than `max_width`.
pub fn standard_pipeline(mut rgb: RgbImage, max_width: u32) -> RgbImage {
    autocontrast(&mut rgb);
    downscale_to_width(rgb, max_width)
}

/// Stretch each channel independently so its darkest value maps to 0 and
/// its brightest to 255. Flat channels are left unchanged.
pub fn autocontrast(img: &mut RgbImage) {
    let mut lo = [u8::MAX; 3];
    let mut hi = [u8::MIN; 3];
    for p in img.pixels() {
        for c in 0..3 {
            lo[c] = lo[c].min(p.0[c]);
            hi[c] = hi[c].max(p.0[c]);
        }
    }

    let luts: Vec<[u8; 256]> = (0..3)
        .map(|c| {
            let mut lut = [0u8; 256];
            for (v, slot) in lut.iter_mut().enumerate() {
                *slot = if hi[c] <= lo[c] {
                    v as u8
                } else {
                    let scale = 255.0 / (hi[c] - lo[c]) as f32;
                    let offset = -(lo[c] as f32) * scale;
                    (v as f32 * scale + offset).clamp(0.0, 255.0) as u8
                };
            }
            lut
        })
        .collect();

    for p in img.pixels_mut() {
        for c in 0..3 {
            p.0[c] = luts[c][p.0[c] as usize];
        }
    }
}

/// Proportional Lanczos3 downscale to `max_width`. Narrower images pass through.
pub fn downscale_to_width(img: RgbImage, max_width: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w <= max_width || max_width == 0 {
        return img;
    }
    let ratio = max_width as f64 / w as f64;
    let new_h = ((h as f64 * ratio) as u32).max(1);
    image::imageops::resize(&img, max_width, new_h, FilterType::Lanczos3)
}

// ═══════════════════════════════════════════════════════════
// Strict strategy
// ═══════════════════════════════════════════════════════════

/// Denoise, binarize, deskew.
pub fn strict_pipeline(gray: &GrayImage) -> GrayImage {
    let denoised = bilateral_filter_gray(
        gray,
        BILATERAL_RADIUS,
        BILATERAL_SIGMA_COLOR,
        BILATERAL_SIGMA_SPACE,
    );
    let binary = adaptive_threshold_gaussian(&denoised, THRESHOLD_BLOCK, THRESHOLD_C);
    deskew(&binary)
}

/// Edge-preserving bilateral filter on a grayscale image.
///
/// Circular window of `radius`; weights combine spatial distance and
/// intensity difference. Borders replicate the edge pixel.
pub fn bilateral_filter_gray(
    img: &GrayImage,
    radius: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let (w, h) = img.dimensions();
    let r = radius as i64;

    let mut spatial = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = (dx * dx + dy * dy) as f32;
            if d2 > (r * r) as f32 {
                continue;
            }
            spatial.push((dx, dy, (-d2 / (2.0 * sigma_space * sigma_space)).exp()));
        }
    }

    let color_lut: Vec<f32> = (0..256)
        .map(|d| {
            let d = d as f32;
            (-(d * d) / (2.0 * sigma_color * sigma_color)).exp()
        })
        .collect();

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let center = img.get_pixel(x, y).0[0];
            let mut sum = 0.0f32;
            let mut weight_sum = 0.0f32;

            for &(dx, dy, spatial_weight) in &spatial {
                let nx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                let ny = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                let v = img.get_pixel(nx, ny).0[0];
                let diff = (v as i16 - center as i16).unsigned_abs() as usize;
                let weight = spatial_weight * color_lut[diff];
                sum += weight * v as f32;
                weight_sum += weight;
            }

            let value = if weight_sum > 0.0 {
                (sum / weight_sum).round().clamp(0.0, 255.0) as u8
            } else {
                center
            };
            out.put_pixel(x, y, Luma([value]));
        }
    }
    out
}

/// Adaptive threshold against a Gaussian-weighted local mean.
///
/// A pixel becomes white (255) when it is brighter than its neighbourhood
/// mean minus `c`, black (0) otherwise. Sigma follows the usual
/// block-size rule `0.3 * ((block - 1) / 2 - 1) + 0.8`.
pub fn adaptive_threshold_gaussian(img: &GrayImage, block_size: u32, c: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let block = block_size.max(3) | 1;
    let sigma = 0.3 * ((block as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let kernel = gaussian_kernel(block as usize, sigma);
    let mean = separable_blur(img, &kernel);

    GrayImage::from_fn(w, h, |x, y| {
        let threshold = mean[(y * w + x) as usize] - c;
        if img.get_pixel(x, y).0[0] as f32 > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    let half = (size / 2) as i64;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= total;
    }
    kernel
}

/// Horizontal then vertical pass with replicated borders.
fn separable_blur(img: &GrayImage, kernel: &[f32]) -> Vec<f32> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let half = (kernel.len() / 2) as i64;
    let mut horizontal = vec![0.0f32; (w * h) as usize];
    let mut out = vec![0.0f32; (w * h) as usize];

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = (x + k as i64 - half).clamp(0, w - 1);
                acc += weight * img.get_pixel(sx as u32, y as u32).0[0] as f32;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = (y + k as i64 - half).clamp(0, h - 1);
                acc += weight * horizontal[(sy * w + x) as usize];
            }
            out[(y * w + x) as usize] = acc;
        }
    }
    out
}

/// Rotate a binarized page so its ink block is axis-aligned.
pub fn deskew(binary: &GrayImage) -> GrayImage {
    match estimate_skew_angle(binary) {
        Some(angle) if angle.abs() >= MIN_DESKEW_DEGREES => {
            debug!(angle_degrees = angle, "Correcting page rotation");
            rotate_about_center(binary, angle)
        }
        _ => binary.clone(),
    }
}

/// Estimate skew (degrees, in `(-45, 45]`) as the angle of the minimum-area
/// rectangle enclosing all ink pixels.
///
/// Only the leftmost and rightmost ink pixel of each row can lie on the
/// convex hull, so only those are collected. Returns `None` when there is
/// too little ink to form a hull.
pub fn estimate_skew_angle(img: &GrayImage) -> Option<f64> {
    let (w, h) = img.dimensions();
    let mut points = Vec::new();

    for y in 0..h {
        let mut first = None;
        let mut last = None;
        for x in 0..w {
            if img.get_pixel(x, y).0[0] < INK_THRESHOLD {
                first.get_or_insert(x);
                last = Some(x);
            }
        }
        if let (Some(a), Some(b)) = (first, last) {
            points.push((a as f64, y as f64));
            if b != a {
                points.push((b as f64, y as f64));
            }
        }
    }

    let hull = convex_hull(points);
    if hull.len() < 3 {
        return None;
    }
    Some(min_area_rect_angle(&hull))
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Andrew's monotone chain. Collinear points are dropped.
fn convex_hull(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &points {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in points.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Rotating calipers: the minimum-area enclosing rectangle has one side
/// collinear with a hull edge.
fn min_area_rect_angle(hull: &[(f64, f64)]) -> f64 {
    let n = hull.len();
    let mut best_area = f64::INFINITY;
    let mut best_angle = 0.0f64;

    for i in 0..n {
        let (p, q) = (hull[i], hull[(i + 1) % n]);
        let (dx, dy) = (q.0 - p.0, q.1 - p.1);
        let len = (dx * dx + dy * dy).sqrt();
        if len == 0.0 {
            continue;
        }
        let (ux, uy) = (dx / len, dy / len);

        let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
        for &(x, y) in hull {
            let u = x * ux + y * uy;
            let v = -x * uy + y * ux;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if area < best_area {
            best_area = area;
            best_angle = uy.atan2(ux);
        }
    }

    normalize_quarter_turn(best_angle.to_degrees())
}

/// A rectangle's orientation is only defined modulo 90 degrees.
fn normalize_quarter_turn(degrees: f64) -> f64 {
    let mut a = degrees % 90.0;
    if a > 45.0 {
        a -= 90.0;
    }
    if a <= -45.0 {
        a += 90.0;
    }
    a
}

/// Rotate content by `-angle_degrees` about the image center (bilinear,
/// replicated borders), undoing a skew of `angle_degrees`.
pub fn rotate_about_center(img: &GrayImage, angle_degrees: f64) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let (cx, cy) = ((w as f64 - 1.0) / 2.0, (h as f64 - 1.0) / 2.0);
    let (max_x, max_y) = (w as f64 - 1.0, h as f64 - 1.0);

    GrayImage::from_fn(w, h, |x, y| {
        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
        let sx = (cx + dx * cos - dy * sin).clamp(0.0, max_x);
        let sy = (cy + dx * sin + dy * cos).clamp(0.0, max_y);

        let (x0, y0) = (sx.floor() as u32, sy.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
        let (fx, fy) = (sx - x0 as f64, sy - y0 as f64);

        let p = |px: u32, py: u32| img.get_pixel(px, py).0[0] as f64;
        let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
        let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
        Luma([(top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8])
    })
}

// ═══════════════════════════════════════════════════════════
// EXIF orientation
// ═══════════════════════════════════════════════════════════

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

/// Reject clearly invalid input before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::ImageDecode("image data is empty".into()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageDecode(format!(
            "image data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageEncode(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

/// Passthrough preprocessor for tests: wraps the input bytes unchanged.
pub struct MockImagePreprocessor;

impl ImagePreprocessor for MockImagePreprocessor {
    fn preprocess(&self, image_bytes: &[u8]) -> Result<PreprocessedImage, ExtractionError> {
        validate_image_bytes(image_bytes)?;
        PreprocessedImage::new(image_bytes.to_vec(), (0, 0), (0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn make_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        encode_png(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    fn decode(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory(bytes).unwrap()
    }

    /// White canvas with a black `2*half_w x 2*half_h` rectangle rotated by
    /// `angle` degrees about (cx, cy).
    fn rotated_block(size: u32, half_w: f64, half_h: f64, angle: f64) -> GrayImage {
        let c = size as f64 / 2.0;
        let (sin, cos) = angle.to_radians().sin_cos();
        GrayImage::from_fn(size, size, |x, y| {
            let (dx, dy) = (x as f64 - c, y as f64 - c);
            let qx = dx * cos + dy * sin;
            let qy = -dx * sin + dy * cos;
            if qx.abs() <= half_w && qy.abs() <= half_h {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    // ── Standard strategy ──

    #[test]
    fn standard_keeps_narrow_image_size() {
        let pre = CertificatePreprocessor::standard();
        let out = pre.preprocess(&make_png(400, 300, [200, 200, 200])).unwrap();
        assert_eq!((out.width, out.height), (400, 300));
        assert_eq!((out.original_width, out.original_height), (400, 300));
    }

    #[test]
    fn standard_downscales_wide_image_preserving_ratio() {
        let pre = CertificatePreprocessor::standard();
        let out = pre.preprocess(&make_png(2000, 1000, [90, 90, 90])).unwrap();
        assert_eq!((out.width, out.height), (1600, 800));
        let decoded = decode(&out.png_bytes);
        assert_eq!(decoded.dimensions(), (1600, 800));
    }

    #[test]
    fn custom_max_width_respected() {
        let pre = CertificatePreprocessor::new(PreprocessConfig {
            strategy: PreprocessStrategy::Standard,
            max_width: 100,
        });
        let out = pre.preprocess(&make_png(300, 150, [10, 10, 10])).unwrap();
        assert_eq!((out.width, out.height), (100, 50));
    }

    #[test]
    fn autocontrast_stretches_range() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([100, 100, 100]));
        img.put_pixel(1, 0, Rgb([150, 150, 150]));
        autocontrast(&mut img);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255]);
    }

    #[test]
    fn autocontrast_flat_image_unchanged() {
        let mut img = RgbImage::from_pixel(3, 3, Rgb([42, 42, 42]));
        autocontrast(&mut img);
        assert!(img.pixels().all(|p| p.0 == [42, 42, 42]));
    }

    #[test]
    fn output_is_rgb_png() {
        let pre = CertificatePreprocessor::standard();
        let out = pre.preprocess(&make_png(20, 20, [1, 2, 3])).unwrap();
        assert!(matches!(decode(&out.png_bytes), DynamicImage::ImageRgb8(_)));
    }

    // ── Errors ──

    #[test]
    fn corrupt_bytes_fail_with_decode_error() {
        let pre = CertificatePreprocessor::standard();
        let result = pre.preprocess(b"definitely not an image, just some text bytes");
        assert!(matches!(result, Err(ExtractionError::ImageDecode(_))));
    }

    #[test]
    fn empty_bytes_fail_with_decode_error() {
        let pre = CertificatePreprocessor::standard();
        assert!(matches!(
            pre.preprocess(&[]),
            Err(ExtractionError::ImageDecode(_))
        ));
    }

    #[test]
    fn truncated_png_fails_with_decode_error() {
        let png = make_png(50, 50, [0, 0, 0]);
        let pre = CertificatePreprocessor::standard();
        assert!(matches!(
            pre.preprocess(&png[..png.len() / 2]),
            Err(ExtractionError::ImageDecode(_))
        ));
    }

    // ── Temporary artifact ──

    #[test]
    fn artifact_holds_png_until_dropped() {
        let pre = CertificatePreprocessor::standard();
        let out = pre.preprocess(&make_png(10, 10, [5, 5, 5])).unwrap();
        let path = out.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), out.png_bytes);
        drop(out);
        assert!(!path.exists());
    }

    // ── Strict strategy ──

    #[test]
    fn strict_output_is_binary() {
        let mut img = RgbImage::from_pixel(80, 60, Rgb([230, 230, 230]));
        for x in 20..60 {
            for y in 28..32 {
                img.put_pixel(x, y, Rgb([20, 20, 20]));
            }
        }
        let bytes = encode_png(&DynamicImage::ImageRgb8(img)).unwrap();
        let out = CertificatePreprocessor::strict().preprocess(&bytes).unwrap();
        let gray = decode(&out.png_bytes).to_luma8();
        assert_eq!(gray.dimensions(), (80, 60));
        assert!(gray.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert!(gray.pixels().any(|p| p.0[0] == 0), "text stroke should survive");
    }

    #[test]
    fn adaptive_threshold_uniform_is_white() {
        let img = GrayImage::from_pixel(40, 40, Luma([128]));
        let out = adaptive_threshold_gaussian(&img, 31, 10.0);
        assert!(out.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn adaptive_threshold_dark_stroke_is_black() {
        let mut img = GrayImage::from_pixel(40, 40, Luma([220]));
        for x in 5..35 {
            img.put_pixel(x, 20, Luma([30]));
        }
        let out = adaptive_threshold_gaussian(&img, 31, 10.0);
        assert_eq!(out.get_pixel(20, 20).0[0], 0);
        assert_eq!(out.get_pixel(20, 5).0[0], 255);
    }

    #[test]
    fn bilateral_preserves_flat_regions_and_edges() {
        let img = GrayImage::from_fn(30, 30, |x, _| if x < 15 { Luma([10]) } else { Luma([240]) });
        let out = bilateral_filter_gray(&img, 4, 75.0, 75.0);
        assert_eq!(out.get_pixel(2, 10).0[0], 10);
        assert_eq!(out.get_pixel(27, 10).0[0], 240);
        // Edge stays sharp: neighbours across the step differ strongly.
        let left = out.get_pixel(14, 10).0[0] as i32;
        let right = out.get_pixel(15, 10).0[0] as i32;
        assert!(right - left > 150, "edge blurred: {left} vs {right}");
    }

    #[test]
    fn skew_of_rotated_block_is_recovered() {
        let img = rotated_block(200, 70.0, 15.0, 10.0);
        let angle = estimate_skew_angle(&img).unwrap();
        assert!((angle - 10.0).abs() < 1.0, "estimated {angle}");

        let img = rotated_block(200, 70.0, 15.0, -7.0);
        let angle = estimate_skew_angle(&img).unwrap();
        assert!((angle + 7.0).abs() < 1.0, "estimated {angle}");
    }

    #[test]
    fn deskew_straightens_block() {
        let img = rotated_block(200, 70.0, 15.0, 8.0);
        let straightened = deskew(&img);
        let residual = estimate_skew_angle(&straightened).unwrap();
        assert!(residual.abs() < 1.0, "residual skew {residual}");
    }

    #[test]
    fn skew_none_without_ink() {
        let img = GrayImage::from_pixel(50, 50, Luma([255]));
        assert!(estimate_skew_angle(&img).is_none());
        assert_eq!(deskew(&img), img);
    }

    #[test]
    fn quarter_turn_normalization() {
        assert!((normalize_quarter_turn(100.0) - 10.0).abs() < 1e-9);
        assert!((normalize_quarter_turn(-80.0) - 10.0).abs() < 1e-9);
        assert!((normalize_quarter_turn(45.0) - 45.0).abs() < 1e-9);
        assert!((normalize_quarter_turn(-45.0) - 45.0).abs() < 1e-9);
        assert!((normalize_quarter_turn(180.0)).abs() < 1e-9);
    }

    #[test]
    fn zero_rotation_is_identity() {
        let img = rotated_block(60, 20.0, 5.0, 0.0);
        assert_eq!(rotate_about_center(&img, 0.0), img);
    }

    // ── EXIF ──

    #[test]
    fn no_exif_defaults_to_normal() {
        assert_eq!(read_exif_orientation(&make_png(4, 4, [0, 0, 0])), 1);
        assert_eq!(read_exif_orientation(b"garbage"), 1);
    }

    #[test]
    fn orientation_six_rotates_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 10));
        assert_eq!(apply_orientation(img, 6).dimensions(), (10, 40));
    }

    #[test]
    fn strategy_parse() {
        assert_eq!(PreprocessStrategy::parse("Strict"), Some(PreprocessStrategy::Strict));
        assert_eq!(PreprocessStrategy::parse(" standard "), Some(PreprocessStrategy::Standard));
        assert_eq!(PreprocessStrategy::parse("fancy"), None);
    }
}
