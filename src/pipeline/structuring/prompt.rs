//! Prompt contract for both extraction paths.
//!
//! Both templates list the exact schema keys, require `null` for absent
//! fields, and forbid inventing values. Rendering performs no I/O.

use base64::Engine as _;

use super::types::CertificateField;

/// Render the schema keys as `"A", "B", ...` in schema order.
pub fn schema_key_list() -> String {
    CertificateField::ALL
        .iter()
        .map(|f| format!("\"{}\"", f.key()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Prompt for the text path: OCR text is embedded verbatim.
pub fn build_text_prompt(ocr_text: &str) -> String {
    let keys = schema_key_list();
    format!(
        r#"You are an expert document parser. Extract EXACTLY the following JSON object and nothing else.
Keys (use these exact keys): {keys}
If a field is not present in the text, set its value to null.
Do NOT invent or guess values not present in the text.

Certificate text:
"""{ocr_text}"""

Return valid JSON only.
"#
    )
}

/// Prompt and image payload for the vision path.
#[derive(Debug, Clone)]
pub struct VisionPrompt {
    pub prompt: String,
    /// Base64-encoded original image bytes.
    pub images: Vec<String>,
}

/// Prompt for the vision path: refers to the attached image.
pub fn build_vision_prompt(image_bytes: &[u8]) -> VisionPrompt {
    let keys = schema_key_list();
    let prompt = format!(
        r#"You are an expert document analyzer. Given the image, extract EXACTLY the following JSON object and nothing else.
Keys (use these exact keys): {keys}
If a field is not present in the image, set its value to null.
Do NOT invent or guess; if unsure, set the field to null.
Return valid JSON only.
"#
    );
    let encoded = base64::engine::general_purpose::STANDARD.encode(image_bytes);

    VisionPrompt {
        prompt,
        images: vec![encoded],
    }
}
