use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ollama_types::{GenerationParams, OllamaError};

// ──────────────────────────────────────────────
// Field schema
// ──────────────────────────────────────────────

/// One named field of the certificate schema.
///
/// The same ordered set is rendered into both prompt templates and is the
/// exact key set of every parsed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertificateField {
    FullName,
    CertificateTitle,
    IssuingAuthority,
    DateOfIssue,
    CertificateId,
}

impl CertificateField {
    /// All fields in schema order.
    pub const ALL: [CertificateField; 5] = [
        CertificateField::FullName,
        CertificateField::CertificateTitle,
        CertificateField::IssuingAuthority,
        CertificateField::DateOfIssue,
        CertificateField::CertificateId,
    ];

    /// JSON key used in prompts and in the parsed result.
    pub fn key(&self) -> &'static str {
        match self {
            Self::FullName => "Full Name",
            Self::CertificateTitle => "Certificate Title",
            Self::IssuingAuthority => "Issuing Authority",
            Self::DateOfIssue => "Date of Issue",
            Self::CertificateId => "Certificate ID",
        }
    }
}

/// Parsed certificate fields. Every key is always present; absent values are `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateFields {
    #[serde(rename = "Full Name")]
    pub full_name: Option<String>,
    #[serde(rename = "Certificate Title")]
    pub certificate_title: Option<String>,
    #[serde(rename = "Issuing Authority")]
    pub issuing_authority: Option<String>,
    #[serde(rename = "Date of Issue")]
    pub date_of_issue: Option<String>,
    #[serde(rename = "Certificate ID")]
    pub certificate_id: Option<String>,
}

impl CertificateFields {
    pub fn get(&self, field: CertificateField) -> Option<&str> {
        match field {
            CertificateField::FullName => self.full_name.as_deref(),
            CertificateField::CertificateTitle => self.certificate_title.as_deref(),
            CertificateField::IssuingAuthority => self.issuing_authority.as_deref(),
            CertificateField::DateOfIssue => self.date_of_issue.as_deref(),
            CertificateField::CertificateId => self.certificate_id.as_deref(),
        }
    }

    fn slot(&mut self, field: CertificateField) -> &mut Option<String> {
        match field {
            CertificateField::FullName => &mut self.full_name,
            CertificateField::CertificateTitle => &mut self.certificate_title,
            CertificateField::IssuingAuthority => &mut self.issuing_authority,
            CertificateField::DateOfIssue => &mut self.date_of_issue,
            CertificateField::CertificateId => &mut self.certificate_id,
        }
    }

    /// Project a free-form JSON object onto the fixed schema.
    ///
    /// Keys are matched exactly first, then after normalization (case,
    /// spaces, `_` and `-` ignored), so `full_name` fills "Full Name".
    /// Unknown keys are ignored and missing keys become `null`. Numbers and
    /// booleans are kept in their textual form; nested arrays/objects are not
    /// a valid field value and become `null`.
    ///
    /// Returns `None` only when the value is not an object or is empty.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object().filter(|o| !o.is_empty())?;
        let mut fields = Self::default();

        for field in CertificateField::ALL {
            let key = field.key();
            let wanted = normalize_key(key);
            let found = obj.get(key).or_else(|| {
                obj.iter()
                    .find(|(k, _)| normalize_key(k) == wanted)
                    .map(|(_, v)| v)
            });
            let Some(raw) = found else { continue };

            *fields.slot(field) = match raw {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    tracing::debug!(field = key, "Nested value for scalar field, using null");
                    None
                }
            };
        }

        if fields == Self::default() {
            tracing::debug!(keys = obj.len(), "Model object shares no populated key with the schema");
        }
        Some(fields)
    }
}

/// Lowercase and drop separators: "Certificate ID", "certificate_id" and
/// "certificate-id" all become "certificateid".
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

// ──────────────────────────────────────────────
// Response stream
// ──────────────────────────────────────────────

/// Key of the answer-text field in Ollama generate records.
pub const ANSWER_KEY: &str = "response";

/// One unit of a model's reply stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFragment {
    /// JSON record carrying the answer-text field.
    Answer(String),
    /// JSON record without an answer-text field (verbatim line).
    Record(String),
    /// Bytes that are not a JSON record.
    Raw(Vec<u8>),
}

impl ResponseFragment {
    /// Classify one line of a response body.
    pub fn classify(line: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(line) {
            Ok(Value::Object(map)) => match map.get(ANSWER_KEY) {
                Some(Value::String(answer)) => Self::Answer(answer.clone()),
                _ => Self::Record(String::from_utf8_lossy(line).into_owned()),
            },
            Ok(_) => Self::Record(String::from_utf8_lossy(line).into_owned()),
            Err(_) => Self::Raw(line.to_vec()),
        }
    }
}

/// A complete model reply: the fragments in arrival order plus the raw body.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub fragments: Vec<ResponseFragment>,
    pub body: Vec<u8>,
}

impl ModelResponse {
    /// Split a response body into fragments, one per non-empty line.
    ///
    /// Whitespace-only lines are kept as raw fragments.
    pub fn from_body(body: Vec<u8>) -> Self {
        let fragments = body
            .split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(ResponseFragment::classify)
            .collect();
        Self { fragments, body }
    }
}

// ──────────────────────────────────────────────
// Model capability
// ──────────────────────────────────────────────

/// Generative model client abstraction (allows mocking).
pub trait LlmClient: Send + Sync {
    /// Text-only completion.
    fn complete_text(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ModelResponse, OllamaError>;

    /// Completion with base64-encoded images attached.
    fn complete_vision(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
        params: &GenerationParams,
    ) -> Result<ModelResponse, OllamaError>;
}
