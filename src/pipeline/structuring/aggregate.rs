//! Reassembles one answer string from a fragmented model reply.
//!
//! Fragments are concatenated strictly in arrival order with no separator.
//! Nothing is dropped, reordered, or deduplicated.

use super::types::{ModelResponse, ResponseFragment};

/// Append one fragment's contribution to `out`.
fn push_fragment(out: &mut String, fragment: &ResponseFragment) {
    match fragment {
        ResponseFragment::Answer(text) => out.push_str(text),
        ResponseFragment::Record(line) => out.push_str(line),
        ResponseFragment::Raw(bytes) => out.push_str(&String::from_utf8_lossy(bytes)),
    }
}

/// Aggregate a sequence of fragments into a single trimmed string.
pub fn aggregate_fragments(fragments: &[ResponseFragment]) -> String {
    let mut out = String::new();
    for fragment in fragments {
        push_fragment(&mut out, fragment);
    }
    out.trim().to_string()
}

/// Aggregate a complete model reply.
///
/// A reply with no fragments falls back to its whole raw body.
pub fn aggregate_response(response: &ModelResponse) -> String {
    if response.fragments.is_empty() {
        return String::from_utf8_lossy(&response.body).trim().to_string();
    }
    aggregate_fragments(&response.fragments)
}
