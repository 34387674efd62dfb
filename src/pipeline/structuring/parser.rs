//! Permissive JSON object extraction from free-form model output.
//!
//! Models wrap their answer in prose, code fences, or quasi-JSON. This parser
//! never fails loudly: anything it cannot make sense of is "no object found".

use serde_json::Value;

/// Locate the first balanced `{ ... }` span in `text`.
///
/// Depth counting starts at the first `{`; the span ends where depth first
/// returns to zero. Braces inside double-quoted string literals (with `\`
/// escapes) do not count.
pub fn find_first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset;
                    return Some(&text[start..=end]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract and parse the first JSON object in `text`.
///
/// On a parse failure the candidate is retried once with every single quote
/// replaced by a double quote. Returns `None` for empty text, text without
/// `{`, unbalanced braces, or a candidate that fails both attempts.
pub fn extract_first_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let candidate = find_first_object(text)?;

    match serde_json::from_str::<Value>(candidate) {
        Ok(v) => Some(v),
        Err(first) => {
            let fixed = candidate.replace('\'', "\"");
            match serde_json::from_str::<Value>(&fixed) {
                Ok(v) => Some(v),
                Err(second) => {
                    tracing::debug!(
                        first_error = %first,
                        retry_error = %second,
                        candidate_len = candidate.len(),
                        "No parseable JSON object in model output"
                    );
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_object() {
        assert_eq!(extract_first_json("{\"a\":1}"), Some(json!({"a": 1})));
    }

    #[test]
    fn object_inside_noise() {
        assert_eq!(
            extract_first_json("noise {\"a\":1} trailing"),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn single_quoted_quasi_json() {
        assert_eq!(extract_first_json("{'a': 1}"), Some(json!({"a": 1})));
    }

    #[test]
    fn no_braces() {
        assert_eq!(extract_first_json("no braces here"), None);
    }

    #[test]
    fn unbalanced() {
        assert_eq!(extract_first_json("{unbalanced"), None);
    }

    #[test]
    fn empty_and_whitespace() {
        assert_eq!(extract_first_json(""), None);
        assert_eq!(extract_first_json("   \n"), None);
    }

    #[test]
    fn nested_objects() {
        let text = "Result: {\"a\":{\"b\":{\"c\":2}}} done";
        assert_eq!(extract_first_json(text), Some(json!({"a": {"b": {"c": 2}}})));
    }

    #[test]
    fn takes_first_of_two_objects() {
        let text = "{\"first\":1} and {\"second\":2}";
        assert_eq!(extract_first_json(text), Some(json!({"first": 1})));
    }

    #[test]
    fn fenced_code_block() {
        let text = "Here you go:\n```json\n{\"Full Name\": \"John Doe\"}\n```";
        assert_eq!(
            extract_first_json(text),
            Some(json!({"Full Name": "John Doe"}))
        );
    }

    #[test]
    fn brace_inside_string_value() {
        let text = r#"{"Certificate ID": "ID-{42}", "Full Name": "A } B"}"#;
        assert_eq!(
            extract_first_json(text),
            Some(json!({"Certificate ID": "ID-{42}", "Full Name": "A } B"}))
        );
    }

    #[test]
    fn escaped_quote_inside_string() {
        let text = r#"{"t": "say \"}\" loud"}"#;
        assert_eq!(extract_first_json(text), Some(json!({"t": "say \"}\" loud"})));
    }

    #[test]
    fn apostrophe_in_valid_json_untouched() {
        let text = r#"{"Full Name": "Conan O'Brien"}"#;
        assert_eq!(
            extract_first_json(text),
            Some(json!({"Full Name": "Conan O'Brien"}))
        );
    }

    #[test]
    fn balanced_but_invalid_is_none() {
        assert_eq!(extract_first_json("{not json at all}"), None);
    }

    #[test]
    fn first_candidate_invalid_does_not_scan_further() {
        assert_eq!(extract_first_json("{bad} {\"a\":1}"), None);
    }

    #[test]
    fn stray_closing_brace_before_open_is_ignored() {
        assert_eq!(extract_first_json("} {\"a\":1}"), Some(json!({"a": 1})));
    }

    #[test]
    fn find_span_returns_exact_slice() {
        assert_eq!(find_first_object("xx{\"k\":{}}yy"), Some("{\"k\":{}}"));
        assert_eq!(find_first_object("{"), None);
    }
}
