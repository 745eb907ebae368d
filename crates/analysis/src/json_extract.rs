//! JSON Extraction
//!
//! Models wrap JSON in prose or markdown fences more often than they return
//! it bare. Extraction tries, in order: direct parse, fenced code block,
//! first balanced object/array in the text.

use serde_json::Value;

use crate::types::{AnalysisError, AnalysisResult};

/// Extract and parse the first JSON payload in a model response
pub fn extract_json(content: &str) -> AnalysisResult<Value> {
    let trimmed = content.trim();

    // Direct JSON (well-behaved responses)
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let candidate = match find_json_end(trimmed) {
            Some(end) => &trimmed[..end],
            None => trimmed,
        };
        if let Ok(value) = serde_json::from_str(candidate) {
            return Ok(value);
        }
    }

    // ```json fenced block
    if let Some(fenced) = extract_fenced(content) {
        if let Ok(value) = serde_json::from_str(fenced) {
            return Ok(value);
        }
    }

    // First balanced object, then first balanced array, anywhere in the text
    for opener in ['{', '['] {
        if let Some(start) = content.find(opener) {
            if let Some(end) = find_json_end(&content[start..]) {
                if let Ok(value) = serde_json::from_str(&content[start..start + end]) {
                    return Ok(value);
                }
            }
        }
    }

    let preview: String = content.chars().take(200).collect();
    Err(AnalysisError::Parse {
        message: format!("could not extract JSON from response: {preview}"),
    })
}

/// Content of the first fenced code block, with an optional `json` tag
fn extract_fenced(content: &str) -> Option<&str> {
    let start = content.find("```")?;
    let body = &content[start + 3..];
    let body = body.strip_prefix("json").unwrap_or(body);
    let body = body.trim_start_matches(['\r', '\n', ' ']);
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Byte index just past the end of a balanced JSON structure starting at 0
fn find_json_end(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (byte_pos, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(byte_pos + c.len_utf8());
                }
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }

    None
}
