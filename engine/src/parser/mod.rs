//! Reply extraction from the external CLI's output
//!
//! The external tool emits line-delimited JSON on stdout, but the exact
//! shape drifts between versions and some builds interleave plain text.
//! Extraction is therefore a small ordered set of per-line matchers, each
//! returning `Option<String>`, tried in sequence:
//!
//! 1. assistant message objects (`type == "message"`, `role == "assistant"`)
//! 2. function-call output wrappers (`type == "function_call_output"`)
//! 3. bare text lines that are clearly not JSON
//!
//! The entry point is total: any input, including empty strings and binary
//! garbage, produces a usable reply string. There is no error path.

use serde_json::Value;

/// Reply used when content was collected but reduced to nothing after
/// cleanup.
const EMPTY_REPLY: &str = "Response processed successfully";

/// Reply used when no matcher collected anything and no line qualified as
/// a fallback.
const GENERIC_REPLY: &str = "AI response received successfully";

/// Minimum length for a bare line to qualify as a last-resort reply.
const FALLBACK_MIN_CHARS: usize = 11;

/// Normalize raw CLI output into a single human-readable reply.
pub fn parse_reply(raw: &str) -> String {
    let lines: Vec<&str> = raw.trim().lines().collect();

    let mut collected: Vec<String> = Vec::new();
    for line in &lines {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(text) = extract_line(line) {
            collected.push(text);
        }
    }

    if !collected.is_empty() {
        let reply = unescape(&collected.join("\n")).trim().to_string();
        if reply.is_empty() {
            return EMPTY_REPLY.to_string();
        }
        return reply;
    }

    // Nothing structured matched: fall back to the first line that reads
    // like prose rather than a JSON fragment.
    lines
        .iter()
        .map(|line| line.trim())
        .find(|line| !line.is_empty() && !line.starts_with('{') && line.len() >= FALLBACK_MIN_CHARS)
        .map(|line| line.to_string())
        .unwrap_or_else(|| GENERIC_REPLY.to_string())
}

/// Try each matcher against a single line.
fn extract_line(line: &str) -> Option<String> {
    match serde_json::from_str::<Value>(line) {
        Ok(value) => {
            match_assistant_message(&value).or_else(|| match_function_call_output(&value))
        }
        // Not JSON at all: keep plain-text lines verbatim, drop fragments
        // that look like broken JSON objects.
        Err(_) => {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('{') {
                Some(trimmed.to_string())
            } else {
                None
            }
        }
    }
}

/// Assistant message: `{"type":"message","role":"assistant","content":...}`
/// where content is either a list of structured items or a plain string.
fn match_assistant_message(value: &Value) -> Option<String> {
    if value.get("type")?.as_str()? != "message" || value.get("role")?.as_str()? != "assistant" {
        return None;
    }

    match value.get("content") {
        Some(Value::Array(items)) => {
            let texts: Vec<&str> = items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("output_text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
        Some(Value::String(text)) => Some(text.clone()),
        _ => None,
    }
}

/// Function-call output wrapper: `{"type":"function_call_output","output":...}`.
///
/// The `output` field is sometimes a JSON-encoded string one level deep;
/// unwrap that level when present and take its inner `output` field.
fn match_function_call_output(value: &Value) -> Option<String> {
    if value.get("type")?.as_str()? != "function_call_output" {
        return None;
    }

    match value.get("output") {
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
            Ok(inner) => inner
                .get("output")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string()),
            Err(_) => Some(encoded.trim().to_string()),
        },
        Some(Value::Object(map)) => map
            .get("output")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string()),
        _ => None,
    }
}

/// Reverse the literal escape sequences the CLI leaves in text content.
fn unescape(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\\"", "\"")
}
