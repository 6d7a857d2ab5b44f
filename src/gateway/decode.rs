//! Structured payload extraction from model replies.
//!
//! Models are asked for bare JSON but regularly wrap it in a ```json fence,
//! a bare fence, or a sentence of prose. The decoder locates the first
//! balanced JSON object (inside the fence when there is one) and
//! deserializes it.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// No JSON object could be located in the reply.
    #[error("no JSON object in model reply")]
    NoPayload,
    /// An object was found but did not match the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Decode the structured payload in a model reply.
pub fn decode<T: DeserializeOwned>(reply: &str) -> Result<T, DecodeError> {
    let payload = extract_payload(reply).ok_or(DecodeError::NoPayload)?;
    serde_json::from_str(payload).map_err(|e| DecodeError::Malformed(e.to_string()))
}

/// Locate the JSON object in a reply, preferring fenced content.
pub fn extract_payload(reply: &str) -> Option<&str> {
    let region = fenced_block(reply).unwrap_or(reply);
    balanced_object(region).or_else(|| balanced_object(reply))
}

/// Content of the first ``` fence, with an optional language tag stripped.
fn fenced_block(reply: &str) -> Option<&str> {
    let open = reply.find("```")?;
    let after = &reply[open + 3..];
    // Skip the language tag (```json, ```JSON, ...) up to the end of the line.
    let body_start = match after.find('\n') {
        Some(nl) if after[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => nl + 1,
        _ => 0,
    };
    let body = &after[body_start..];
    let close = body.find("```").unwrap_or(body.len());
    Some(body[..close].trim())
}

/// The first `{...}` with balanced braces, ignoring braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
