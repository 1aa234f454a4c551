//! JSON extraction from model output
//!
//! Models wrap JSON in prose or code fences, or truncate it. These helpers
//! find the first object that parses and leave the fallback decision to the
//! caller.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::AgentError;

/// Find a JSON object or array in model output
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced) {
            return Some(value);
        }
    }

    [('{', '}'), ('[', ']')].iter().find_map(|(open, close)| {
        let start = trimmed.find(*open)?;
        let end = trimmed.rfind(*close)?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
    })
}

/// Deserialize the JSON found in model output into `T`
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    let value = extract_json(text)
        .ok_or_else(|| AgentError::Parse(format!("no JSON in output: {}", preview(text))))?;
    serde_json::from_value(value).map_err(|e| AgentError::Parse(e.to_string()))
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip a language tag such as ```json
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}
