use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("fenced json pattern is valid"));

/// Pick the JSON payload out of free-form model output: the first
/// ```json fenced block if there is one, otherwise the whole (trimmed) text.
pub fn extract_json_block(text: &str) -> &str {
    match FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        Some(block) => block.as_str(),
        None => text.trim(),
    }
}

/// Decode model output into `T` after fenced-block extraction.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(extract_json_block(text))
}
