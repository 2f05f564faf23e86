//! HTTP response types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code
    pub status: u16,

    /// Response headers
    pub headers: HashMap<String, String>,

    /// Response body, possibly truncated to the configured limit
    pub body: String,

    /// Size of the full response body in bytes
    pub size: usize,

    /// Response time in milliseconds
    pub duration_ms: u64,
}

/// Cut `text` to at most `max` bytes on a character boundary
pub(crate) fn truncate_body(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
