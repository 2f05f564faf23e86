//! Custom error types for jwtfuzz
//!
//! Core operations return these typed errors as values. The CLI and the
//! dispatch driver wrap them with `anyhow` context at the edge.

use thiserror::Error;

use crate::http::MessageRegion;
use crate::jwt::Segment;

/// Main error type for jwtfuzz operations
#[derive(Error, Debug)]
pub enum JwtFuzzError {
    /// Token text did not decode into three valid segments
    #[error("Malformed token: {0}")]
    MalformedToken(#[from] MalformedTokenError),

    /// A substituted claim value could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// HTTP message errors
    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dispatch errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The message contained no JWT-shaped substrings
    #[error("No tokens found in message")]
    NoTokensFound,
}

/// Token text that cannot be decoded as a JWT
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedTokenError {
    #[error("expected 3 segments, got {found}")]
    SegmentCount { found: usize },

    #[error("{segment} segment is not valid base64url: {reason}")]
    InvalidBase64 { segment: Segment, reason: String },

    #[error("{segment} segment is not valid JSON: {reason}")]
    InvalidJson { segment: Segment, reason: String },

    #[error("{segment} segment is not a JSON object")]
    NotAnObject { segment: Segment },
}

/// Claim substitution that cannot be re-encoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("payload '{value}' is not a JSON value: {reason}")]
    InvalidJsonValue { value: String, reason: String },

    #[error("failed to serialize {segment} claims: {reason}")]
    Serialize { segment: Segment, reason: String },

    #[error("claim '{claim}' is not present in the {segment} segment")]
    MissingClaim { segment: Segment, claim: String },

    #[error("rebuilt {segment} segment does not decode: {source}")]
    Rebuild {
        segment: Segment,
        #[source]
        source: MalformedTokenError,
    },
}

/// HTTP message errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("span {start}..{end} is outside the {region} text (length {len})")]
    SpanOutOfBounds {
        region: MessageRegion,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("offset {offset} is not on a character boundary in the {region} text")]
    NotCharBoundary { region: MessageRegion, offset: usize },

    #[error("Missing request line")]
    MissingRequestLine,

    #[error("Invalid request line: {0}")]
    InvalidRequestLine(String),

    #[error("Missing Host header for relative target: {0}")]
    MissingHost(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {path}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {field} - {reason}")]
    ValidationError { field: String, reason: String },
}

/// Dispatch errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl JwtFuzzError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            JwtFuzzError::MalformedToken(e) => format!("Token skipped: {}", e.user_hint()),
            JwtFuzzError::Encoding(e) => format!("Case skipped: {}", e.user_hint()),
            JwtFuzzError::Message(e) => format!("Request problem: {}", e.user_hint()),
            JwtFuzzError::Config(e) => format!("Configuration problem: {}", e.user_hint()),
            JwtFuzzError::Dispatch(e) => format!("Network issue: {}", e.user_hint()),
            JwtFuzzError::NoTokensFound => {
                "No JWT-shaped values were found in the request header or body.".into()
            }
        }
    }
}

/// Trait for providing user-friendly hints
pub trait UserHint {
    fn user_hint(&self) -> String;
}

impl UserHint for MalformedTokenError {
    fn user_hint(&self) -> String {
        match self {
            MalformedTokenError::SegmentCount { found } => {
                format!("A JWT has exactly 3 dot-separated parts, this value has {}.", found)
            }
            MalformedTokenError::InvalidBase64 { segment, .. } => {
                format!("The {} part is not base64url text, so this is probably not a JWT.", segment)
            }
            _ => self.to_string(),
        }
    }
}

impl UserHint for EncodingError {
    fn user_hint(&self) -> String {
        match self {
            EncodingError::InvalidJsonValue { value, .. } => {
                format!("'{}' is not a JSON literal. Quote strings or switch to string claim mode.", value)
            }
            _ => self.to_string(),
        }
    }
}

impl UserHint for MessageError {
    fn user_hint(&self) -> String {
        match self {
            MessageError::MissingRequestLine | MessageError::InvalidRequestLine(_) => {
                "The request file must start with a line like 'GET /path HTTP/1.1'.".into()
            }
            MessageError::MissingHost(target) => {
                format!("'{}' is relative. Add a Host header or use an absolute URL.", target)
            }
            _ => self.to_string(),
        }
    }
}

impl UserHint for ConfigError {
    fn user_hint(&self) -> String {
        match self {
            ConfigError::ReadError { path, .. } => {
                format!("Could not read '{}'. Check if the file exists and you have read permissions.", path)
            }
            ConfigError::ParseError(_) => {
                "The configuration file has invalid syntax. Check for TOML formatting errors.".into()
            }
            ConfigError::ValidationError { field, reason } => {
                format!("Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl UserHint for DispatchError {
    fn user_hint(&self) -> String {
        match self {
            DispatchError::Timeout(ms) => {
                format!("Request timed out after {}ms. The server may be slow or unresponsive.", ms)
            }
            DispatchError::InvalidUrl(url) => {
                format!("'{}' is not a valid URL. Check the request target and Host header.", url)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_for_segment_count() {
        let err = JwtFuzzError::from(MalformedTokenError::SegmentCount { found: 2 });
        assert!(err.user_message().contains("exactly 3"));
    }

    #[test]
    fn test_encoding_error_display() {
        let err = EncodingError::MissingClaim {
            segment: Segment::Payload,
            claim: "sub".to_string(),
        };
        assert_eq!(err.to_string(), "claim 'sub' is not present in the payload segment");
    }
}
