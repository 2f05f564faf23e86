//! Raw HTTP request text split into a header block and a body block

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MessageError;

/// Which text block of a message a span refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRegion {
    Header,
    Body,
}

impl fmt::Display for MessageRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRegion::Header => write!(f, "header"),
            MessageRegion::Body => write!(f, "body"),
        }
    }
}

/// Parsed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a str,
    pub target: &'a str,
    pub version: &'a str,
}

/// HTTP request as two text blocks
///
/// The header block holds the request line, the header fields and the blank
/// line that terminates them. The body block is everything after it.
/// Concatenating both gives back the original request text byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpMessage {
    header: String,
    body: String,
}

impl HttpMessage {
    /// Create a message from its two blocks
    pub fn new(header: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            body: body.into(),
        }
    }

    /// Split raw request text at the first blank line
    pub fn parse(raw: &str) -> Self {
        let split = [raw.find("\r\n\r\n").map(|i| i + 4), raw.find("\n\n").map(|i| i + 2)]
            .into_iter()
            .flatten()
            .min();

        match split {
            Some(at) => Self::new(&raw[..at], &raw[at..]),
            None => Self::new(raw, ""),
        }
    }

    pub fn header_text(&self) -> &str {
        &self.header
    }

    pub fn body_text(&self) -> &str {
        &self.body
    }

    /// Text of one region
    pub fn text(&self, region: MessageRegion) -> &str {
        match region {
            MessageRegion::Header => &self.header,
            MessageRegion::Body => &self.body,
        }
    }

    /// Full request text
    pub fn to_raw(&self) -> String {
        let mut raw = String::with_capacity(self.header.len() + self.body.len());
        raw.push_str(&self.header);
        raw.push_str(&self.body);
        raw
    }

    /// Return a copy with `start..end` of one region replaced by `new_text`
    ///
    /// Offsets are byte offsets into the region text. The replacement is a
    /// plain substring splice; nothing else in the message is touched.
    pub fn with_region_replaced(
        &self,
        region: MessageRegion,
        start: usize,
        end: usize,
        new_text: &str,
    ) -> Result<Self, MessageError> {
        let text = self.text(region);
        if start > end || end > text.len() {
            return Err(MessageError::SpanOutOfBounds {
                region,
                start,
                end,
                len: text.len(),
            });
        }
        for offset in [start, end] {
            if !text.is_char_boundary(offset) {
                return Err(MessageError::NotCharBoundary { region, offset });
            }
        }

        let mut replaced = String::with_capacity(text.len() - (end - start) + new_text.len());
        replaced.push_str(&text[..start]);
        replaced.push_str(new_text);
        replaced.push_str(&text[end..]);

        let mut message = self.clone();
        match region {
            MessageRegion::Header => message.header = replaced,
            MessageRegion::Body => message.body = replaced,
        }
        Ok(message)
    }

    /// Parse the first line of the header block
    pub fn request_line(&self) -> Result<RequestLine<'_>, MessageError> {
        let line = self
            .header
            .lines()
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or(MessageError::MissingRequestLine)?;

        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(target), version, None) => Ok(RequestLine {
                method,
                target,
                version: version.unwrap_or("HTTP/1.1"),
            }),
            _ => Err(MessageError::InvalidRequestLine(line.to_string())),
        }
    }

    /// Header fields in order of appearance
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.header
            .lines()
            .skip(1)
            .map(|l| l.trim_end_matches('\r'))
            .take_while(|l| !l.is_empty())
            .filter_map(|l| l.split_once(':'))
            .map(|(name, value)| (name.trim(), value.trim()))
    }

    /// Case-insensitive header lookup, first match wins
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

impl fmt::Display for HttpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.header, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "POST /api/items HTTP/1.1\r\nHost: example.com\r\nAuthorization: Bearer a.b.c\r\n\r\n{\"x\":1}";

    #[test]
    fn test_parse_splits_at_blank_line() {
        let msg = HttpMessage::parse(RAW);
        assert!(msg.header_text().ends_with("a.b.c\r\n\r\n"));
        assert_eq!(msg.body_text(), "{\"x\":1}");
        assert_eq!(msg.to_raw(), RAW);
    }

    #[test]
    fn test_parse_bare_newlines() {
        let msg = HttpMessage::parse("GET / HTTP/1.1\nHost: h\n\nbody");
        assert_eq!(msg.body_text(), "body");
    }

    #[test]
    fn test_parse_without_body() {
        let msg = HttpMessage::parse("GET / HTTP/1.1\r\nHost: h\r\n");
        assert_eq!(msg.body_text(), "");
        assert_eq!(msg.header("host"), Some("h"));
    }

    #[test]
    fn test_request_line_and_headers() {
        let msg = HttpMessage::parse(RAW);
        let line = msg.request_line().unwrap();
        assert_eq!(line.method, "POST");
        assert_eq!(line.target, "/api/items");
        assert_eq!(line.version, "HTTP/1.1");
        assert_eq!(msg.header("AUTHORIZATION"), Some("Bearer a.b.c"));
        assert_eq!(msg.headers().count(), 2);
    }

    #[test]
    fn test_invalid_request_line() {
        let msg = HttpMessage::new("\r\n", "");
        assert_eq!(msg.request_line(), Err(MessageError::MissingRequestLine));

        let msg = HttpMessage::new("GET / HTTP/1.1 extra\r\n", "");
        assert!(matches!(msg.request_line(), Err(MessageError::InvalidRequestLine(_))));
    }

    #[test]
    fn test_region_replaced_is_exact() {
        let msg = HttpMessage::parse(RAW);
        let start = msg.header_text().find("a.b.c").unwrap();
        let replaced = msg
            .with_region_replaced(MessageRegion::Header, start, start + 5, "x.y.zz")
            .unwrap();

        assert_eq!(replaced.header("Authorization"), Some("Bearer x.y.zz"));
        assert_eq!(replaced.body_text(), msg.body_text());
        // original untouched
        assert_eq!(msg.header("Authorization"), Some("Bearer a.b.c"));
    }

    #[test]
    fn test_region_replaced_rejects_bad_spans() {
        let msg = HttpMessage::new("h", "héllo");
        assert!(matches!(
            msg.with_region_replaced(MessageRegion::Body, 2, 10, "x"),
            Err(MessageError::SpanOutOfBounds { len: 6, .. })
        ));
        assert_eq!(
            msg.with_region_replaced(MessageRegion::Body, 2, 3, "x"),
            Err(MessageError::NotCharBoundary { region: MessageRegion::Body, offset: 2 })
        );
    }
}
