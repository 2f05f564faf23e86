//! Finds JWT-shaped substrings in HTTP messages
//!
//! Matching is a heuristic over the base64url alphabet; anything that looks
//! like `xxx.yyy.zzz` is reported and left for [`JwtToken::parse`] to reject.
//!
//! [`JwtToken::parse`]: super::JwtToken::parse

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::http::{HttpMessage, MessageRegion};

/// Three base64url runs joined by dots, delimited on both sides by start/end
/// of text or a character that cannot continue a segment.
static JWT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[^A-Za-z0-9_.\-])([A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+\.[A-Za-z0-9_\-]+)(?:[^A-Za-z0-9_.\-]|$)",
    )
    .expect("JWT pattern is a valid regex")
});

/// A JWT-shaped substring and where it was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatedToken {
    /// Matched text
    pub raw: String,
    /// Region of the message the match came from
    pub region: MessageRegion,
    /// Byte offset of the first character within the region text
    pub start: usize,
    /// Byte offset one past the last character within the region text
    pub end: usize,
}

/// Scans message header and body text for tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenLocator;

impl TokenLocator {
    pub fn new() -> Self {
        Self
    }

    /// Lazily yield every match in the header, then every match in the body
    ///
    /// Each call starts a fresh scan, so the result can be re-created as
    /// often as needed.
    pub fn locate<'a>(&self, message: &'a HttpMessage) -> impl Iterator<Item = LocatedToken> + 'a {
        [MessageRegion::Header, MessageRegion::Body]
            .into_iter()
            .flat_map(move |region| RegionMatches::new(region, message.text(region)))
    }

    /// Matches in a single piece of text
    pub fn locate_in(&self, region: MessageRegion, text: &str) -> Vec<LocatedToken> {
        RegionMatches::new(region, text).collect()
    }
}

/// Non-overlapping leftmost-first matches within one region
struct RegionMatches<'a> {
    region: MessageRegion,
    text: &'a str,
    pos: usize,
}

impl<'a> RegionMatches<'a> {
    fn new(region: MessageRegion, text: &'a str) -> Self {
        Self { region, text, pos: 0 }
    }
}

impl Iterator for RegionMatches<'_> {
    type Item = LocatedToken;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos > self.text.len() {
            return None;
        }

        let Some(token) = JWT_PATTERN
            .captures_at(self.text, self.pos)
            .and_then(|caps| caps.get(1))
        else {
            self.pos = self.text.len() + 1;
            return None;
        };

        // Resume at the end of the token itself so the delimiter after it can
        // also serve as the leading delimiter of the next match.
        self.pos = token.end();

        tracing::debug!(
            region = %self.region,
            start = token.start(),
            end = token.end(),
            "Located JWT-shaped value"
        );

        Some(LocatedToken {
            raw: token.as_str().to_string(),
            region: self.region,
            start: token.start(),
            end: token.end(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxMjMifQ.sig";

    #[test]
    fn test_no_tokens() {
        let msg = HttpMessage::parse("GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\nhello");
        assert_eq!(TokenLocator::new().locate(&msg).count(), 0);
    }

    #[test]
    fn test_token_in_json_body() {
        let body = format!("{{\"data\":\"{}\"}}", TOKEN);
        let msg = HttpMessage::new("POST / HTTP/1.1\r\nHost: h\r\n\r\n", body.clone());

        let found: Vec<_> = TokenLocator::new().locate(&msg).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, TOKEN);
        assert_eq!(found[0].region, MessageRegion::Body);
        assert_eq!(&body[found[0].start..found[0].end], TOKEN);
    }

    #[test]
    fn test_header_and_body_are_independent() {
        let header = format!("GET / HTTP/1.1\r\nAuthorization: Bearer {}\r\n\r\n", TOKEN);
        let msg = HttpMessage::new(header, format!("token={}", TOKEN));

        let found: Vec<_> = TokenLocator::new().locate(&msg).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].region, MessageRegion::Header);
        assert_eq!(found[1].region, MessageRegion::Body);
        assert_eq!(&msg.header_text()[found[0].start..found[0].end], TOKEN);
        assert_eq!(found[1].start, "token=".len());
    }

    #[test]
    fn test_adjacent_tokens_share_a_delimiter() {
        let found = TokenLocator::new().locate_in(MessageRegion::Body, "a.b.c d.e.f");
        let raws: Vec<&str> = found.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws, vec!["a.b.c", "d.e.f"]);
        assert_eq!(found[1].start, 6);
    }

    #[test]
    fn test_longer_dotted_values_do_not_match() {
        let found = TokenLocator::new().locate_in(MessageRegion::Header, "Host: api.eu.example.com\r\n");
        assert!(found.is_empty());
    }

    #[test]
    fn test_match_is_case_sensitive_and_whole() {
        let found = TokenLocator::new().locate_in(MessageRegion::Body, "x=AbC.dEf.GhI");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw, "AbC.dEf.GhI");
        assert_eq!(found[0].end, "x=AbC.dEf.GhI".len());
    }

    #[test]
    fn test_locate_is_restartable() {
        let msg = HttpMessage::new("", format!("{} {}", TOKEN, TOKEN));
        let locator = TokenLocator::new();
        assert_eq!(locator.locate(&msg).count(), 2);
        assert_eq!(locator.locate(&msg).collect::<Vec<_>>(), locator.locate(&msg).collect::<Vec<_>>());
    }
}
