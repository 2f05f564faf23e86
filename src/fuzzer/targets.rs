//! Fuzz target enumeration
//!
//! A target is one claim of the header or payload, or the signature segment
//! as a whole.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::jwt::{JwtToken, Segment};

/// Where in the token a payload is injected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetLocation {
    HeaderClaim,
    PayloadClaim,
    Signature,
}

impl TargetLocation {
    /// Token segment this location rewrites
    pub fn segment(&self) -> Segment {
        match self {
            TargetLocation::HeaderClaim => Segment::Header,
            TargetLocation::PayloadClaim => Segment::Payload,
            TargetLocation::Signature => Segment::Signature,
        }
    }
}

/// A single fuzzable location of a token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuzzTarget {
    pub location: TargetLocation,
    /// Claim name for header/payload targets
    pub claim_name: Option<String>,
}

impl FuzzTarget {
    pub fn header_claim(name: impl Into<String>) -> Self {
        Self {
            location: TargetLocation::HeaderClaim,
            claim_name: Some(name.into()),
        }
    }

    pub fn payload_claim(name: impl Into<String>) -> Self {
        Self {
            location: TargetLocation::PayloadClaim,
            claim_name: Some(name.into()),
        }
    }

    pub fn signature() -> Self {
        Self {
            location: TargetLocation::Signature,
            claim_name: None,
        }
    }

    pub fn segment(&self) -> Segment {
        self.location.segment()
    }
}

impl fmt::Display for FuzzTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.location, &self.claim_name) {
            (TargetLocation::Signature, _) => write!(f, "signature"),
            (location, Some(name)) => write!(f, "{}:{}", location.segment(), name),
            (location, None) => write!(f, "{}", location.segment()),
        }
    }
}

/// Error for target selectors that are not `header:<claim>`,
/// `payload:<claim>` or `signature`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid fuzz target '{0}' (expected header:<claim>, payload:<claim> or signature)")]
pub struct ParseTargetError(pub String);

impl FromStr for FuzzTarget {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("signature") {
            return Ok(Self::signature());
        }

        match s.split_once(':') {
            Some((segment, claim)) if !claim.is_empty() => match segment.to_ascii_lowercase().as_str() {
                "header" => Ok(Self::header_claim(claim)),
                "payload" => Ok(Self::payload_claim(claim)),
                _ => Err(ParseTargetError(s.to_string())),
            },
            _ => Err(ParseTargetError(s.to_string())),
        }
    }
}

/// Every target of a token: header claims in decode order, payload claims in
/// decode order, then the signature
pub fn enumerate_targets(token: &JwtToken) -> impl Iterator<Item = FuzzTarget> + '_ {
    let header = token.header().keys().map(|k| FuzzTarget::header_claim(k.as_str()));
    let payload = token.payload().keys().map(|k| FuzzTarget::payload_claim(k.as_str()));
    header.chain(payload).chain(std::iter::once(FuzzTarget::signature()))
}

/// Keep only the targets named in `selection`, preserving enumeration order.
/// An empty selection keeps everything.
pub fn select_targets(targets: impl IntoIterator<Item = FuzzTarget>, selection: &[FuzzTarget]) -> Vec<FuzzTarget> {
    targets
        .into_iter()
        .filter(|t| selection.is_empty() || selection.contains(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJzdWIiOiIxMjMiLCJhZG1pbiI6ZmFsc2V9.sig";

    #[test]
    fn test_enumeration_order() {
        let token = JwtToken::parse(TOKEN).unwrap();
        let targets: Vec<String> = enumerate_targets(&token).map(|t| t.to_string()).collect();
        assert_eq!(
            targets,
            vec!["header:alg", "header:typ", "payload:sub", "payload:admin", "signature"]
        );
    }

    #[test]
    fn test_enumeration_is_deterministic() {
        let token = JwtToken::parse(TOKEN).unwrap();
        let first: Vec<_> = enumerate_targets(&token).collect();
        for _ in 0..5 {
            assert_eq!(enumerate_targets(&token).collect::<Vec<_>>(), first);
        }
    }

    #[test]
    fn test_exactly_one_signature_target() {
        let token = JwtToken::parse(TOKEN).unwrap();
        let count = enumerate_targets(&token)
            .filter(|t| t.location == TargetLocation::Signature)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_parse_target() {
        assert_eq!("header:alg".parse::<FuzzTarget>().unwrap(), FuzzTarget::header_claim("alg"));
        assert_eq!("Payload:sub".parse::<FuzzTarget>().unwrap(), FuzzTarget::payload_claim("sub"));
        assert_eq!("signature".parse::<FuzzTarget>().unwrap(), FuzzTarget::signature());
        // claim names may contain colons
        assert_eq!(
            "payload:urn:role".parse::<FuzzTarget>().unwrap(),
            FuzzTarget::payload_claim("urn:role")
        );
        assert!("header:".parse::<FuzzTarget>().is_err());
        assert!("body:x".parse::<FuzzTarget>().is_err());
    }

    #[test]
    fn test_select_targets() {
        let token = JwtToken::parse(TOKEN).unwrap();
        let selection = vec![FuzzTarget::signature(), FuzzTarget::header_claim("alg")];
        let selected = select_targets(enumerate_targets(&token), &selection);
        // enumeration order wins over selection order
        assert_eq!(selected, vec![FuzzTarget::header_claim("alg"), FuzzTarget::signature()]);

        assert_eq!(select_targets(enumerate_targets(&token), &[]).len(), 5);
    }
}
