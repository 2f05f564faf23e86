//! JWT token model
//!
//! Tokens are split into their three raw segments and the header and
//! payload are decoded into claim maps. Nothing is verified: the signature
//! segment is carried as opaque text because fuzzing never assumes a key.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MalformedTokenError;

/// Decoded claims of one segment, in the order they appear in the JSON
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Base64url engine that accepts input with or without `=` padding and
/// always encodes without it.
pub(crate) const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// One of the three dot-separated parts of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    Header,
    Payload,
    Signature,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Header => write!(f, "header"),
            Segment::Payload => write!(f, "payload"),
            Segment::Signature => write!(f, "signature"),
        }
    }
}

/// Parsed, unverified JWT
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JwtToken {
    header_raw: String,
    payload_raw: String,
    signature_raw: String,
    header: Claims,
    payload: Claims,
}

impl JwtToken {
    /// Split and decode token text
    pub fn parse(raw: &str) -> Result<Self, MalformedTokenError> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != 3 {
            return Err(MalformedTokenError::SegmentCount { found: parts.len() });
        }

        Ok(Self {
            header: decode_claims(Segment::Header, parts[0])?,
            payload: decode_claims(Segment::Payload, parts[1])?,
            header_raw: parts[0].to_string(),
            payload_raw: parts[1].to_string(),
            signature_raw: parts[2].to_string(),
        })
    }

    /// Token text: the three raw segments joined by `.`
    pub fn serialize(&self) -> String {
        format!("{}.{}.{}", self.header_raw, self.payload_raw, self.signature_raw)
    }

    /// New token with one raw segment substituted
    ///
    /// Header and payload replacements are decoded again so the claim maps
    /// always match the raw text. Signature replacements are taken verbatim.
    pub fn rebuild_with_segment(
        &self,
        segment: Segment,
        new_raw: &str,
    ) -> Result<Self, MalformedTokenError> {
        let mut token = self.clone();
        match segment {
            Segment::Header => {
                token.header = decode_claims(segment, new_raw)?;
                token.header_raw = new_raw.to_string();
            }
            Segment::Payload => {
                token.payload = decode_claims(segment, new_raw)?;
                token.payload_raw = new_raw.to_string();
            }
            Segment::Signature => token.signature_raw = new_raw.to_string(),
        }
        Ok(token)
    }

    /// Raw base64url text of a segment
    pub fn raw_segment(&self, segment: Segment) -> &str {
        match segment {
            Segment::Header => &self.header_raw,
            Segment::Payload => &self.payload_raw,
            Segment::Signature => &self.signature_raw,
        }
    }

    /// Decoded claims of the header or payload; `None` for the signature
    pub fn claims(&self, segment: Segment) -> Option<&Claims> {
        match segment {
            Segment::Header => Some(&self.header),
            Segment::Payload => Some(&self.payload),
            Segment::Signature => None,
        }
    }

    pub fn header(&self) -> &Claims {
        &self.header
    }

    pub fn payload(&self) -> &Claims {
        &self.payload
    }

    /// Value of the `alg` header claim when it is a string
    pub fn algorithm(&self) -> Option<&str> {
        self.header.get("alg").and_then(|v| v.as_str())
    }

    /// Signature bytes, if the segment happens to be base64url
    pub fn signature_bytes(&self) -> Option<Vec<u8>> {
        BASE64URL.decode(&self.signature_raw).ok()
    }
}

impl FromStr for JwtToken {
    type Err = MalformedTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for JwtToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.header_raw, self.payload_raw, self.signature_raw)
    }
}

/// Encode claims as a base64url segment
pub fn encode_claims(claims: &Claims) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(claims)?;
    Ok(BASE64URL.encode(json))
}

fn decode_claims(segment: Segment, raw: &str) -> Result<Claims, MalformedTokenError> {
    let bytes = BASE64URL
        .decode(raw)
        .map_err(|e| MalformedTokenError::InvalidBase64 {
            segment,
            reason: e.to_string(),
        })?;

    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| MalformedTokenError::InvalidJson {
            segment,
            reason: e.to_string(),
        })?;

    match value {
        serde_json::Value::Object(claims) => Ok(claims),
        _ => Err(MalformedTokenError::NotAnObject { segment }),
    }
}
