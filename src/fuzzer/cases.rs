//! Fuzz case generation
//!
//! Turns a decoded token, its location in a message and a set of targets
//! into a lazy stream of [`FuzzCase`]s. Nothing is sent here; each case
//! carries a ready-to-send message for whatever dispatches it.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{enumerate_targets, FuzzTarget, PayloadSource, TargetLocation};
use crate::error::{EncodingError, JwtFuzzError, MalformedTokenError};
use crate::http::HttpMessage;
use crate::jwt::{encode_claims, JwtToken, LocatedToken, TokenLocator};

/// How a payload string becomes a claim value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimValueMode {
    /// The payload is injected as a JSON string
    #[default]
    String,
    /// The payload is parsed as a JSON literal (`42`, `true`, `null`,
    /// `["admin"]`, `"quoted"`)
    Json,
}

impl ClaimValueMode {
    fn to_value(self, payload: &str) -> Result<serde_json::Value, EncodingError> {
        match self {
            ClaimValueMode::String => Ok(serde_json::Value::String(payload.to_string())),
            ClaimValueMode::Json => {
                serde_json::from_str(payload).map_err(|e| EncodingError::InvalidJsonValue {
                    value: payload.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// One mutated token and the message that carries it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuzzCase {
    pub target: FuzzTarget,
    pub payload: String,
    pub token: JwtToken,
    pub message: HttpMessage,
}

/// A case that could not be built; the run continues without it
#[derive(Debug)]
pub struct CaseError {
    pub target: FuzzTarget,
    pub payload: String,
    pub error: JwtFuzzError,
}

impl fmt::Display for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {:?}: {}", self.target, self.payload, self.error)
    }
}

impl std::error::Error for CaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Lazy sequence of cases for one located token
///
/// Targets are visited in the given order and each target drains its
/// payload source before the next one starts.
pub struct FuzzCases<'a, F> {
    token: &'a JwtToken,
    located: &'a LocatedToken,
    message: &'a HttpMessage,
    targets: std::slice::Iter<'a, FuzzTarget>,
    source_for: F,
    mode: ClaimValueMode,
    current: Option<(&'a FuzzTarget, Box<dyn Iterator<Item = String> + 'a>)>,
}

/// Build the case stream for `token`, found at `located` inside `message`
///
/// `source_for` picks the payload source of each target; returning `None`
/// skips that target.
pub fn run_fuzz<'a, F>(
    token: &'a JwtToken,
    located: &'a LocatedToken,
    message: &'a HttpMessage,
    targets: &'a [FuzzTarget],
    source_for: F,
    mode: ClaimValueMode,
) -> FuzzCases<'a, F>
where
    F: FnMut(&FuzzTarget) -> Option<&'a dyn PayloadSource>,
{
    FuzzCases {
        token,
        located,
        message,
        targets: targets.iter(),
        source_for,
        mode,
        current: None,
    }
}

impl<'a, F> FuzzCases<'a, F> {
    fn build_case(&self, target: &FuzzTarget, payload: String) -> Result<FuzzCase, CaseError> {
        match self.mutate(target, &payload) {
            Ok((token, message)) => Ok(FuzzCase {
                target: target.clone(),
                payload,
                token,
                message,
            }),
            Err(error) => Err(CaseError {
                target: target.clone(),
                payload,
                error,
            }),
        }
    }

    fn mutate(&self, target: &FuzzTarget, payload: &str) -> Result<(JwtToken, HttpMessage), JwtFuzzError> {
        let segment = target.segment();
        let new_raw = match (&target.location, &target.claim_name) {
            (TargetLocation::Signature, _) => payload.to_string(),
            (_, claim) => {
                let claim = claim.as_deref().unwrap_or_default();
                let mut claims = self.token.claims(segment).cloned().unwrap_or_default();
                let slot = claims.get_mut(claim).ok_or_else(|| EncodingError::MissingClaim {
                    segment,
                    claim: claim.to_string(),
                })?;
                *slot = self.mode.to_value(payload)?;
                encode_claims(&claims).map_err(|e| EncodingError::Serialize {
                    segment,
                    reason: e.to_string(),
                })?
            }
        };

        let token = self
            .token
            .rebuild_with_segment(segment, &new_raw)
            .map_err(|source| EncodingError::Rebuild { segment, source })?;

        let message = self.message.with_region_replaced(
            self.located.region,
            self.located.start,
            self.located.end,
            &token.serialize(),
        )?;

        Ok((token, message))
    }
}

impl<'a, F> Iterator for FuzzCases<'a, F>
where
    F: FnMut(&FuzzTarget) -> Option<&'a dyn PayloadSource>,
{
    type Item = Result<FuzzCase, CaseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((target, values)) = self.current.as_mut() {
                let target = *target;
                if let Some(payload) = values.next() {
                    return Some(self.build_case(target, payload));
                }
                self.current = None;
            }

            let target = self.targets.next()?;
            match (self.source_for)(target) {
                Some(source) => {
                    tracing::debug!(fuzz_target = %target, source = source.name(), "Fuzzing target");
                    self.current = Some((target, source.values()));
                }
                None => tracing::debug!(fuzz_target = %target, "No payload source, skipping target"),
            }
        }
    }
}

/// A decodable token in a message, ready to fuzz
#[derive(Debug, Clone)]
pub struct TokenPlan {
    pub located: LocatedToken,
    pub token: JwtToken,
    pub targets: Vec<FuzzTarget>,
}

impl TokenPlan {
    /// Case stream for this token
    pub fn cases<'a, F>(&'a self, message: &'a HttpMessage, source_for: F, mode: ClaimValueMode) -> FuzzCases<'a, F>
    where
        F: FnMut(&FuzzTarget) -> Option<&'a dyn PayloadSource>,
    {
        run_fuzz(&self.token, &self.located, message, &self.targets, source_for, mode)
    }
}

/// Result of scanning a whole message
#[derive(Debug, Clone, Default)]
pub struct MessagePlan {
    /// Tokens that decoded, in locator order
    pub tokens: Vec<TokenPlan>,
    /// JWT-shaped values that turned out not to be tokens
    pub rejected: Vec<(LocatedToken, MalformedTokenError)>,
}

impl MessagePlan {
    /// No JWT-shaped value was found at all
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.rejected.is_empty()
    }

    /// Fail with `NoTokensFound` when nothing decodable was found
    pub fn require_tokens(self) -> Result<Self, JwtFuzzError> {
        if self.tokens.is_empty() {
            Err(JwtFuzzError::NoTokensFound)
        } else {
            Ok(self)
        }
    }
}

/// Locate, decode and enumerate every token in `message`
///
/// A value that fails to decode is set aside; other tokens are unaffected.
pub fn plan_message(message: &HttpMessage) -> MessagePlan {
    let mut plan = MessagePlan::default();

    for located in TokenLocator::new().locate(message) {
        match JwtToken::parse(&located.raw) {
            Ok(token) => {
                let targets = enumerate_targets(&token).collect();
                plan.tokens.push(TokenPlan {
                    located,
                    token,
                    targets,
                });
            }
            Err(e) => {
                tracing::warn!(
                    region = %located.region,
                    start = located.start,
                    error = %e,
                    "Skipping JWT-shaped value that does not decode"
                );
                plan.rejected.push((located, e));
            }
        }
    }

    plan
}
