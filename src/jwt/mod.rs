//! JWT discovery and decoding
//!
//! [`TokenLocator`] finds candidate tokens in request text and
//! [`JwtToken`] decodes them without trusting or verifying anything.

mod locator;
mod token;

pub use locator::{LocatedToken, TokenLocator};
pub use token::{encode_claims, Claims, JwtToken, Segment};
pub(crate) use token::BASE64URL;
