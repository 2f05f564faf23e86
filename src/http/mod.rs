//! HTTP module
//!
//! Raw request messages that tokens are located in and spliced into, and
//! the dispatcher that sends them.

mod client;
mod message;
mod response;

pub use client::{Dispatcher, HttpClient};
pub use message::{HttpMessage, MessageRegion, RequestLine};
pub use response::Response;
