//! jwtfuzz - locate JSON Web Tokens in HTTP requests and fuzz them
//!
//! The pipeline runs locator → token model → target registry → case
//! generation, all without I/O. The [`fuzzer::Fuzzer`] runner and
//! [`http::HttpClient`] send the generated cases.

pub mod config;
pub mod error;
pub mod fuzzer;
pub mod http;
pub mod jwt;
pub mod reporting;

pub use error::*;
