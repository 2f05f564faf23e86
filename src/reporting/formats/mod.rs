//! Report output formats

pub mod json;
