//! Fuzzer module - JWT claim and signature fuzzing
//!
//! Builds mutated tokens for every claim of every token found in a
//! request, splices them back into the request, and sends the results
//! with bounded concurrency.

mod cases;
mod engine;
mod payloads;
mod results;
mod targets;

pub use cases::{plan_message, run_fuzz, CaseError, ClaimValueMode, FuzzCase, FuzzCases, MessagePlan, TokenPlan};
pub use engine::{Fuzzer, FuzzerState};
pub use payloads::{FileLines, NumberRange, PayloadAssignments, PayloadSet, PayloadSource, StaticPayload};
pub use results::{FuzzResult, FuzzResultSet, FuzzResultStats};
pub use targets::{enumerate_targets, select_targets, FuzzTarget, ParseTargetError, TargetLocation};

/// Fuzzer statistics
#[derive(Debug, Clone, Default)]
pub struct FuzzerStats {
    /// Cases pulled from the generator
    pub cases_generated: usize,
    /// Total requests sent
    pub requests_sent: usize,
    /// Cases that could not be built
    pub skipped: usize,
    /// Requests per second
    pub requests_per_second: f64,
    /// Errors encountered
    pub errors: usize,
    /// Interesting results found
    pub interesting_count: usize,
    /// Start time
    pub start_time: Option<std::time::Instant>,
    /// Elapsed time in milliseconds
    pub elapsed_ms: u64,
}
