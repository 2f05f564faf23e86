//! Fuzzing result collection and analysis

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Single fuzzing result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuzzResult {
    /// Case number, counted from 1 in generation order
    pub case_num: usize,
    /// Target the payload went into (`header:alg`, `signature`, ...)
    pub target: String,
    /// Payload used
    pub payload: String,
    /// Token text that was sent
    pub token: String,
    /// HTTP status code
    pub status_code: u16,
    /// Response length in bytes
    pub response_length: usize,
    /// Response time
    pub response_time: Duration,
    /// Response body (truncated)
    pub response_body: String,
    /// Response headers
    pub response_headers: HashMap<String, String>,
    /// Whether this is flagged as interesting
    pub interesting: bool,
    /// Reason for being interesting
    pub interesting_reason: Option<String>,
    /// Error message if the request failed or the case was never built
    pub error: Option<String>,
    /// The case was skipped before sending
    pub skipped: bool,
}

impl FuzzResult {
    pub fn new(case_num: usize, target: String, payload: String, token: String) -> Self {
        Self {
            case_num,
            target,
            payload,
            token,
            status_code: 0,
            response_length: 0,
            response_time: Duration::ZERO,
            response_body: String::new(),
            response_headers: HashMap::new(),
            interesting: false,
            interesting_reason: None,
            error: None,
            skipped: false,
        }
    }

    /// A case that failed to build
    pub fn skipped(case_num: usize, target: String, payload: String, reason: String) -> Self {
        let mut result = Self::new(case_num, target, payload, String::new());
        result.skipped = true;
        result.error = Some(reason);
        result
    }

    pub fn with_response(
        mut self,
        status_code: u16,
        response_length: usize,
        response_time: Duration,
        response_body: String,
        response_headers: HashMap<String, String>,
    ) -> Self {
        self.status_code = status_code;
        self.response_length = response_length;
        self.response_time = response_time;
        self.response_body = response_body;
        self.response_headers = response_headers;
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub fn mark_interesting(&mut self, reason: &str) {
        self.interesting = true;
        self.interesting_reason = Some(reason.to_string());
    }
}

/// Collection of fuzzing results with analysis
#[derive(Debug, Clone, Default, Serialize)]
pub struct FuzzResultSet {
    /// All results
    pub results: Vec<FuzzResult>,
    /// Baseline status code
    pub baseline_status: Option<u16>,
    /// Baseline response length
    pub baseline_length: Option<usize>,
    /// Lowercased baseline body, for indicators the endpoint always returns
    #[serde(skip)]
    baseline_body: Option<String>,
    /// Status code distribution
    pub status_distribution: HashMap<u16, usize>,
    /// Interesting threshold for length variance (percentage)
    pub length_variance_threshold: f64,
}

impl FuzzResultSet {
    pub fn new() -> Self {
        Self::with_threshold(10.0)
    }

    pub fn with_threshold(length_variance_threshold: f64) -> Self {
        Self {
            results: Vec::new(),
            baseline_status: None,
            baseline_length: None,
            baseline_body: None,
            status_distribution: HashMap::new(),
            length_variance_threshold,
        }
    }

    /// Set baseline from the unmodified request
    pub fn set_baseline(&mut self, status: u16, length: usize, body: &str) {
        self.baseline_status = Some(status);
        self.baseline_length = Some(length);
        self.baseline_body = Some(body.to_lowercase());
    }

    /// Add a result and analyze it
    pub fn add_result(&mut self, mut result: FuzzResult) {
        if !result.skipped && result.error.is_none() {
            *self.status_distribution.entry(result.status_code).or_insert(0) += 1;
            self.analyze_result(&mut result);
        }

        self.results.push(result);
    }

    /// Analyze a result for interesting behavior
    fn analyze_result(&self, result: &mut FuzzResult) {
        // Check status code difference
        if let Some(baseline) = self.baseline_status {
            if result.status_code != baseline {
                result.mark_interesting(&format!(
                    "Status code changed from {} to {}",
                    baseline, result.status_code
                ));
                return;
            }
        }

        // Check length variance
        if let Some(baseline_len) = self.baseline_length.filter(|len| *len > 0) {
            let variance = ((result.response_length as f64 - baseline_len as f64).abs()
                / baseline_len as f64)
                * 100.0;
            if variance > self.length_variance_threshold {
                result.mark_interesting(&format!(
                    "Response length changed by {:.1}% ({} -> {})",
                    variance, baseline_len, result.response_length
                ));
                return;
            }
        }

        // Token handling errors leaking into the response
        let error_indicators = [
            "exception",
            "stack trace",
            "traceback",
            "signature verification",
            "invalid signature",
            "malformed",
            "jwt",
            "jws",
            "algorithm",
            "base64",
            "json parse",
        ];

        let body_lower = result.response_body.to_lowercase();
        let baseline_body = self.baseline_body.as_deref().unwrap_or_default();
        for indicator in &error_indicators {
            if body_lower.contains(indicator) && !baseline_body.contains(indicator) {
                result.mark_interesting(&format!("Response contains '{}'", indicator));
                return;
            }
        }

        if let 500..=599 = result.status_code {
            result.mark_interesting("Server error response");
        }
    }

    /// Get interesting results
    pub fn interesting_results(&self) -> Vec<&FuzzResult> {
        self.results.iter().filter(|r| r.interesting).collect()
    }

    /// Get results for one target
    pub fn by_target(&self, target: &str) -> Vec<&FuzzResult> {
        self.results.iter().filter(|r| r.target == target).collect()
    }

    /// Results in case order, regardless of completion order
    pub fn sort_by_case(&mut self) {
        self.results.sort_by_key(|r| r.case_num);
    }

    /// Get statistics
    pub fn stats(&self) -> FuzzResultStats {
        let total = self.results.len();
        let skipped = self.results.iter().filter(|r| r.skipped).count();
        let errors = self.results.iter().filter(|r| !r.skipped && r.error.is_some()).count();
        let interesting = self.results.iter().filter(|r| r.interesting).count();
        let answered: Vec<&FuzzResult> = self
            .results
            .iter()
            .filter(|r| !r.skipped && r.error.is_none())
            .collect();

        let (average_response_time, average_response_length) = if answered.is_empty() {
            (Duration::ZERO, 0)
        } else {
            let total_time: Duration = answered.iter().map(|r| r.response_time).sum();
            let total_len: usize = answered.iter().map(|r| r.response_length).sum();
            (total_time / answered.len() as u32, total_len / answered.len())
        };

        FuzzResultStats {
            total_cases: total,
            successful_requests: answered.len(),
            error_count: errors,
            skipped_count: skipped,
            interesting_count: interesting,
            average_response_time,
            average_response_length,
            status_distribution: self.status_distribution.clone(),
        }
    }
}

/// Statistics from fuzzing results
#[derive(Debug, Clone, Serialize)]
pub struct FuzzResultStats {
    pub total_cases: usize,
    pub successful_requests: usize,
    pub error_count: usize,
    pub skipped_count: usize,
    pub interesting_count: usize,
    pub average_response_time: Duration,
    pub average_response_length: usize,
    pub status_distribution: HashMap<u16, usize>,
}
