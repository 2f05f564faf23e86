//! Report Generation Module
//!
//! Writes the outcome of a fuzz run as machine-readable JSON.

pub mod formats;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::fuzzer::{FuzzResult, FuzzResultSet, FuzzResultStats};

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// Report title
    pub title: String,
    /// Request line of the fuzzed request
    pub request: String,
    /// Number of tokens fuzzed
    pub tokens_fuzzed: usize,
    /// Run start time
    pub start_time: DateTime<Utc>,
    /// Run end time
    pub end_time: DateTime<Utc>,
    /// Tool version
    pub tool_version: String,
    /// Report generation time
    pub generated_at: DateTime<Utc>,
}

impl Default for ReportMetadata {
    fn default() -> Self {
        Self {
            title: "JWT Fuzz Report".to_string(),
            request: String::new(),
            tokens_fuzzed: 0,
            start_time: Utc::now(),
            end_time: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: Utc::now(),
        }
    }
}

/// Complete fuzz report
#[derive(Debug, Clone, Serialize)]
pub struct FuzzReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Summary statistics
    pub summary: FuzzResultStats,
    /// Baseline status code, if the baseline request succeeded
    pub baseline_status: Option<u16>,
    /// Interesting case numbers grouped by target
    pub interesting_by_target: BTreeMap<String, Vec<usize>>,
    /// All results in case order
    pub results: Vec<FuzzResult>,
}

impl FuzzReport {
    /// Create a report from a finished run
    pub fn new(mut results: FuzzResultSet, metadata: ReportMetadata) -> Self {
        results.sort_by_case();
        let summary = results.stats();
        let interesting_by_target = Self::group_interesting(&results);

        Self {
            metadata,
            summary,
            baseline_status: results.baseline_status,
            interesting_by_target,
            results: results.results,
        }
    }

    fn group_interesting(results: &FuzzResultSet) -> BTreeMap<String, Vec<usize>> {
        let mut grouped: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for result in results.interesting_results() {
            grouped.entry(result.target.clone()).or_default().push(result.case_num);
        }
        grouped
    }

    /// Export to JSON format
    pub fn to_json(&self) -> Result<String> {
        formats::json::generate(self)
    }

    /// Save report to file
    pub fn save(&self, path: &Path, minified: bool) -> Result<()> {
        let content = if minified {
            formats::json::generate_minified(self)?
        } else {
            self.to_json()?
        };

        std::fs::write(path, content).with_context(|| format!("Failed to write report to {:?}", path))?;
        tracing::info!("Wrote report to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn create_test_results() -> FuzzResultSet {
        let mut set = FuzzResultSet::new();
        set.set_baseline(401, 6, "denied");
        for (num, target, status) in [(2, "header:alg", 200), (1, "header:alg", 401), (3, "payload:sub", 500)] {
            set.add_result(
                FuzzResult::new(num, target.into(), "none".into(), "a.b.c".into()).with_response(
                    status,
                    6,
                    Duration::from_millis(5),
                    "denied".into(),
                    HashMap::new(),
                ),
            );
        }
        set
    }

    #[test]
    fn test_report_orders_results_and_groups_interesting() {
        let report = FuzzReport::new(create_test_results(), ReportMetadata::default());

        let nums: Vec<usize> = report.results.iter().map(|r| r.case_num).collect();
        assert_eq!(nums, vec![1, 2, 3]);
        assert_eq!(report.summary.interesting_count, 2);
        assert_eq!(report.interesting_by_target["header:alg"], vec![2]);
        assert_eq!(report.interesting_by_target["payload:sub"], vec![3]);
        assert_eq!(report.baseline_status, Some(401));
    }

    #[test]
    fn test_save_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = FuzzReport::new(create_test_results(), ReportMetadata::default());

        report.save(&path, true).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed["summary"]["total_cases"], 3);
        assert_eq!(parsed["metadata"]["title"], "JWT Fuzz Report");
    }
}
