//! JSON Report Generator
//!
//! Generates machine-readable JSON fuzz reports.

use anyhow::Result;

use crate::reporting::FuzzReport;

/// Generate JSON report
pub fn generate(report: &FuzzReport) -> Result<String> {
    let json = serde_json::to_string_pretty(report)?;
    Ok(json)
}

/// Generate minified JSON report
pub fn generate_minified(report: &FuzzReport) -> Result<String> {
    let json = serde_json::to_string(report)?;
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzer::{FuzzResult, FuzzResultSet};
    use crate::reporting::ReportMetadata;

    fn report() -> FuzzReport {
        let mut results = FuzzResultSet::new();
        results.add_result(FuzzResult::skipped(
            1,
            "payload:admin".into(),
            "not json".into(),
            "invalid JSON value".into(),
        ));
        FuzzReport::new(results, ReportMetadata::default())
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate(&report()).unwrap();
        assert!(json.contains("payload:admin"));
        assert!(json.contains("\"skipped\": true"));
    }

    #[test]
    fn test_generate_minified_json() {
        let json = generate_minified(&report()).unwrap();
        assert!(!json.contains('\n'));
    }
}
