//! Fuzz runner: sends generated cases with bounded concurrency

use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use super::{CaseError, FuzzCase, FuzzResult, FuzzResultSet, FuzzerStats};
use crate::config::FuzzerConfig;
use crate::http::{Dispatcher, HttpMessage};

/// Fuzzer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzerState {
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
}

/// Consumes a case stream and dispatches every case
///
/// Case generation stays lazy: cases are pulled one at a time, and only
/// `max_concurrent` of them are in flight at once. Clones share state, so a
/// clone can stop or pause a run that another handle is awaiting.
#[derive(Clone)]
pub struct Fuzzer {
    /// Configuration
    config: FuzzerConfig,
    /// Where cases are sent
    dispatcher: Arc<dyn Dispatcher>,
    /// Current state
    state: Arc<RwLock<FuzzerState>>,
    /// Results
    results: Arc<RwLock<FuzzResultSet>>,
    /// Statistics
    stats: Arc<RwLock<FuzzerStats>>,
}

impl Fuzzer {
    /// Create a new fuzzer
    pub fn new(config: FuzzerConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            results: Arc::new(RwLock::new(FuzzResultSet::with_threshold(
                config.length_variance_threshold,
            ))),
            config,
            dispatcher,
            state: Arc::new(RwLock::new(FuzzerState::Idle)),
            stats: Arc::new(RwLock::new(FuzzerStats::default())),
        }
    }

    /// Send `baseline` once, then every case from `cases`
    pub async fn run<I>(&self, baseline: &HttpMessage, cases: I) -> Result<FuzzResultSet>
    where
        I: IntoIterator<Item = Result<FuzzCase, CaseError>>,
    {
        // Reset state
        {
            *self.state.write() = FuzzerState::Running;
            *self.results.write() = FuzzResultSet::with_threshold(self.config.length_variance_threshold);
            let mut stats = self.stats.write();
            *stats = FuzzerStats::default();
            stats.start_time = Some(Instant::now());
        }

        match self.dispatcher.dispatch(baseline).await {
            Ok(response) => {
                tracing::info!(status = response.status, length = response.size, "Baseline response");
                self.results
                    .write()
                    .set_baseline(response.status, response.size, &response.body);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Baseline request failed, results will not be compared");
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let limit = self.config.max_cases.unwrap_or(usize::MAX);
        let mut handles = Vec::new();

        for (idx, case) in cases.into_iter().take(limit).enumerate() {
            if self.state() == FuzzerState::Stopped {
                break;
            }

            while self.state() == FuzzerState::Paused {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }

            let case_num = idx + 1;
            self.stats.write().cases_generated += 1;

            let case = match case {
                Ok(case) => case,
                Err(skipped) => {
                    tracing::warn!(case = case_num, error = %skipped, "Skipping case");
                    self.results.write().add_result(FuzzResult::skipped(
                        case_num,
                        skipped.target.to_string(),
                        skipped.payload,
                        skipped.error.to_string(),
                    ));
                    self.stats.write().skipped += 1;
                    continue;
                }
            };

            if self.config.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
            }

            let permit = semaphore.clone().acquire_owned().await?;

            let dispatcher = self.dispatcher.clone();
            let results = self.results.clone();
            let stats = self.stats.clone();
            let state = self.state.clone();

            let handle = tokio::spawn(async move {
                let stopped = *state.read() == FuzzerState::Stopped;
                if stopped {
                    drop(permit);
                    return;
                }

                let start = Instant::now();
                let result = FuzzResult::new(
                    case_num,
                    case.target.to_string(),
                    case.payload.clone(),
                    case.token.serialize(),
                );

                let result = match dispatcher.dispatch(&case.message).await {
                    Ok(response) => result.with_response(
                        response.status,
                        response.size,
                        start.elapsed(),
                        response.body,
                        response.headers,
                    ),
                    Err(e) => {
                        tracing::debug!(case = case_num, error = %e, "Request failed");
                        stats.write().errors += 1;
                        result.with_error(e.to_string())
                    }
                };

                let interesting = {
                    let mut results = results.write();
                    results.add_result(result);
                    results.results.last().is_some_and(|r| r.interesting)
                };

                // Update stats
                {
                    let mut stats = stats.write();
                    stats.requests_sent += 1;
                    if interesting {
                        stats.interesting_count += 1;
                    }
                    if let Some(start_time) = stats.start_time {
                        stats.elapsed_ms = start_time.elapsed().as_millis() as u64;
                        if stats.elapsed_ms > 0 {
                            stats.requests_per_second =
                                stats.requests_sent as f64 / (stats.elapsed_ms as f64 / 1000.0);
                        }
                    }
                }

                drop(permit);
            });

            handles.push(handle);
        }

        // Wait for all tasks to complete
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Fuzz task panicked");
            }
        }

        {
            let mut state = self.state.write();
            if *state != FuzzerState::Stopped {
                *state = FuzzerState::Completed;
            }
        }

        let mut results = self.results.read().clone();
        results.sort_by_case();

        let stats = self.stats();
        tracing::info!(
            generated = stats.cases_generated,
            sent = stats.requests_sent,
            skipped = stats.skipped,
            errors = stats.errors,
            interesting = stats.interesting_count,
            "Fuzz run finished"
        );

        Ok(results)
    }

    /// Stop the fuzzer
    pub fn stop(&self) {
        *self.state.write() = FuzzerState::Stopped;
    }

    /// Pause the fuzzer
    pub fn pause(&self) {
        let mut state = self.state.write();
        if *state == FuzzerState::Running {
            *state = FuzzerState::Paused;
        }
    }

    /// Resume the fuzzer
    pub fn resume(&self) {
        let mut state = self.state.write();
        if *state == FuzzerState::Paused {
            *state = FuzzerState::Running;
        }
    }

    /// Get current state
    pub fn state(&self) -> FuzzerState {
        *self.state.read()
    }

    /// Get current stats
    pub fn stats(&self) -> FuzzerStats {
        self.stats.read().clone()
    }

    /// Get current results
    pub fn results(&self) -> FuzzResultSet {
        self.results.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DispatchError, JwtFuzzError};
    use crate::fuzzer::{plan_message, ClaimValueMode, FuzzTarget, PayloadSet, PayloadSource};
    use crate::http::Response;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxMjMifQ.sig";

    /// Accepts only tokens whose header is `{"alg":"none"}`
    struct AcceptsNone {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Dispatcher for AcceptsNone {
        async fn dispatch(&self, message: &HttpMessage) -> Result<Response, JwtFuzzError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let accepted = message.header_text().contains("Bearer eyJhbGciOiJub25lIn0.");
            let body = if accepted { "welcome" } else { "denied" };
            Ok(Response {
                status: if accepted { 200 } else { 401 },
                body: body.to_string(),
                size: body.len(),
                ..Default::default()
            })
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Dispatcher for AlwaysFails {
        async fn dispatch(&self, _message: &HttpMessage) -> Result<Response, JwtFuzzError> {
            Err(DispatchError::RequestFailed("connection refused".into()).into())
        }
    }

    fn message() -> HttpMessage {
        HttpMessage::parse(&format!(
            "GET /me HTTP/1.1\r\nHost: example.com\r\nAuthorization: Bearer {}\r\n\r\n",
            TOKEN
        ))
    }

    fn payloads() -> PayloadSet {
        PayloadSet::new("t", vec!["HS512".into(), "none".into(), "x".into()])
    }

    #[tokio::test]
    async fn test_run_dispatches_every_case() {
        let msg = message();
        let plan = plan_message(&msg);
        let set = payloads();
        let dispatcher = Arc::new(AcceptsNone { calls: AtomicUsize::new(0) });
        let fuzzer = Fuzzer::new(FuzzerConfig::default(), dispatcher.clone());

        let cases = plan.tokens[0].cases(&msg, |_: &FuzzTarget| Some(&set as &dyn PayloadSource), ClaimValueMode::String);
        let results = fuzzer.run(&msg, cases).await.unwrap();

        // baseline + 3 targets x 3 payloads
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 10);
        assert_eq!(results.results.len(), 9);
        assert_eq!(results.baseline_status, Some(401));
        assert_eq!(fuzzer.state(), FuzzerState::Completed);

        let interesting = results.interesting_results();
        assert_eq!(interesting.len(), 1);
        assert_eq!(interesting[0].target, "header:alg");
        assert_eq!(interesting[0].payload, "none");
        assert_eq!(interesting[0].case_num, 2);
        assert_eq!(fuzzer.stats().interesting_count, 1);
    }

    #[tokio::test]
    async fn test_max_cases_bounds_the_run() {
        let msg = message();
        let plan = plan_message(&msg);
        let many = crate::fuzzer::NumberRange::new(0, i64::MAX);
        let dispatcher = Arc::new(AcceptsNone { calls: AtomicUsize::new(0) });
        let config = FuzzerConfig {
            max_cases: Some(4),
            max_concurrent: 2,
            ..Default::default()
        };
        let fuzzer = Fuzzer::new(config, dispatcher.clone());

        let cases = plan.tokens[0].cases(&msg, |_: &FuzzTarget| Some(&many as &dyn PayloadSource), ClaimValueMode::String);
        let results = fuzzer.run(&msg, cases).await.unwrap();

        assert_eq!(results.results.len(), 4);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 5);
        let nums: Vec<usize> = results.results.iter().map(|r| r.case_num).collect();
        assert_eq!(nums, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_skipped_cases_are_recorded() {
        let msg = message();
        let plan = plan_message(&msg);
        let set = PayloadSet::new("t", vec!["true".into(), "oops".into()]);
        let dispatcher = Arc::new(AcceptsNone { calls: AtomicUsize::new(0) });
        let fuzzer = Fuzzer::new(FuzzerConfig::default(), dispatcher.clone());

        let cases = plan.tokens[0].cases(&msg, |_: &FuzzTarget| Some(&set as &dyn PayloadSource), ClaimValueMode::Json);
        let results = fuzzer.run(&msg, cases).await.unwrap();

        let stats = results.stats();
        assert_eq!(stats.total_cases, 6);
        // "oops" is not JSON for the two claim targets
        assert_eq!(stats.skipped_count, 2);
        assert_eq!(fuzzer.stats().skipped, 2);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1 + 4);
    }

    #[tokio::test]
    async fn test_dispatch_errors_do_not_stop_the_run() {
        let msg = message();
        let plan = plan_message(&msg);
        let set = payloads();
        let fuzzer = Fuzzer::new(FuzzerConfig::default(), Arc::new(AlwaysFails));

        let cases = plan.tokens[0].cases(&msg, |_: &FuzzTarget| Some(&set as &dyn PayloadSource), ClaimValueMode::String);
        let results = fuzzer.run(&msg, cases).await.unwrap();

        assert_eq!(results.baseline_status, None);
        assert_eq!(results.stats().error_count, 9);
        assert_eq!(fuzzer.stats().errors, 9);
    }

    /// Slow dispatcher that records how many requests it received
    struct Slow {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Dispatcher for Slow {
        async fn dispatch(&self, _message: &HttpMessage) -> Result<Response, JwtFuzzError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Response {
                status: 401,
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_stop_from_another_handle_keeps_in_flight_results() {
        let msg = message();
        let plan = plan_message(&msg);
        let many = crate::fuzzer::NumberRange::new(0, 1_000_000);
        let dispatcher = Arc::new(Slow { calls: AtomicUsize::new(0) });
        let config = FuzzerConfig {
            max_concurrent: 4,
            ..Default::default()
        };
        let fuzzer = Fuzzer::new(config, dispatcher.clone());

        let control = fuzzer.clone();
        let stopper = tokio::spawn(async move {
            while control.stats().requests_sent < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            control.stop();
        });

        let cases = plan.tokens[0].cases(&msg, |_: &FuzzTarget| Some(&many as &dyn PayloadSource), ClaimValueMode::String);
        let results = fuzzer.run(&msg, cases).await.unwrap();
        stopper.await.unwrap();

        assert_eq!(fuzzer.state(), FuzzerState::Stopped);
        assert!(results.results.len() >= 3);
        // every request that went out, minus the baseline, has a result
        assert_eq!(results.results.len(), dispatcher.calls.load(Ordering::SeqCst) - 1);
        assert_eq!(results.results.len(), fuzzer.stats().requests_sent);
    }

    #[tokio::test]
    async fn test_stopped_fuzzer_sends_nothing_more() {
        let msg = message();
        let plan = plan_message(&msg);
        let set = payloads();
        let dispatcher = Arc::new(AcceptsNone { calls: AtomicUsize::new(0) });
        let fuzzer = Fuzzer::new(FuzzerConfig::default(), dispatcher.clone());

        let cases = plan.tokens[0]
            .cases(&msg, |_: &FuzzTarget| Some(&set as &dyn PayloadSource), ClaimValueMode::String)
            .inspect(|_| fuzzer.stop());
        let results = fuzzer.run(&msg, cases).await.unwrap();

        assert!(results.results.is_empty());
        assert_eq!(fuzzer.state(), FuzzerState::Stopped);
    }
}
