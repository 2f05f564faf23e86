//! jwtfuzz - JWT discovery and fuzzing for raw HTTP requests
//!
//! Reads a raw request, finds every JSON Web Token in it, and sends one
//! request per (target, payload) pair.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jwtfuzz::config::Config;
use jwtfuzz::fuzzer::{
    plan_message, select_targets, ClaimValueMode, FileLines, FuzzTarget, Fuzzer, NumberRange, PayloadAssignments,
    PayloadSet, PayloadSource, TokenPlan,
};
use jwtfuzz::http::{HttpClient, HttpMessage};
use jwtfuzz::reporting::{FuzzReport, ReportMetadata};

/// JWT discovery and fuzzing for raw HTTP requests
#[derive(Parser, Debug)]
#[command(name = "jwtfuzz")]
#[command(author, version, about = "Locate JWTs in an HTTP request and fuzz their claims", long_about = None)]
struct Cli {
    /// Raw HTTP request file
    #[arg(required_unless_present = "generate_config")]
    request: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, env = "JWTFUZZ_CONFIG")]
    config: Option<PathBuf>,

    /// Payload source for one target: TARGET=SOURCE, where SOURCE is a file,
    /// `builtin:<name>` or `range:<start>..<end>` (repeatable)
    #[arg(short, long = "payloads", value_name = "TARGET=SOURCE")]
    payloads: Vec<String>,

    /// Payload source for every target without its own assignment
    #[arg(short, long, value_name = "SOURCE", env = "JWTFUZZ_WORDLIST")]
    wordlist: Option<String>,

    /// Only fuzz these targets (`header:alg`, `payload:sub`, `signature`)
    #[arg(short, long = "target", value_name = "TARGET")]
    targets: Vec<String>,

    /// Parse payloads as JSON literals instead of injecting strings
    #[arg(long)]
    json_claims: bool,

    /// Print the generated cases without sending anything
    #[arg(long)]
    dry_run: bool,

    /// Stop after this many cases
    #[arg(long, env = "JWTFUZZ_MAX_CASES")]
    max_cases: Option<usize>,

    /// Maximum concurrent requests
    #[arg(long, env = "JWTFUZZ_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Delay between requests in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Scheme for requests with a relative target (http or https)
    #[arg(long)]
    scheme: Option<String>,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k')]
    insecure: bool,

    /// Write a JSON report to this path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the report without indentation
    #[arg(long)]
    minify: bool,

    /// Fail when the request contains no decodable token
    #[arg(long)]
    require_tokens: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "JWTFUZZ_LOG_LEVEL")]
    log_level: String,

    /// Log file path (enables file logging)
    #[arg(long, env = "JWTFUZZ_LOG_FILE")]
    log_file: Option<String>,

    /// Enable JSON structured logging
    #[arg(long, env = "JWTFUZZ_LOG_JSON")]
    log_json: bool,

    /// Generate default configuration and exit
    #[arg(long)]
    generate_config: bool,
}

/// One line of `--dry-run` output
#[derive(Serialize)]
struct DryRunCase<'a> {
    case: usize,
    target: String,
    payload: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.generate_config {
        return generate_default_config();
    }

    init_logging(&cli)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting jwtfuzz");

    if let Err(e) = run(cli).await {
        if let Some(err) = e.downcast_ref::<jwtfuzz::JwtFuzzError>() {
            tracing::error!("{}", err.user_message());
        }
        return Err(e);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    let request_path = cli.request.as_deref().context("No request file given")?;
    let raw = std::fs::read_to_string(request_path)
        .with_context(|| format!("Failed to read request file {:?}", request_path))?;
    let message = HttpMessage::parse(&raw);

    let mut plan = plan_message(&message);
    if cli.require_tokens {
        plan = plan.require_tokens()?;
    } else if plan.tokens.is_empty() {
        tracing::warn!(rejected = plan.rejected.len(), "No decodable JWT found in request, nothing to fuzz");
        return Ok(());
    }

    let selection = config.fuzzer.target_selection()?;
    for token in &mut plan.tokens {
        token.targets = select_targets(std::mem::take(&mut token.targets), &selection);
        tracing::info!(
            region = %token.located.region,
            start = token.located.start,
            alg = token.token.algorithm().unwrap_or("-"),
            targets = token.targets.len(),
            "Found token"
        );
    }

    let assignments = build_assignments(&cli)?;
    let mode = config.fuzzer.claim_value_mode;

    if cli.dry_run {
        return print_cases(&plan.tokens, &message, &assignments, mode, config.fuzzer.max_cases);
    }

    let client = HttpClient::new(&config.dispatch)?;
    tracing::info!(url = %client.target_url(&message)?, "Fuzzing");

    let fuzzer = Fuzzer::new(config.fuzzer.clone(), Arc::new(client));
    let (message_ref, assignments) = (&message, &assignments);
    let cases = plan
        .tokens
        .iter()
        .flat_map(move |token| token.cases(message_ref, move |t: &FuzzTarget| assignments.source_for(t), mode));

    // Stopping lets the run finish in-flight requests and return what it has
    let control = fuzzer.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, waiting for in-flight requests");
            control.stop();
        }
    });

    let start_time = Utc::now();
    let results = fuzzer.run(&message, cases).await;
    interrupt.abort();
    let results = results?;

    let stats = results.stats();
    println!(
        "{} cases: {} answered, {} errors, {} skipped, {} interesting",
        stats.total_cases, stats.successful_requests, stats.error_count, stats.skipped_count, stats.interesting_count
    );
    for result in results.interesting_results() {
        println!(
            "  #{} {} <- {:?}: {} ({})",
            result.case_num,
            result.target,
            result.payload,
            result.status_code,
            result.interesting_reason.as_deref().unwrap_or("")
        );
    }

    if let Some(output) = &cli.output {
        let metadata = ReportMetadata {
            request: message
                .request_line()
                .map(|line| format!("{} {}", line.method, line.target))
                .unwrap_or_default(),
            tokens_fuzzed: plan.tokens.len(),
            start_time,
            end_time: Utc::now(),
            ..Default::default()
        };
        FuzzReport::new(results, metadata).save(output, cli.minify)?;
    }

    Ok(())
}

/// Write each case as one JSON line on stdout
fn print_cases(
    tokens: &[TokenPlan],
    message: &HttpMessage,
    assignments: &PayloadAssignments,
    mode: ClaimValueMode,
    max_cases: Option<usize>,
) -> Result<()> {
    let cases = tokens
        .iter()
        .flat_map(move |token| token.cases(message, move |t: &FuzzTarget| assignments.source_for(t), mode))
        .take(max_cases.unwrap_or(usize::MAX));

    for (idx, case) in cases.enumerate() {
        let line = match &case {
            Ok(case) => DryRunCase {
                case: idx + 1,
                target: case.target.to_string(),
                payload: &case.payload,
                token: Some(case.token.serialize()),
                skipped: None,
            },
            Err(e) => DryRunCase {
                case: idx + 1,
                target: e.target.to_string(),
                payload: &e.payload,
                token: None,
                skipped: Some(e.error.to_string()),
            },
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    Ok(())
}

/// Payload sources from `--payloads` and `--wordlist`, or the built-in
/// defaults when neither is given
fn build_assignments(cli: &Cli) -> Result<PayloadAssignments> {
    if cli.payloads.is_empty() && cli.wordlist.is_none() {
        return Ok(default_assignments());
    }

    let mut assignments = PayloadAssignments::new();
    for assignment in &cli.payloads {
        let (target, source) = assignment
            .split_once('=')
            .with_context(|| format!("Invalid payload assignment '{}', expected TARGET=SOURCE", assignment))?;
        let target: FuzzTarget = target.parse()?;
        assignments = assignments.assign(target, open_source(source)?);
    }

    if let Some(wordlist) = &cli.wordlist {
        assignments = assignments.with_fallback(open_source(wordlist)?);
    }

    Ok(assignments)
}

/// Built-in sets matched to the claims they are meant for
fn default_assignments() -> PayloadAssignments {
    let mut assignments = PayloadAssignments::new().with_fallback(Arc::new(PayloadSet::privilege_values()));
    for (target, set) in [
        (FuzzTarget::header_claim("alg"), PayloadSet::algorithms()),
        (FuzzTarget::header_claim("kid"), PayloadSet::kid_injection()),
        (FuzzTarget::header_claim("typ"), PayloadSet::token_types()),
        (FuzzTarget::signature(), PayloadSet::signature_mutations()),
    ] {
        assignments = assignments.assign(target, Arc::new(set));
    }
    assignments
}

/// Resolve `builtin:<name>`, `range:<start>..<end>` or a wordlist path
fn open_source(source: &str) -> Result<Arc<dyn PayloadSource>> {
    if let Some(name) = source.strip_prefix("builtin:") {
        return match PayloadSet::builtin(name) {
            Some(set) => Ok(Arc::new(set)),
            None => bail!(
                "Unknown built-in payload set '{}' (available: {})",
                name,
                PayloadSet::builtin_names().join(", ")
            ),
        };
    }

    if let Some(range) = source.strip_prefix("range:") {
        let (start, end) = range
            .split_once("..")
            .with_context(|| format!("Invalid range '{}', expected <start>..<end>", range))?;
        let start = start.trim().parse().with_context(|| format!("Invalid range start '{}'", start))?;
        let end = end.trim().parse().with_context(|| format!("Invalid range end '{}'", end))?;
        return Ok(Arc::new(NumberRange::new(start, end)));
    }

    Ok(Arc::new(FileLines::open(source)?))
}

/// Initialize the logging system
fn init_logging(cli: &Cli) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if let Some(log_path) = &cli.log_file {
        // File-based logging with rotation
        let file_appender = if log_path.contains('/') || log_path.contains('\\') {
            let path = Path::new(log_path);
            let dir = path.parent().unwrap_or(Path::new("."));
            let filename = path.file_name().and_then(|s| s.to_str()).unwrap_or("jwtfuzz.log");
            RollingFileAppender::new(Rotation::DAILY, dir, filename)
        } else {
            // Use default log directory
            let log_dir = Config::data_dir()
                .map(|d| d.join("logs"))
                .unwrap_or_else(|_| PathBuf::from("."));
            std::fs::create_dir_all(&log_dir).ok();
            RollingFileAppender::new(Rotation::DAILY, log_dir, log_path)
        };

        if cli.log_json {
            let file_layer = fmt::layer().json().with_writer(file_appender).with_ansi(false);
            subscriber.with(file_layer).init();
        } else {
            let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
            subscriber.with(file_layer).init();
        }
    } else if cli.log_json {
        // stdout carries cases and summaries, logs go to stderr
        subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    Ok(())
}

/// Load configuration with CLI overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;

    // Apply CLI overrides
    if !cli.targets.is_empty() {
        config.fuzzer.targets = cli.targets.clone();
    }
    if cli.json_claims {
        config.fuzzer.claim_value_mode = ClaimValueMode::Json;
    }
    if let Some(max_cases) = cli.max_cases {
        config.fuzzer.max_cases = Some(max_cases);
    }
    if let Some(concurrency) = cli.concurrency {
        config.fuzzer.max_concurrent = concurrency;
    }
    if let Some(delay_ms) = cli.delay_ms {
        config.fuzzer.delay_ms = delay_ms;
    }
    if let Some(scheme) = &cli.scheme {
        config.dispatch.scheme = scheme.clone();
    }
    if cli.insecure {
        config.dispatch.accept_invalid_certs = true;
    }

    config.validate()?;

    Ok(config)
}

/// Generate default configuration file
fn generate_default_config() -> Result<()> {
    let config = Config::default();
    let toml = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;

    println!("{}", toml);
    Ok(())
}
