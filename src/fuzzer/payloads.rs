//! Payload sources for fuzzing
//!
//! A [`PayloadSource`] hands out a fresh, finite sequence of replacement
//! strings every time it is asked. Sources are shared between targets and
//! threads, so they hold no iteration state of their own.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::FuzzTarget;

/// Provider of replacement values
pub trait PayloadSource: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &str;

    /// A new sequence of values, starting from the first one
    fn values(&self) -> Box<dyn Iterator<Item = String> + '_>;
}

impl fmt::Debug for dyn PayloadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadSource({})", self.name())
    }
}

/// Wordlist lines worth fuzzing with: not empty, not a `#` comment
fn keep_line(line: &str) -> bool {
    !line.is_empty() && !line.starts_with('#')
}

/// A named, in-memory list of payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSet {
    /// Name of the payload set
    pub name: String,
    /// List of payloads
    pub payloads: Vec<String>,
}

impl PayloadSet {
    /// Create a new payload set from a list
    pub fn new(name: &str, payloads: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            payloads,
        }
    }

    fn from_strs(name: &str, payloads: &[&str]) -> Self {
        Self::new(name, payloads.iter().map(|p| p.to_string()).collect())
    }

    /// Load payloads from a wordlist file
    pub fn from_file(name: &str, path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open wordlist: {}", path.display()))?;
        let reader = BufReader::new(file);

        let mut payloads = Vec::new();
        for line in reader.lines() {
            let line = line.with_context(|| format!("Failed to read wordlist: {}", path.display()))?;
            if keep_line(&line) {
                payloads.push(line);
            }
        }

        Ok(Self::new(name, payloads))
    }

    /// Look up a built-in set by name
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "algorithms" => Some(Self::algorithms()),
            "privilege" => Some(Self::privilege_values()),
            "kid" => Some(Self::kid_injection()),
            "signatures" => Some(Self::signature_mutations()),
            "types" => Some(Self::token_types()),
            _ => None,
        }
    }

    /// Names accepted by [`PayloadSet::builtin`]
    pub fn builtin_names() -> &'static [&'static str] {
        &["algorithms", "privilege", "kid", "signatures", "types"]
    }

    /// `alg` header values, including the unsigned variants
    pub fn algorithms() -> Self {
        Self::from_strs("algorithms", &[
            "none", "None", "NONE", "nOnE",
            "HS256", "HS384", "HS512",
            "RS256", "RS384", "RS512",
            "ES256", "ES384", "ES512",
            "PS256", "PS384", "PS512",
            "EdDSA", "",
        ])
    }

    /// Values commonly accepted as elevated roles or identities
    pub fn privilege_values() -> Self {
        Self::from_strs("privilege", &[
            "admin", "administrator", "root", "superuser", "system",
            "0", "1", "-1", "true", "*",
        ])
    }

    /// `kid` header values probing path traversal, SQL and command injection
    pub fn kid_injection() -> Self {
        Self::from_strs("kid", &[
            "../../../../../../dev/null",
            "/dev/null",
            "../../../../../../etc/passwd",
            "' OR '1'='1",
            "' UNION SELECT 'key'--",
            "key.pem; id",
            "|id",
            "$(id)",
            "http://127.0.0.1/",
            "",
        ])
    }

    /// Replacement signature segments
    pub fn signature_mutations() -> Self {
        Self::from_strs("signatures", &[
            "",
            "AA",
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "invalid",
            "null",
        ])
    }

    /// `typ` and `cty` header values
    pub fn token_types() -> Self {
        Self::from_strs("types", &["JWT", "jwt", "JWS", "JWE", "at+jwt", "", "text/plain"])
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

impl PayloadSource for PayloadSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn values(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.payloads.iter().cloned())
    }
}

/// A single fixed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPayload(pub String);

impl StaticPayload {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl PayloadSource for StaticPayload {
    fn name(&self) -> &str {
        "static"
    }

    fn values(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(std::iter::once(self.0.clone()))
    }
}

/// Wordlist read lazily from disk on every pass
///
/// Large lists stream line by line instead of being held in memory.
#[derive(Debug, Clone)]
pub struct FileLines {
    name: String,
    path: PathBuf,
}

impl FileLines {
    /// Check the file can be opened and remember its path
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        File::open(&path).with_context(|| format!("Failed to open wordlist: {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("wordlist")
            .to_string();
        Ok(Self { name, path })
    }
}

impl PayloadSource for FileLines {
    fn name(&self) -> &str {
        &self.name
    }

    fn values(&self) -> Box<dyn Iterator<Item = String> + '_> {
        match File::open(&self.path) {
            Ok(file) => Box::new(
                BufReader::new(file)
                    .lines()
                    .map_while(|line| match line {
                        Ok(line) => Some(line),
                        Err(e) => {
                            tracing::warn!(path = %self.path.display(), error = %e, "Stopped reading wordlist");
                            None
                        }
                    })
                    .filter(|line| keep_line(line)),
            ),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Wordlist is no longer readable");
                Box::new(std::iter::empty())
            }
        }
    }
}

/// Generated inclusive range of integers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberRange {
    pub start: i64,
    pub end: i64,
}

impl NumberRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

impl PayloadSource for NumberRange {
    fn name(&self) -> &str {
        "numbers"
    }

    fn values(&self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new((self.start..=self.end).map(|n| n.to_string()))
    }
}

/// Which payload source feeds which target
#[derive(Debug, Clone, Default)]
pub struct PayloadAssignments {
    per_target: HashMap<FuzzTarget, Arc<dyn PayloadSource>>,
    fallback: Option<Arc<dyn PayloadSource>>,
}

impl PayloadAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `source` for every target without its own assignment
    pub fn with_fallback(mut self, source: Arc<dyn PayloadSource>) -> Self {
        self.fallback = Some(source);
        self
    }

    /// Use `source` for one target
    pub fn assign(mut self, target: FuzzTarget, source: Arc<dyn PayloadSource>) -> Self {
        self.per_target.insert(target, source);
        self
    }

    /// Source for a target; `None` means the target is not fuzzed
    pub fn source_for(&self, target: &FuzzTarget) -> Option<&dyn PayloadSource> {
        self.per_target
            .get(target)
            .or(self.fallback.as_ref())
            .map(|s| &**s)
    }

    /// Targets with an explicit assignment
    pub fn assigned_targets(&self) -> impl Iterator<Item = &FuzzTarget> {
        self.per_target.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.per_target.is_empty() && self.fallback.is_none()
    }
}
