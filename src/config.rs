//! Configuration types.
//!
//! Everything here is read once at startup and never mutated afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Gmail search selecting messages with a PDF attachment.
pub const DEFAULT_SEARCH_QUERY: &str = "has:attachment filename:pdf";

/// Label applied to messages matching a phrase rule when the prompt names none.
pub const DEFAULT_PASS_LABEL: &str = "To be Reviewed";
pub const DEFAULT_FAIL_LABEL: &str = "To be Deleted";

/// Label used by the keyword qualification pipeline for rejected resumes.
pub const DEFAULT_DELETE_LABEL: &str = "To Be Deleted";

/// 15 requests per minute on the free model tier.
const DEFAULT_MODEL_CALL_DELAY: Duration = Duration::from_secs(4);

const DEFAULT_BATCH_SIZE: usize = 50;

const DEFAULT_STOP_WORDS: &[&str] = &[
    "find", "me", "a", "candidate", "who", "is", "skilled", "in", "the", "and", "or", "but",
    "with", "has", "have", "had", "been", "being", "be", "am", "are", "was", "were", "looking",
    "for", "someone", "need", "person", "developer", "engineer", "programmer", "experience",
    "years", "of", "work", "job", "position", "role", "team", "company",
];

const DEFAULT_INDUSTRY_KEYWORDS: &[(&str, &[&str])] = &[
    ("java", &["java", "spring", "hibernate", "maven", "gradle", "junit", "jvm"]),
    ("python", &["python", "django", "flask", "numpy", "pandas", "scikit-learn", "pip"]),
    ("javascript", &["javascript", "node.js", "react", "angular", "vue", "typescript", "npm"]),
    ("frontend", &["html", "css", "javascript", "react", "angular", "vue", "bootstrap"]),
    ("backend", &["java", "python", "node.js", "php", "c#", "database", "api"]),
    ("devops", &["docker", "kubernetes", "aws", "azure", "jenkins", "git", "ci/cd"]),
    ("data", &["python", "sql", "pandas", "numpy", "machine learning", "data analysis"]),
    ("mobile", &["android", "ios", "react native", "flutter", "swift", "kotlin"]),
];

/// Which rule producer / evaluator pair a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// Deterministic phrase extraction, evaluated locally.
    #[default]
    Pattern,
    /// Rules and per-email classification from a language model.
    Model,
    /// Prompt is search criteria; resumes below the match threshold are labelled.
    Keyword,
}

impl FromStr for PipelineMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pattern" | "deterministic" => Ok(Self::Pattern),
            "model" | "ai" | "llm" => Ok(Self::Model),
            "keyword" | "keywords" => Ok(Self::Keyword),
            other => Err(ConfigError::InvalidValue {
                key: "SCANNER_PIPELINE".into(),
                message: format!("unknown pipeline '{other}' (expected pattern, model or keyword)"),
            }),
        }
    }
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pattern => "pattern",
            Self::Model => "model",
            Self::Keyword => "keyword",
        };
        write!(f, "{s}")
    }
}

/// Keyword matching tables and thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Fraction of keywords that must appear in a resume to qualify.
    pub match_threshold: f64,
    /// Tokens shorter than this are ignored.
    pub min_keyword_length: usize,
    /// Words never treated as keywords.
    pub stop_words: BTreeSet<String>,
    /// Industry bucket name → related terms.
    pub industry_keywords: BTreeMap<String, Vec<String>>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.5,
            min_keyword_length: 3,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            industry_keywords: DEFAULT_INDUSTRY_KEYWORDS
                .iter()
                .map(|(bucket, terms)| {
                    (
                        bucket.to_string(),
                        terms.iter().map(|t| t.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

impl MatchingConfig {
    /// Load matching tables from a JSON file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "match_threshold".into(),
                message: format!("{} is outside [0, 1]", self.match_threshold),
            });
        }
        Ok(())
    }
}

/// Label names used when the prompt does not name its own.
#[derive(Debug, Clone)]
pub struct LabelDefaults {
    pub pass_label: String,
    pub fail_label: String,
    pub delete_label: String,
}

impl Default for LabelDefaults {
    fn default() -> Self {
        Self {
            pass_label: DEFAULT_PASS_LABEL.to_string(),
            fail_label: DEFAULT_FAIL_LABEL.to_string(),
            delete_label: DEFAULT_DELETE_LABEL.to_string(),
        }
    }
}

/// Scanner configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Mailbox search selecting candidate messages.
    pub search_query: String,
    /// Messages requested per page from the mailbox.
    pub batch_size: usize,
    /// Optional cap on messages processed per run.
    pub max_messages: Option<usize>,
    /// Rule producer / evaluator selection.
    pub pipeline: PipelineMode,
    /// Pause between consecutive per-email model calls.
    pub model_call_delay: Duration,
    pub labels: LabelDefaults,
    pub matching: MatchingConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            search_query: DEFAULT_SEARCH_QUERY.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_messages: None,
            pipeline: PipelineMode::default(),
            model_call_delay: DEFAULT_MODEL_CALL_DELAY,
            labels: LabelDefaults::default(),
            matching: MatchingConfig::default(),
        }
    }
}

impl ScannerConfig {
    /// Build config from `SCANNER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(query) = std::env::var("SCANNER_QUERY") {
            config.search_query = query;
        }
        if let Some(size) = parse_env::<usize>("SCANNER_BATCH_SIZE")? {
            if size == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "SCANNER_BATCH_SIZE".into(),
                    message: "must be at least 1".into(),
                });
            }
            config.batch_size = size;
        }
        config.max_messages = parse_env::<usize>("SCANNER_MAX_EMAILS")?;
        if let Ok(mode) = std::env::var("SCANNER_PIPELINE") {
            config.pipeline = mode.parse()?;
        }
        if let Some(ms) = parse_env::<u64>("SCANNER_MODEL_DELAY_MS")? {
            config.model_call_delay = Duration::from_millis(ms);
        }

        if let Ok(label) = std::env::var("SCANNER_PASS_LABEL") {
            config.labels.pass_label = label;
        }
        if let Ok(label) = std::env::var("SCANNER_FAIL_LABEL") {
            config.labels.fail_label = label;
        }
        if let Ok(label) = std::env::var("SCANNER_DELETE_LABEL") {
            config.labels.delete_label = label;
        }

        if let Ok(path) = std::env::var("SCANNER_MATCHING_FILE") {
            config.matching = MatchingConfig::from_file(Path::new(&path))?;
        }
        if let Some(threshold) = parse_env::<f64>("SCANNER_MATCH_THRESHOLD")? {
            config.matching.match_threshold = threshold;
            config.matching.validate()?;
        }

        Ok(config)
    }
}

/// Parse an optional environment variable, rejecting malformed values.
fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
