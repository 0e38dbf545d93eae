//! Shared types for the categorization pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Email components ────────────────────────────────────────────────

/// Reference to the first PDF part of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfAttachment {
    pub filename: String,
    /// Set when the payload must be fetched separately.
    pub attachment_id: Option<String>,
    /// Set when the payload is inlined in the message.
    pub inline_data: Option<String>,
}

/// Normalized view of one message, derived once and then read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailComponents {
    pub message_id: String,
    pub subject: String,
    /// Decoded text/plain and tag-stripped text/html parts, depth-first.
    pub body: String,
    pub has_pdf: bool,
    pub pdf: Option<PdfAttachment>,
    /// Lowercased resume text, filled by the driver when a rule needs it.
    pub pdf_text: Option<String>,
}

// ── Per-message outcome ─────────────────────────────────────────────

/// Outcome of evaluating one scanned message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub message_id: String,
    /// `None` means no rule matched.
    pub label: Option<String>,
}

impl MatchResult {
    pub fn matched(message_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            label: Some(label.into()),
        }
    }

    pub fn no_match(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            label: None,
        }
    }
}

// ── Run state ───────────────────────────────────────────────────────

/// Lifecycle of one categorization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing has happened yet.
    Idle,
    /// Rules were produced; scanning has not started.
    RulesReady,
    /// Batches are being pulled and evaluated.
    Scanning,
    /// Scanning finished (listing exhausted, cap reached or a page failed).
    Done,
    /// No rules, or the mailbox was unavailable.
    Aborted,
}

impl RunState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: RunState) -> bool {
        use RunState::*;

        matches!(
            (self, target),
            (Idle, RulesReady) | (Idle, Aborted) | (RulesReady, Scanning) | (Scanning, Done)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::RulesReady => "rules_ready",
            Self::Scanning => "scanning",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

// ── Run summary ─────────────────────────────────────────────────────

/// Counters and timing for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub state: RunState,
    /// Messages processed within the cap, including skipped ones.
    pub scanned: usize,
    /// Messages whose processing failed.
    pub skipped: usize,
    /// Label name → number of messages labelled with it.
    pub label_counts: BTreeMap<String, usize>,
    /// Number of active rules.
    pub rules: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: RunState::Idle,
            scanned: 0,
            skipped: 0,
            label_counts: BTreeMap::new(),
            rules: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to `target`, ignoring transitions the state machine forbids.
    pub fn transition(&mut self, target: RunState) {
        if self.state.can_transition_to(target) {
            tracing::debug!(from = %self.state, to = %target, "Run state transition");
            self.state = target;
            if target.is_terminal() {
                self.finished_at = Some(Utc::now());
            }
        } else {
            tracing::warn!(from = %self.state, to = %target, "Ignoring invalid run state transition");
        }
    }

    /// Count one scanned message's outcome.
    pub fn record(&mut self, result: &MatchResult) {
        self.scanned += 1;
        if let Some(label) = &result.label {
            *self.label_counts.entry(label.clone()).or_insert(0) += 1;
        }
    }

    /// Count one message whose processing failed.
    pub fn record_skipped(&mut self) {
        self.scanned += 1;
        self.skipped += 1;
    }

    /// Total messages that received a label.
    pub fn labelled(&self) -> usize {
        self.label_counts.values().sum()
    }
}
