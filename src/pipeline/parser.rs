//! Deterministic phrase extraction from a free-text prompt.
//!
//! Recognizes a small vocabulary of trigger phrases, at most one condition
//! per category (subject, body, pdf, skill), plus label phrases. Anything
//! else in the prompt is ignored.

use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::config::LabelDefaults;
use crate::pipeline::pattern::placeholder_pattern;
use crate::pipeline::rule::{Condition, ConditionKind, FieldCondition, Operator, Rule};

// Condition triggers run on the lowercased prompt.
static SUBJECT_CONTAINS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"subject contains ["']([^"']+)["']"#).unwrap());
static BODY_CONTAINS_DOUBLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"body contains "([^"]+)""#).unwrap());
static BODY_CONTAINS_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"body contains '([^']+)'"#).unwrap());
static BODY_CONTAINS_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"body contains ([^,]+)").unwrap());
static SKILLED_IN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"skilled in (\w+)").unwrap());

// Label phrases run case-insensitively on the unmodified prompt so the
// captured label keeps its casing.
static LABEL_WITH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)label.*?\bwith\b.*?(\w+(?:\s+\w+)*)").unwrap());
static ELSE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:else|otherwise)\b.*?(\w+(?:\s+\w+)*)").unwrap());
static MARK_AS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)mark.*?\bas\s+([^,\s]+(?:\s+[^,\s]+)*)").unwrap());

const SUBJECT_EXISTS: &[&str] = &["subject exists", "subject not empty", "subject is not empty"];
const SUBJECT_MISSING: &[&str] = &[
    "no subject",
    "without subject",
    "without a subject",
    "empty subject",
    "subject is empty",
    "subject does not exist",
];
const BODY_EXISTS: &[&str] = &["body exists", "body not empty", "body is not empty"];
const BODY_MISSING: &[&str] = &[
    "no body",
    "without body",
    "without a body",
    "empty body",
    "body is empty",
    "body does not exist",
];
const PDF_EXISTS: &[&str] = &["pdf exists", "has pdf", "has a pdf", "has attachment", "has an attachment"];
const PDF_MISSING: &[&str] = &["no pdf", "without pdf", "without a pdf", "no attachment"];

/// Words that end an unquoted `body contains` phrase.
const PHRASE_TERMINATORS: &[&str] = &[" then ", " else ", " otherwise ", " label", " as "];
/// Words that end an unquoted label.
const LABEL_TERMINATORS: &[&str] = &[" else", " otherwise", " if "];

/// Label names resolved from the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptActions {
    pub pass_label: String,
    pub fail_label: String,
}

/// Result of parsing one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrompt {
    pub conditions: Vec<Condition>,
    pub actions: PromptActions,
    /// Label named by `label ... with` or `mark ... as`.
    pub requested_label: Option<String>,
    /// Label named by an explicit `else` clause.
    pub else_label: Option<String>,
}

impl ParsedPrompt {
    /// Build the rule list: one rule carrying every condition, labelled with
    /// the requested label (or the fail label), followed by a catch-all for
    /// an explicit `else` clause. No conditions means no rules.
    pub fn to_rules(&self) -> Vec<Rule> {
        if self.conditions.is_empty() {
            return Vec::new();
        }

        let label = self
            .requested_label
            .clone()
            .unwrap_or_else(|| self.actions.fail_label.clone());
        let mut rule = Rule::catch_all(label);

        for condition in &self.conditions {
            let text = condition.value.as_text();
            match condition.kind {
                ConditionKind::SubjectExists => {
                    rule.subject = Some(FieldCondition::new(Operator::Exists))
                }
                ConditionKind::SubjectMissing => {
                    rule.subject = Some(FieldCondition::new(Operator::DoesNotExist))
                }
                ConditionKind::SubjectContains => {
                    rule.subject = Some(FieldCondition::with_operand(Operator::Contains, text))
                }
                ConditionKind::BodyExists => rule.body = Some(FieldCondition::new(Operator::Exists)),
                ConditionKind::BodyMissing => {
                    rule.body = Some(FieldCondition::new(Operator::DoesNotExist))
                }
                ConditionKind::BodyContains => {
                    rule.body = Some(FieldCondition::with_operand(Operator::ContainsPattern, text))
                }
                // A skill check implies a PDF, so it takes the PDF slot.
                ConditionKind::PdfExists if rule.pdf.is_none() => {
                    rule.pdf = Some(FieldCondition::new(Operator::Exists))
                }
                ConditionKind::PdfMissing => {
                    rule.pdf = Some(FieldCondition::new(Operator::DoesNotExist))
                }
                ConditionKind::ResumeSkill => {
                    rule.pdf = Some(FieldCondition::with_operand(Operator::ContainsSkill, text))
                }
                _ => {}
            }
        }

        let mut rules = vec![rule];
        if let Some(else_label) = &self.else_label {
            rules.push(Rule::catch_all(else_label.clone()));
        }
        rules
    }
}

/// Deterministic prompt parser.
#[derive(Debug, Clone)]
pub struct PromptParser {
    pass_label: String,
    fail_label: String,
}

impl PromptParser {
    pub fn new(labels: &LabelDefaults) -> Self {
        Self {
            pass_label: labels.pass_label.clone(),
            fail_label: labels.fail_label.clone(),
        }
    }

    pub fn parse(&self, prompt: &str) -> ParsedPrompt {
        let lower = prompt.to_lowercase();
        let conditions = parse_conditions(&lower);

        let mut parsed = ParsedPrompt {
            conditions,
            actions: PromptActions {
                pass_label: self.pass_label.clone(),
                fail_label: self.fail_label.clone(),
            },
            requested_label: None,
            else_label: None,
        };
        self.parse_actions(prompt, &lower, &mut parsed);

        info!(
            conditions = ?parsed.conditions,
            pass_label = %parsed.actions.pass_label,
            fail_label = %parsed.actions.fail_label,
            "Parsed prompt"
        );
        parsed
    }

    fn parse_actions(&self, prompt: &str, lower: &str, parsed: &mut ParsedPrompt) {
        if let Some(label) = capture_label(&ELSE_LABEL, prompt) {
            parsed.actions.fail_label = label.clone();
            parsed.else_label = Some(label);
        }

        if lower.contains("label") && lower.contains("with") {
            if let Some(label) = capture_label(&LABEL_WITH, prompt) {
                parsed.actions.pass_label = label.clone();
                parsed.requested_label = Some(label);
            }
        } else if lower.contains("mark")
            && let Some(label) = capture_label(&MARK_AS, prompt)
        {
            if label.to_lowercase().contains("deleted") {
                parsed.actions.fail_label = label.clone();
            } else {
                parsed.actions.pass_label = label.clone();
            }
            parsed.requested_label = Some(label);
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Cut `text` at the first terminator, if any.
fn cut_at<'a>(text: &'a str, terminators: &[&str]) -> &'a str {
    let lower = text.to_lowercase();
    let end = terminators
        .iter()
        .filter_map(|t| lower.find(t))
        .min()
        .unwrap_or(text.len());
    // Lowercasing ASCII keeps byte offsets; fall back to the whole text otherwise.
    text.get(..end).unwrap_or(text)
}

fn capture_label(re: &Regex, prompt: &str) -> Option<String> {
    let raw = re.captures(prompt)?.get(1)?.as_str();
    let label = cut_at(raw, LABEL_TERMINATORS).trim();
    (!label.is_empty()).then(|| label.to_string())
}

fn parse_conditions(lower: &str) -> Vec<Condition> {
    let mut conditions = Vec::new();

    if lower.contains("subject") {
        if contains_any(lower, SUBJECT_EXISTS) {
            conditions.push(Condition::flag(ConditionKind::SubjectExists));
        } else if contains_any(lower, SUBJECT_MISSING) {
            conditions.push(Condition::flag(ConditionKind::SubjectMissing));
        } else if let Some(caps) = SUBJECT_CONTAINS.captures(lower) {
            conditions.push(Condition::text(ConditionKind::SubjectContains, &caps[1]));
        }
    }

    if lower.contains("body") {
        if contains_any(lower, BODY_EXISTS) {
            conditions.push(Condition::flag(ConditionKind::BodyExists));
        } else if contains_any(lower, BODY_MISSING) {
            conditions.push(Condition::flag(ConditionKind::BodyMissing));
        } else if let Some(phrase) = body_phrase(lower) {
            conditions.push(Condition::text(
                ConditionKind::BodyContains,
                placeholder_pattern(&phrase),
            ));
        }
    }

    if contains_any(lower, PDF_MISSING) {
        conditions.push(Condition::flag(ConditionKind::PdfMissing));
    } else if contains_any(lower, PDF_EXISTS) {
        conditions.push(Condition::flag(ConditionKind::PdfExists));
    }

    if let Some(caps) = SKILLED_IN.captures(lower) {
        conditions.push(Condition::text(ConditionKind::ResumeSkill, &caps[1]));
    }

    conditions
}

/// The phrase after `body contains`, without quotes that wrap all of it.
fn body_phrase(lower: &str) -> Option<String> {
    if let Some(caps) = BODY_CONTAINS_DOUBLE.captures(lower) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = BODY_CONTAINS_SINGLE.captures(lower) {
        return Some(caps[1].to_string());
    }
    let caps = BODY_CONTAINS_BARE.captures(lower)?;
    let phrase = cut_at(&caps[1], PHRASE_TERMINATORS).trim();
    (!phrase.is_empty()).then(|| phrase.to_string())
}
