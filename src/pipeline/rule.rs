//! Rule and condition model.
//!
//! A `Rule` is what both rule producers emit and what gets sent back to a
//! model for classification. Its wire form is a JSON object:
//!
//! ```json
//! {"Subject": ["Contains", "Java"], "PDF": ["Exists"], "Label Action": ["Java"]}
//! ```
//!
//! Each group is `[operator]` or `[operator, operand]`; the operand may also
//! follow the operator inline (`["Contains Java"]`). Operator names are
//! matched case-insensitively, ignoring spaces.
//!
//! For evaluation, rules are lowered into flat `Condition`s, the same
//! vocabulary the phrase parser emits, so there is one dispatch path.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

// ── Operators ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Exists,
    DoesNotExist,
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
    ContainsPattern,
    ContainsSkill,
    DoesNotContainSkill,
    QualifiesFor,
    DoesNotQualifyFor,
}

/// Squashed (lowercase, no separators) names, longest first so that
/// `contains pattern` is not read as `contains` + operand `pattern`.
const OPERATOR_NAMES: &[(&str, Operator)] = &[
    ("doesnotcontainskill", Operator::DoesNotContainSkill),
    ("doesnotqualifyfor", Operator::DoesNotQualifyFor),
    ("containspattern", Operator::ContainsPattern),
    ("doesnotcontains", Operator::DoesNotContain),
    ("doesnotcontain", Operator::DoesNotContain),
    ("containsskill", Operator::ContainsSkill),
    ("doesnotexists", Operator::DoesNotExist),
    ("doesnotexist", Operator::DoesNotExist),
    ("qualifiesfor", Operator::QualifiesFor),
    ("startswith", Operator::StartsWith),
    ("endswith", Operator::EndsWith),
    ("contains", Operator::Contains),
    ("exists", Operator::Exists),
    ("exist", Operator::Exists),
];

impl Operator {
    /// Display name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exists => "Exists",
            Self::DoesNotExist => "Does not Exist",
            Self::Contains => "Contains",
            Self::DoesNotContain => "Does not Contain",
            Self::StartsWith => "Starts with",
            Self::EndsWith => "Ends with",
            Self::ContainsPattern => "Contains pattern",
            Self::ContainsSkill => "Contains skill",
            Self::DoesNotContainSkill => "Does not contain skill",
            Self::QualifiesFor => "Qualifies for",
            Self::DoesNotQualifyFor => "Does not qualify for",
        }
    }

    /// Whether the operator is meaningless without an operand.
    pub fn needs_operand(&self) -> bool {
        !matches!(self, Self::Exists | Self::DoesNotExist)
    }

    /// Parse a leading operator name. Returns the operator and the rest of
    /// the input (a possible inline operand).
    pub fn parse_prefix(input: &str) -> Option<(Self, &str)> {
        let input = input.trim();
        OPERATOR_NAMES.iter().find_map(|(name, op)| {
            squashed_prefix_len(input, name).map(|end| (*op, &input[end..]))
        })
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || ch == '_' || ch == '-'
}

/// Byte length of the prefix of `input` that spells `squashed` when
/// separators are ignored, provided it ends on a word boundary.
fn squashed_prefix_len(input: &str, squashed: &str) -> Option<usize> {
    let mut want = squashed.chars().peekable();
    for (idx, ch) in input.char_indices() {
        let Some(&expected) = want.peek() else {
            let boundary = is_separator(ch) || matches!(ch, ':' | '\'' | '"' | ',');
            return boundary.then_some(idx);
        };
        if is_separator(ch) {
            continue;
        }
        if ch.to_ascii_lowercase() != expected {
            return None;
        }
        want.next();
    }
    want.peek().is_none().then_some(input.len())
}

/// Trim whitespace, a leading colon and one layer of matching quotes.
fn clean_operand(raw: &str) -> Option<String> {
    let mut s = raw.trim();
    s = s.strip_prefix(':').unwrap_or(s).trim();
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            s = &s[1..s.len() - 1];
            break;
        }
    }
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

// ── Condition groups ────────────────────────────────────────────────

/// One `Subject` / `Body` / `PDF` group: an operator and optional operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGroup", into = "Vec<String>")]
pub struct FieldCondition {
    pub operator: Operator,
    pub operand: Option<String>,
}

impl FieldCondition {
    pub fn new(operator: Operator) -> Self {
        Self {
            operator,
            operand: None,
        }
    }

    pub fn with_operand(operator: Operator, operand: impl Into<String>) -> Self {
        Self {
            operator,
            operand: Some(operand.into()),
        }
    }

    fn operand_text(&self) -> &str {
        self.operand.as_deref().unwrap_or_default()
    }
}

/// Accepted JSON shapes for a group or a label action.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawGroup {
    List(Vec<String>),
    Single(String),
}

impl RawGroup {
    fn into_parts(self) -> Vec<String> {
        match self {
            Self::List(items) => items,
            Self::Single(s) => vec![s],
        }
    }
}

impl TryFrom<RawGroup> for FieldCondition {
    type Error = String;

    fn try_from(raw: RawGroup) -> Result<Self, Self::Error> {
        let parts = raw.into_parts();
        let head = parts.first().ok_or("empty condition group")?;
        let (operator, inline) =
            Operator::parse_prefix(head).ok_or_else(|| format!("unknown operator '{head}'"))?;

        let operand = parts
            .get(1)
            .and_then(|s| clean_operand(s))
            .or_else(|| clean_operand(inline));

        if operator.needs_operand() && operand.is_none() {
            return Err(format!("operator '{operator}' needs an operand"));
        }

        Ok(Self {
            operator,
            operand: if operator.needs_operand() { operand } else { None },
        })
    }
}

impl From<FieldCondition> for Vec<String> {
    fn from(group: FieldCondition) -> Self {
        let mut out = vec![group.operator.as_str().to_string()];
        out.extend(group.operand);
        out
    }
}

/// Treat `null` and `[]` as an absent group.
fn optional_group<'de, D>(deserializer: D) -> Result<Option<FieldCondition>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawGroup>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawGroup::List(items)) if items.is_empty() => Ok(None),
        Some(raw) => FieldCondition::try_from(raw).map(Some).map_err(D::Error::custom),
    }
}

/// Label name applied when a rule matches. Case is preserved exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGroup", into = "Vec<String>")]
pub struct LabelAction(pub String);

impl LabelAction {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<RawGroup> for LabelAction {
    type Error = String;

    fn try_from(raw: RawGroup) -> Result<Self, Self::Error> {
        raw.into_parts()
            .into_iter()
            .find_map(|s| clean_operand(&s))
            .map(LabelAction)
            .ok_or_else(|| "empty label action".to_string())
    }
}

impl From<LabelAction> for Vec<String> {
    fn from(label: LabelAction) -> Self {
        vec![label.0]
    }
}

// ── Rules ───────────────────────────────────────────────────────────

/// A routing rule: all present groups must hold for `label` to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(
        rename = "Subject",
        default,
        deserialize_with = "optional_group",
        skip_serializing_if = "Option::is_none"
    )]
    pub subject: Option<FieldCondition>,
    #[serde(
        rename = "Body",
        default,
        deserialize_with = "optional_group",
        skip_serializing_if = "Option::is_none"
    )]
    pub body: Option<FieldCondition>,
    #[serde(
        rename = "PDF",
        default,
        deserialize_with = "optional_group",
        skip_serializing_if = "Option::is_none"
    )]
    pub pdf: Option<FieldCondition>,
    #[serde(rename = "Label Action")]
    pub label: LabelAction,
}

impl Rule {
    /// A rule with no groups; it matches every message.
    pub fn catch_all(label: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: None,
            pdf: None,
            label: LabelAction(label.into()),
        }
    }

    pub fn with_subject(mut self, group: FieldCondition) -> Self {
        self.subject = Some(group);
        self
    }

    pub fn with_body(mut self, group: FieldCondition) -> Self {
        self.body = Some(group);
        self
    }

    pub fn with_pdf(mut self, group: FieldCondition) -> Self {
        self.pdf = Some(group);
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Lower the present groups into flat conditions.
    pub fn conditions(&self) -> Vec<Condition> {
        let mut out = Vec::with_capacity(3);
        if let Some(group) = &self.subject {
            out.push(lower_subject(group));
        }
        if let Some(group) = &self.body {
            out.push(lower_body(group));
        }
        if let Some(group) = &self.pdf {
            out.push(lower_pdf(group));
        }
        out
    }

    /// Whether evaluating this rule requires extracted resume text.
    pub fn needs_pdf_text(&self) -> bool {
        self.conditions().iter().any(|c| c.kind.needs_pdf_text())
    }
}

fn unsupported(field: &str, op: Operator) -> Condition {
    let name = format!("{field}_{}", op.as_str().to_lowercase().replace(' ', "_"));
    Condition::flag(ConditionKind::Unknown(name))
}

fn lower_subject(group: &FieldCondition) -> Condition {
    let text = group.operand_text();
    match group.operator {
        Operator::Exists => Condition::flag(ConditionKind::SubjectExists),
        Operator::DoesNotExist => Condition::flag(ConditionKind::SubjectMissing),
        Operator::Contains => Condition::text(ConditionKind::SubjectContains, text),
        Operator::DoesNotContain => Condition::text(ConditionKind::SubjectNotContains, text),
        Operator::StartsWith => Condition::text(ConditionKind::SubjectStartsWith, text),
        Operator::EndsWith => Condition::text(ConditionKind::SubjectEndsWith, text),
        op => unsupported("subject", op),
    }
}

fn lower_body(group: &FieldCondition) -> Condition {
    let text = group.operand_text();
    match group.operator {
        Operator::Exists => Condition::flag(ConditionKind::BodyExists),
        Operator::DoesNotExist => Condition::flag(ConditionKind::BodyMissing),
        // Literal containment goes through the same regex path as patterns.
        Operator::Contains => Condition::text(ConditionKind::BodyContains, regex::escape(text)),
        Operator::ContainsPattern => Condition::text(ConditionKind::BodyContains, text),
        Operator::DoesNotContain => Condition::text(ConditionKind::BodyNotContains, text),
        Operator::StartsWith => Condition::text(ConditionKind::BodyStartsWith, text),
        Operator::EndsWith => Condition::text(ConditionKind::BodyEndsWith, text),
        op => unsupported("body", op),
    }
}

fn lower_pdf(group: &FieldCondition) -> Condition {
    let text = group.operand_text();
    match group.operator {
        Operator::Exists => Condition::flag(ConditionKind::PdfExists),
        Operator::DoesNotExist => Condition::flag(ConditionKind::PdfMissing),
        Operator::ContainsSkill | Operator::Contains => {
            Condition::text(ConditionKind::ResumeSkill, text)
        }
        Operator::DoesNotContainSkill | Operator::DoesNotContain => {
            Condition::text(ConditionKind::ResumeMissingSkill, text)
        }
        Operator::QualifiesFor => Condition::text(ConditionKind::ResumeQualifies, text),
        Operator::DoesNotQualifyFor => Condition::text(ConditionKind::ResumeNotQualifies, text),
        op => unsupported("pdf", op),
    }
}

// ── Conditions ──────────────────────────────────────────────────────

/// Condition type tag. Unrecognized tags are kept as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionKind {
    SubjectExists,
    SubjectMissing,
    SubjectContains,
    SubjectNotContains,
    SubjectStartsWith,
    SubjectEndsWith,
    BodyExists,
    BodyMissing,
    BodyContains,
    BodyNotContains,
    BodyStartsWith,
    BodyEndsWith,
    PdfExists,
    PdfMissing,
    ResumeSkill,
    ResumeMissingSkill,
    ResumeQualifies,
    ResumeNotQualifies,
    Unknown(String),
}

impl ConditionKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SubjectExists => "subject_exists",
            Self::SubjectMissing => "subject_missing",
            Self::SubjectContains => "subject_contains",
            Self::SubjectNotContains => "subject_not_contains",
            Self::SubjectStartsWith => "subject_starts_with",
            Self::SubjectEndsWith => "subject_ends_with",
            Self::BodyExists => "body_exists",
            Self::BodyMissing => "body_missing",
            Self::BodyContains => "body_contains",
            Self::BodyNotContains => "body_not_contains",
            Self::BodyStartsWith => "body_starts_with",
            Self::BodyEndsWith => "body_ends_with",
            Self::PdfExists => "pdf_exists",
            Self::PdfMissing => "pdf_missing",
            Self::ResumeSkill => "resume_skill",
            Self::ResumeMissingSkill => "resume_missing_skill",
            Self::ResumeQualifies => "resume_qualifies",
            Self::ResumeNotQualifies => "resume_not_qualifies",
            Self::Unknown(name) => name,
        }
    }

    pub fn needs_pdf_text(&self) -> bool {
        matches!(
            self,
            Self::ResumeSkill
                | Self::ResumeMissingSkill
                | Self::ResumeQualifies
                | Self::ResumeNotQualifies
        )
    }
}

impl From<String> for ConditionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "subject_exists" => Self::SubjectExists,
            "subject_missing" => Self::SubjectMissing,
            "subject_contains" => Self::SubjectContains,
            "subject_not_contains" => Self::SubjectNotContains,
            "subject_starts_with" => Self::SubjectStartsWith,
            "subject_ends_with" => Self::SubjectEndsWith,
            "body_exists" => Self::BodyExists,
            "body_missing" => Self::BodyMissing,
            "body_contains" => Self::BodyContains,
            "body_not_contains" => Self::BodyNotContains,
            "body_starts_with" => Self::BodyStartsWith,
            "body_ends_with" => Self::BodyEndsWith,
            "pdf_exists" => Self::PdfExists,
            "pdf_missing" => Self::PdfMissing,
            "resume_skill" => Self::ResumeSkill,
            "resume_missing_skill" => Self::ResumeMissingSkill,
            "resume_qualifies" => Self::ResumeQualifies,
            "resume_not_qualifies" => Self::ResumeNotQualifies,
            _ => Self::Unknown(s),
        }
    }
}

impl From<ConditionKind> for String {
    fn from(kind: ConditionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `true` for presence checks, text for everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Flag(bool),
    Text(String),
}

impl ConditionValue {
    pub fn as_text(&self) -> &str {
        match self {
            Self::Flag(_) => "",
            Self::Text(s) => s,
        }
    }
}

/// A `{type, value}` predicate over `EmailComponents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    pub value: ConditionValue,
}

impl Condition {
    pub fn flag(kind: ConditionKind) -> Self {
        Self {
            kind,
            value: ConditionValue::Flag(true),
        }
    }

    pub fn text(kind: ConditionKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: ConditionValue::Text(value.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_names_are_longest_first() {
        for pair in OPERATOR_NAMES.windows(2) {
            assert!(
                pair[0].0.len() >= pair[1].0.len(),
                "{} listed before {}",
                pair[0].0,
                pair[1].0
            );
        }
    }

    #[test]
    fn parses_spelled_and_camel_case_operators() {
        assert_eq!(
            Operator::parse_prefix("Does not Exist").map(|p| p.0),
            Some(Operator::DoesNotExist)
        );
        assert_eq!(
            Operator::parse_prefix("DoesNotExist").map(|p| p.0),
            Some(Operator::DoesNotExist)
        );
        assert_eq!(
            Operator::parse_prefix("contains pattern").map(|p| p.0),
            Some(Operator::ContainsPattern)
        );
        assert_eq!(Operator::parse_prefix("Exists").map(|p| p.0), Some(Operator::Exists));
        assert!(Operator::parse_prefix("Existential").is_none());
        assert!(Operator::parse_prefix("Matches").is_none());
    }

    #[test]
    fn inline_operand() {
        let group: FieldCondition = serde_json::from_str(r#"["Contains Java"]"#).unwrap();
        assert_eq!(group, FieldCondition::with_operand(Operator::Contains, "Java"));

        let group: FieldCondition = serde_json::from_str(r#""Contains 'Java Developer'""#).unwrap();
        assert_eq!(group.operand.as_deref(), Some("Java Developer"));
    }

    #[test]
    fn separate_operand_wins() {
        let group: FieldCondition =
            serde_json::from_str(r#"["Contains pattern", "I am [name] from [city]"]"#).unwrap();
        assert_eq!(group.operator, Operator::ContainsPattern);
        assert_eq!(group.operand.as_deref(), Some("I am [name] from [city]"));
    }

    #[test]
    fn missing_operand_is_rejected() {
        assert!(serde_json::from_str::<FieldCondition>(r#"["Contains"]"#).is_err());
        assert!(serde_json::from_str::<FieldCondition>(r#"["Frobnicates", "x"]"#).is_err());
    }

    #[test]
    fn rule_wire_format() {
        let raw = r#"{
            "Subject": ["Contains", "Java Developer"],
            "Body": [],
            "PDF": ["Exists"],
            "Label Action": ["Java Candidates"]
        }"#;
        let rule: Rule = serde_json::from_str(raw).unwrap();
        assert_eq!(rule.label(), "Java Candidates");
        assert!(rule.body.is_none());
        assert_eq!(rule.pdf, Some(FieldCondition::new(Operator::Exists)));

        let back = serde_json::to_value(&rule).unwrap();
        assert_eq!(back["Subject"], serde_json::json!(["Contains", "Java Developer"]));
        assert_eq!(back["PDF"], serde_json::json!(["Exists"]));
        assert_eq!(back["Label Action"], serde_json::json!(["Java Candidates"]));
        assert!(back.get("Body").is_none());
    }

    #[test]
    fn bare_string_label_action() {
        let rule: Rule = serde_json::from_str(r#"{"Label Action": "To be Deleted"}"#).unwrap();
        assert_eq!(rule, Rule::catch_all("To be Deleted"));
        assert!(rule.conditions().is_empty());
    }

    #[test]
    fn lowering_escapes_literal_body_text() {
        let rule = Rule::catch_all("x")
            .with_subject(FieldCondition::new(Operator::DoesNotExist))
            .with_body(FieldCondition::with_operand(Operator::Contains, "c++ (senior)"));
        let conditions = rule.conditions();
        assert_eq!(conditions[0], Condition::flag(ConditionKind::SubjectMissing));
        assert_eq!(conditions[1].kind, ConditionKind::BodyContains);
        assert_eq!(conditions[1].value.as_text(), r"c\+\+ \(senior\)");
        assert!(!rule.needs_pdf_text());
    }

    #[test]
    fn unsupported_combination_lowers_to_unknown() {
        let rule = Rule::catch_all("x")
            .with_subject(FieldCondition::with_operand(Operator::ContainsSkill, "rust"));
        assert_eq!(
            rule.conditions()[0].kind,
            ConditionKind::Unknown("subject_contains_skill".into())
        );
    }

    #[test]
    fn pdf_skill_needs_text() {
        let rule = Rule::catch_all("x")
            .with_pdf(FieldCondition::with_operand(Operator::ContainsSkill, "python"));
        assert!(rule.needs_pdf_text());
        assert_eq!(
            rule.conditions()[0],
            Condition::text(ConditionKind::ResumeSkill, "python")
        );
    }

    #[test]
    fn condition_json_shape() {
        let c: Condition =
            serde_json::from_str(r#"{"type": "subject_contains", "value": "java developer"}"#)
                .unwrap();
        assert_eq!(c, Condition::text(ConditionKind::SubjectContains, "java developer"));

        let c: Condition = serde_json::from_str(r#"{"type": "pdf_exists", "value": true}"#).unwrap();
        assert_eq!(c, Condition::flag(ConditionKind::PdfExists));

        let c: Condition = serde_json::from_str(r#"{"type": "sender_is", "value": "x"}"#).unwrap();
        assert_eq!(c.kind, ConditionKind::Unknown("sender_is".into()));
    }
}
