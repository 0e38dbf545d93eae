//! Local condition evaluation.
//!
//! Every condition type is a pure predicate over `EmailComponents`. Rules
//! are evaluated by lowering them to conditions, so the phrase parser's
//! output and rule groups share one dispatch.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::MatchingConfig;
use crate::pipeline::keywords;
use crate::pipeline::rule::{Condition, ConditionKind, Rule};
use crate::pipeline::types::EmailComponents;

/// Evaluates conditions and rules against one message's components.
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    matching: Arc<MatchingConfig>,
}

impl ConditionEvaluator {
    pub fn new(matching: Arc<MatchingConfig>) -> Self {
        Self { matching }
    }

    /// Check a single condition.
    pub fn check(&self, condition: &Condition, email: &EmailComponents) -> bool {
        let value = condition.value.as_text();
        let subject = email.subject.trim();
        let body = email.body.trim();

        match &condition.kind {
            ConditionKind::SubjectExists => !subject.is_empty(),
            ConditionKind::SubjectMissing => subject.is_empty(),
            ConditionKind::SubjectContains => contains_ci(subject, value),
            ConditionKind::SubjectNotContains => !contains_ci(subject, value),
            ConditionKind::SubjectStartsWith => subject.to_lowercase().starts_with(&value.to_lowercase()),
            ConditionKind::SubjectEndsWith => subject.to_lowercase().ends_with(&value.to_lowercase()),

            ConditionKind::BodyExists => !body.is_empty(),
            ConditionKind::BodyMissing => body.is_empty(),
            ConditionKind::BodyContains => body_matches(&email.body, value),
            ConditionKind::BodyNotContains => !contains_ci(&email.body, value),
            ConditionKind::BodyStartsWith => body.to_lowercase().starts_with(&value.to_lowercase()),
            ConditionKind::BodyEndsWith => body.to_lowercase().ends_with(&value.to_lowercase()),

            ConditionKind::PdfExists => email.has_pdf,
            ConditionKind::PdfMissing => !email.has_pdf,

            ConditionKind::ResumeSkill => self
                .resume_text(email)
                .is_some_and(|text| contains_ci(text, value)),
            ConditionKind::ResumeMissingSkill => self
                .resume_text(email)
                .is_some_and(|text| !contains_ci(text, value)),
            ConditionKind::ResumeQualifies => self
                .resume_text(email)
                .is_some_and(|text| self.qualifies(text, value)),
            ConditionKind::ResumeNotQualifies => self
                .resume_text(email)
                .is_some_and(|text| !self.qualifies(text, value)),

            ConditionKind::Unknown(name) => {
                warn!(condition = %name, "Unknown condition type");
                false
            }
        }
    }

    /// All conditions must hold. An empty list holds trivially.
    pub fn check_all(&self, conditions: &[Condition], email: &EmailComponents) -> bool {
        conditions.iter().all(|c| self.check(c, email))
    }

    /// Whether every present group of `rule` holds.
    pub fn evaluate(&self, rule: &Rule, email: &EmailComponents) -> bool {
        self.check_all(&rule.conditions(), email)
    }

    /// Label of the first rule that holds, in list order.
    pub fn first_matching_rule<'r>(&self, email: &EmailComponents, rules: &'r [Rule]) -> Option<&'r str> {
        let matched = rules.iter().find(|rule| self.evaluate(rule, email));
        debug!(
            message_id = %email.message_id,
            label = matched.map(|r| r.label()),
            "Local evaluation"
        );
        matched.map(|r| r.label())
    }

    /// Extracted resume text, if a PDF was present and text was filled.
    fn resume_text<'e>(&self, email: &'e EmailComponents) -> Option<&'e str> {
        email
            .pdf_text
            .as_deref()
            .filter(|text| email.has_pdf && !text.is_empty())
    }

    fn qualifies(&self, text: &str, criteria: &str) -> bool {
        let analysis = keywords::analyze(text, criteria, &self.matching);
        debug!(
            qualified = analysis.qualified,
            percentage = analysis.match_percentage,
            matching = ?analysis.matching_keywords,
            missing = ?analysis.missing_keywords,
            "Resume keyword analysis"
        );
        analysis.qualified
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Case-insensitive regex search on the lowercased body; a pattern that does
/// not compile is treated as literal text.
fn body_matches(body: &str, pattern: &str) -> bool {
    let body = body.to_lowercase();
    match Regex::new(&format!("(?i){pattern}")) {
        Ok(re) => re.is_match(&body),
        Err(e) => {
            debug!(pattern, error = %e, "Body pattern is not a valid regex, using literal match");
            body.contains(&pattern.to_lowercase())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pattern::placeholder_pattern;
    use crate::pipeline::rule::{FieldCondition, Operator};
    use crate::pipeline::types::PdfAttachment;

    fn evaluator() -> ConditionEvaluator {
        ConditionEvaluator::new(Arc::new(MatchingConfig::default()))
    }

    fn email(subject: &str, body: &str) -> EmailComponents {
        EmailComponents {
            message_id: "m".into(),
            subject: subject.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    fn with_resume(mut email: EmailComponents, text: &str) -> EmailComponents {
        email.has_pdf = true;
        email.pdf = Some(PdfAttachment {
            filename: "cv.pdf".into(),
            attachment_id: Some("a".into()),
            inline_data: None,
        });
        email.pdf_text = Some(text.into());
        email
    }

    #[test]
    fn subject_contains_is_case_insensitive() {
        let c = Condition::text(ConditionKind::SubjectContains, "java developer");
        assert!(evaluator().check(&c, &email("Application: Senior JAVA Developer", "")));
        assert!(!evaluator().check(&c, &email("Python Developer", "")));
    }

    #[test]
    fn whitespace_only_subject_is_missing() {
        let e = email("   ", "hello");
        assert!(evaluator().check(&Condition::flag(ConditionKind::SubjectMissing), &e));
        assert!(!evaluator().check(&Condition::flag(ConditionKind::SubjectExists), &e));
    }

    #[test]
    fn placeholder_body_match() {
        let c = Condition::text(
            ConditionKind::BodyContains,
            placeholder_pattern("i am 'xyz' from 'abc' city"),
        );
        assert!(evaluator().check(&c, &email("", "Hello, I am John from Chicago and would like to apply")));
        assert!(!evaluator().check(&c, &email("", "Hello, please find my resume")));

        let literal = Condition::text(ConditionKind::BodyContains, placeholder_pattern("java developer"));
        assert!(!evaluator().check(&literal, &email("", "Hello, please find my resume")));
    }

    #[test]
    fn invalid_regex_falls_back_to_literal() {
        let c = Condition::text(ConditionKind::BodyContains, "c++ (senior");
        assert!(evaluator().check(&c, &email("", "Looking for C++ (Senior role)")));
        assert!(!evaluator().check(&c, &email("", "Looking for Rust")));
    }

    #[test]
    fn unknown_condition_is_false() {
        let c = Condition::text(ConditionKind::Unknown("sender_is".into()), "x");
        assert!(!evaluator().check(&c, &email("a", "b")));
        assert!(!evaluator().check_all(&[c], &email("a", "b")));
    }

    #[test]
    fn skill_uses_resume_text() {
        let c = Condition::text(ConditionKind::ResumeSkill, "Python");
        let e = with_resume(email("cv", ""), "experienced python and django developer");
        assert!(evaluator().check(&c, &e));
        assert!(!evaluator().check(&Condition::text(ConditionKind::ResumeSkill, "kotlin"), &e));
        // Without extracted text neither the skill nor its negation holds.
        assert!(!evaluator().check(&c, &email("cv", "")));
        assert!(!evaluator().check(
            &Condition::text(ConditionKind::ResumeMissingSkill, "python"),
            &email("cv", "")
        ));
    }

    #[test]
    fn keyword_qualification() {
        let e = with_resume(email("cv", ""), "java spring hibernate maven gradle");
        // "spring" expands to the seven-term java bucket; five of them appear.
        let qualifies = Condition::text(ConditionKind::ResumeQualifies, "spring developer");
        let not_qualifies = Condition::text(ConditionKind::ResumeNotQualifies, "spring developer");
        assert!(evaluator().check(&qualifies, &e));
        assert!(!evaluator().check(&not_qualifies, &e));

        let weak = with_resume(email("cv", ""), "cobol mainframe");
        assert!(evaluator().check(&not_qualifies, &weak));
    }

    #[test]
    fn first_match_wins() {
        let rules = vec![
            Rule::catch_all("Java")
                .with_subject(FieldCondition::with_operand(Operator::Contains, "java")),
            Rule::catch_all("Has Subject").with_subject(FieldCondition::new(Operator::Exists)),
            Rule::catch_all("Everything Else"),
        ];
        let ev = evaluator();
        assert_eq!(ev.first_matching_rule(&email("Java role", ""), &rules), Some("Java"));
        assert_eq!(ev.first_matching_rule(&email("Go role", ""), &rules), Some("Has Subject"));
        assert_eq!(ev.first_matching_rule(&email("", ""), &rules), Some("Everything Else"));
        assert_eq!(ev.first_matching_rule(&email("", ""), &rules[..2]), None);
    }

    #[test]
    fn rule_groups_are_conjunctive() {
        let rule = Rule::catch_all("To be Deleted")
            .with_subject(FieldCondition::new(Operator::DoesNotExist))
            .with_body(FieldCondition::new(Operator::DoesNotExist));
        let ev = evaluator();
        assert!(ev.evaluate(&rule, &email("", "")));
        assert!(!ev.evaluate(&rule, &email("", "body text")));
        assert!(!ev.evaluate(&rule, &email("subject", "")));
    }

    #[test]
    fn starts_and_ends_with() {
        let ev = evaluator();
        let e = email("Re: Application", "Dear team, regards");
        assert!(ev.check(&Condition::text(ConditionKind::SubjectStartsWith, "re:"), &e));
        assert!(ev.check(&Condition::text(ConditionKind::BodyEndsWith, "Regards"), &e));
        assert!(!ev.check(&Condition::text(ConditionKind::BodyStartsWith, "hi"), &e));
    }
}
