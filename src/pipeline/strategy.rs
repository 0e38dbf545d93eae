//! Rule producer / evaluator pairs selected by pipeline mode.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{LabelDefaults, MatchingConfig};
use crate::error::PipelineError;
use crate::llm::LlmProvider;
use crate::pipeline::evaluator::ConditionEvaluator;
use crate::pipeline::model_rules::{ModelEvaluator, ModelRuleProducer};
use crate::pipeline::parser::PromptParser;
use crate::pipeline::rule::{FieldCondition, Operator, Rule};
use crate::pipeline::types::EmailComponents;

/// Turns a natural-language prompt into an ordered rule list.
#[async_trait]
pub trait RuleProducer: Send + Sync {
    fn name(&self) -> &str;

    /// Rules for `prompt`. An empty list aborts the run.
    async fn produce(&self, prompt: &str) -> Vec<Rule>;
}

/// Picks the label of the first rule an email satisfies.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    fn name(&self) -> &str;

    /// Pause to keep between consecutive evaluations.
    fn call_delay(&self) -> Duration {
        Duration::ZERO
    }

    async fn first_match(
        &self,
        email: &EmailComponents,
        rules: &[Rule],
    ) -> Result<Option<String>, PipelineError>;
}

// ── Producers ───────────────────────────────────────────────────────

/// Deterministic phrase extraction.
pub struct PhraseRuleProducer {
    parser: PromptParser,
}

impl PhraseRuleProducer {
    pub fn new(labels: &LabelDefaults) -> Self {
        Self {
            parser: PromptParser::new(labels),
        }
    }
}

#[async_trait]
impl RuleProducer for PhraseRuleProducer {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn produce(&self, prompt: &str) -> Vec<Rule> {
        self.parser.parse(prompt).to_rules()
    }
}

/// The prompt is search criteria; resumes that do not qualify get the delete label.
pub struct KeywordRuleProducer {
    delete_label: String,
}

impl KeywordRuleProducer {
    pub fn new(labels: &LabelDefaults) -> Self {
        Self {
            delete_label: labels.delete_label.clone(),
        }
    }
}

#[async_trait]
impl RuleProducer for KeywordRuleProducer {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn produce(&self, prompt: &str) -> Vec<Rule> {
        let criteria = prompt.trim();
        if criteria.is_empty() {
            return Vec::new();
        }
        info!(criteria, label = %self.delete_label, "Keyword qualification rule");
        vec![
            Rule::catch_all(self.delete_label.clone())
                .with_pdf(FieldCondition::with_operand(Operator::DoesNotQualifyFor, criteria)),
        ]
    }
}

#[async_trait]
impl RuleProducer for ModelRuleProducer {
    fn name(&self) -> &str {
        "model"
    }

    async fn produce(&self, prompt: &str) -> Vec<Rule> {
        self.generate_rules(prompt).await
    }
}

// ── Evaluators ──────────────────────────────────────────────────────

/// In-process evaluation with `ConditionEvaluator`.
pub struct LocalEvaluator {
    conditions: ConditionEvaluator,
}

impl LocalEvaluator {
    pub fn new(matching: Arc<MatchingConfig>) -> Self {
        Self {
            conditions: ConditionEvaluator::new(matching),
        }
    }
}

#[async_trait]
impl RuleEvaluator for LocalEvaluator {
    fn name(&self) -> &str {
        "local"
    }

    async fn first_match(
        &self,
        email: &EmailComponents,
        rules: &[Rule],
    ) -> Result<Option<String>, PipelineError> {
        Ok(self
            .conditions
            .first_matching_rule(email, rules)
            .map(str::to_string))
    }
}

#[async_trait]
impl RuleEvaluator for ModelEvaluator {
    fn name(&self) -> &str {
        "model"
    }

    fn call_delay(&self) -> Duration {
        ModelEvaluator::call_delay(self)
    }

    async fn first_match(
        &self,
        email: &EmailComponents,
        rules: &[Rule],
    ) -> Result<Option<String>, PipelineError> {
        self.classify(email, rules).await
    }
}

/// Model-assisted producer and evaluator sharing one provider.
pub fn model_pair(
    llm: Arc<dyn LlmProvider>,
    call_delay: Duration,
) -> (Arc<dyn RuleProducer>, Arc<dyn RuleEvaluator>) {
    let producer: Arc<dyn RuleProducer> = Arc::new(ModelRuleProducer::new(llm.clone()));
    let evaluator: Arc<dyn RuleEvaluator> = Arc::new(ModelEvaluator::new(llm, call_delay));
    (producer, evaluator)
}
