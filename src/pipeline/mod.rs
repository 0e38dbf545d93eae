//! Email categorization pipeline.
//!
//! A run flows through:
//! 1. `RuleProducer::produce()`: prompt → ordered `Rule` list
//! 2. `MessageBatches`: lazy, capped paging over the mailbox
//! 3. `EmailComponents::from_message()`: subject, body, PDF reference
//! 4. `RuleEvaluator::first_match()`: local or model-assisted
//! 5. label get-or-create and apply
//!
//! `CategorizationDriver` owns the run; the producer / evaluator pair is
//! chosen by `PipelineMode`.

pub mod components;
pub mod driver;
pub mod evaluator;
pub mod keywords;
pub mod model_rules;
pub mod parser;
pub mod pattern;
pub mod rule;
pub mod strategy;
pub mod types;

pub use driver::CategorizationDriver;
pub use rule::{Condition, ConditionKind, FieldCondition, Operator, Rule};
pub use strategy::{RuleEvaluator, RuleProducer};
pub use types::{EmailComponents, MatchResult, RunState, RunSummary};

use std::sync::Arc;

use crate::config::{PipelineMode, ScannerConfig};
use crate::error::PipelineError;
use crate::llm::LlmProvider;
use strategy::{KeywordRuleProducer, LocalEvaluator, PhraseRuleProducer};

/// Producer / evaluator pair for `mode`. Model mode requires a provider.
pub fn build_pipeline(
    mode: PipelineMode,
    config: &ScannerConfig,
    llm: Option<Arc<dyn LlmProvider>>,
) -> Result<(Arc<dyn RuleProducer>, Arc<dyn RuleEvaluator>), PipelineError> {
    let local = || -> Arc<dyn RuleEvaluator> {
        Arc::new(LocalEvaluator::new(Arc::new(config.matching.clone())))
    };

    match mode {
        PipelineMode::Pattern => {
            let producer: Arc<dyn RuleProducer> = Arc::new(PhraseRuleProducer::new(&config.labels));
            Ok((producer, local()))
        }
        PipelineMode::Keyword => {
            let producer: Arc<dyn RuleProducer> = Arc::new(KeywordRuleProducer::new(&config.labels));
            Ok((producer, local()))
        }
        PipelineMode::Model => {
            let llm = llm.ok_or_else(|| {
                PipelineError::Rules("model pipeline needs an LLM provider".to_string())
            })?;
            Ok(strategy::model_pair(llm, config.model_call_delay))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_mode_without_provider_fails() {
        let config = ScannerConfig::default();
        assert!(build_pipeline(PipelineMode::Model, &config, None).is_err());
    }

    #[test]
    fn local_modes_name_their_strategies() {
        let config = ScannerConfig::default();
        let (producer, evaluator) = build_pipeline(PipelineMode::Keyword, &config, None).unwrap();
        assert_eq!(producer.name(), "keyword");
        assert_eq!(evaluator.name(), "local");

        let (producer, _) = build_pipeline(PipelineMode::Pattern, &config, None).unwrap();
        assert_eq!(producer.name(), "pattern");
    }
}
