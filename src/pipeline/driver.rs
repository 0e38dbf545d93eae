//! Categorization driver: one scan run from prompt to applied labels.
//!
//! `Idle → RulesReady → Scanning → Done`, or `Aborted` when the producer
//! yields no rules. Messages are processed one at a time; a failure on one
//! message is logged and counted as skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::ScannerConfig;
use crate::document::DocumentText;
use crate::error::PipelineError;
use crate::mailbox::{Mailbox, MessageBatches, label_key};
use crate::pipeline::rule::Rule;
use crate::pipeline::strategy::{RuleEvaluator, RuleProducer};
use crate::pipeline::types::{EmailComponents, MatchResult, RunState, RunSummary};

/// Runs scans against one mailbox with one producer / evaluator pair.
pub struct CategorizationDriver {
    mailbox: Arc<dyn Mailbox>,
    documents: Arc<dyn DocumentText>,
    producer: Arc<dyn RuleProducer>,
    evaluator: Arc<dyn RuleEvaluator>,
    query: String,
    batch_size: usize,
    max_messages: Option<usize>,
}

/// Per-run mutable state owned by the driver.
struct ScanRun {
    rules: Vec<Rule>,
    needs_pdf_text: bool,
    /// `label_key` of the label name → label id.
    label_ids: HashMap<String, String>,
    evaluations: usize,
    summary: RunSummary,
}

impl CategorizationDriver {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        documents: Arc<dyn DocumentText>,
        producer: Arc<dyn RuleProducer>,
        evaluator: Arc<dyn RuleEvaluator>,
        config: &ScannerConfig,
    ) -> Self {
        Self {
            mailbox,
            documents,
            producer,
            evaluator,
            query: config.search_query.clone(),
            batch_size: config.batch_size,
            max_messages: config.max_messages,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run one scan for `prompt`.
    ///
    /// Only an unavailable mailbox is returned as an error; every other
    /// failure ends in a summary.
    pub async fn run(&self, prompt: &str) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "scan",
            %run_id,
            producer = self.producer.name(),
            evaluator = self.evaluator.name()
        );
        self.run_inner(run_id, prompt).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, prompt: &str) -> Result<RunSummary, PipelineError> {
        if !self.mailbox.is_available().await {
            error!("Mailbox is not available");
            return Err(PipelineError::MailboxUnavailable);
        }

        let rules = self.producer.produce(prompt).await;
        let mut run = ScanRun {
            needs_pdf_text: rules.iter().any(Rule::needs_pdf_text),
            rules,
            label_ids: HashMap::new(),
            evaluations: 0,
            summary: RunSummary::new(run_id),
        };
        run.summary.rules = run.rules.len();

        if run.rules.is_empty() {
            error!("No rules produced from prompt, aborting run");
            run.summary.transition(RunState::Aborted);
            return Ok(run.summary);
        }
        for (index, rule) in run.rules.iter().enumerate() {
            info!(index, label = rule.label(), conditions = ?rule.conditions(), "Active rule");
        }
        run.summary.transition(RunState::RulesReady);

        run.summary.transition(RunState::Scanning);
        let mut batches = MessageBatches::new(
            Arc::clone(&self.mailbox),
            self.query.as_str(),
            self.batch_size,
            self.max_messages,
        );

        loop {
            let batch = match batches.next_batch().await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, scanned = run.summary.scanned, "Failed to fetch messages, ending scan");
                    break;
                }
            };

            debug!(size = batch.len(), "Processing batch");
            for message_id in &batch {
                match self.process_message(&mut run, message_id).await {
                    Ok(result) => run.summary.record(&result),
                    Err(e) => {
                        warn!(%message_id, error = %e, "Skipping message");
                        run.summary.record_skipped();
                    }
                }
            }
        }

        run.summary.transition(RunState::Done);
        info!(
            scanned = run.summary.scanned,
            skipped = run.summary.skipped,
            labelled = run.summary.labelled(),
            labels = ?run.summary.label_counts,
            "Scan complete"
        );
        Ok(run.summary)
    }

    async fn process_message(
        &self,
        run: &mut ScanRun,
        message_id: &str,
    ) -> Result<MatchResult, PipelineError> {
        let message = self.mailbox.get_message(message_id).await?;
        let mut email = EmailComponents::from_message(&message);
        if run.needs_pdf_text {
            self.fill_pdf_text(&mut email).await?;
        }

        let delay = self.evaluator.call_delay();
        if run.evaluations > 0 && delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        run.evaluations += 1;

        let Some(label) = self.evaluator.first_match(&email, &run.rules).await? else {
            debug!(message_id = %email.message_id, "No rule matched");
            return Ok(MatchResult::no_match(email.message_id));
        };

        let label_id = self.label_id(run, &label).await?;
        self.mailbox.apply_label(&email.message_id, &label_id).await?;
        info!(
            message_id = %email.message_id,
            subject = %email.subject,
            label = %label,
            "Labelled message"
        );
        Ok(MatchResult::matched(email.message_id, label))
    }

    /// Fetch and extract the PDF attachment's text, if the message has one.
    async fn fill_pdf_text(&self, email: &mut EmailComponents) -> Result<(), PipelineError> {
        let Some(pdf) = &email.pdf else {
            return Ok(());
        };

        let data = match (&pdf.inline_data, &pdf.attachment_id) {
            (Some(data), _) => data.clone(),
            (None, Some(attachment_id)) => {
                self.mailbox
                    .get_attachment(&email.message_id, attachment_id)
                    .await?
            }
            (None, None) => {
                warn!(message_id = %email.message_id, filename = %pdf.filename, "PDF part has no data");
                return Ok(());
            }
        };

        let documents = Arc::clone(&self.documents);
        let text = tokio::task::spawn_blocking(move || documents.extract_text(&data))
            .await
            .map_err(|e| PipelineError::Extraction(e.to_string()))?;
        debug!(
            message_id = %email.message_id,
            filename = %pdf.filename,
            chars = text.len(),
            "Extracted resume text"
        );
        email.pdf_text = Some(text);
        Ok(())
    }

    /// Label id for `name`, created on first use and cached for the run.
    async fn label_id(&self, run: &mut ScanRun, name: &str) -> Result<String, PipelineError> {
        let key = label_key(name);
        if let Some(id) = run.label_ids.get(&key) {
            return Ok(id.clone());
        }
        let id = self.mailbox.get_or_create_label(name).await?;
        run.label_ids.insert(key, id.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::config::MatchingConfig;
    use crate::mailbox::InMemoryMailbox;
    use crate::pipeline::rule::{FieldCondition, Operator};
    use crate::pipeline::strategy::LocalEvaluator;

    struct FixedRules(Vec<Rule>);

    #[async_trait]
    impl RuleProducer for FixedRules {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn produce(&self, _prompt: &str) -> Vec<Rule> {
            self.0.clone()
        }
    }

    /// Labels everything, with a fixed delay between calls.
    struct PacedEvaluator {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RuleEvaluator for PacedEvaluator {
        fn name(&self) -> &str {
            "paced"
        }

        fn call_delay(&self) -> Duration {
            self.delay
        }

        async fn first_match(
            &self,
            _email: &EmailComponents,
            rules: &[Rule],
        ) -> Result<Option<String>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(rules.first().map(|r| r.label().to_string()))
        }
    }

    struct NoText;

    impl DocumentText for NoText {
        fn extract_text(&self, _base64_pdf: &str) -> String {
            String::new()
        }
    }

    /// Panics on the payload "boom", otherwise returns a weak resume.
    struct FragileText;

    impl DocumentText for FragileText {
        fn extract_text(&self, base64_pdf: &str) -> String {
            assert_ne!(base64_pdf, "boom", "extractor crashed");
            "cobol and fortran".to_string()
        }
    }

    fn mailbox_with(n: usize) -> Arc<InMemoryMailbox> {
        let mailbox = InMemoryMailbox::new();
        for i in 0..n {
            mailbox.add_message(InMemoryMailbox::message(&format!("m{i}"), "subject", "body", None));
        }
        Arc::new(mailbox)
    }

    fn driver(
        mailbox: Arc<InMemoryMailbox>,
        rules: Vec<Rule>,
        evaluator: Arc<dyn RuleEvaluator>,
    ) -> CategorizationDriver {
        CategorizationDriver::new(
            mailbox,
            Arc::new(NoText),
            Arc::new(FixedRules(rules)),
            evaluator,
            &ScannerConfig::default(),
        )
    }

    fn local() -> Arc<dyn RuleEvaluator> {
        Arc::new(LocalEvaluator::new(Arc::new(MatchingConfig::default())))
    }

    #[tokio::test]
    async fn unavailable_mailbox_cannot_start() {
        let mailbox = mailbox_with(1);
        mailbox.set_available(false);
        let result = driver(mailbox.clone(), vec![Rule::catch_all("x")], local())
            .run("anything")
            .await;
        assert!(matches!(result, Err(PipelineError::MailboxUnavailable)));
        assert_eq!(mailbox.list_calls(), 0);
    }

    #[tokio::test]
    async fn no_rules_aborts_before_listing() {
        let mailbox = mailbox_with(3);
        let summary = driver(mailbox.clone(), Vec::new(), local())
            .run("anything")
            .await
            .unwrap();
        assert_eq!(summary.state, RunState::Aborted);
        assert_eq!(summary.scanned, 0);
        assert!(summary.finished_at.is_some());
        assert_eq!(mailbox.list_calls(), 0);
    }

    #[tokio::test]
    async fn label_is_created_once_per_run() {
        let mailbox = mailbox_with(5);
        let summary = driver(mailbox.clone(), vec![Rule::catch_all("Reviewed")], local())
            .with_batch_size(2)
            .run("anything")
            .await
            .unwrap();
        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.label_counts.get("Reviewed"), Some(&5));
        assert_eq!(mailbox.label_names(), vec!["Reviewed"]);
        assert_eq!(mailbox.labels_on("m4"), vec!["Reviewed"]);
    }

    #[tokio::test]
    async fn unreadable_message_is_skipped() {
        let mailbox = mailbox_with(3);
        mailbox.fail_get_on("m1");
        let summary = driver(mailbox.clone(), vec![Rule::catch_all("Reviewed")], local())
            .run("anything")
            .await
            .unwrap();
        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.label_counts.get("Reviewed"), Some(&2));
        assert!(mailbox.labels_on("m1").is_empty());
        assert_eq!(mailbox.labels_on("m2"), vec!["Reviewed"]);
    }

    #[tokio::test]
    async fn label_cache_folds_non_ascii_case() {
        let mailbox = mailbox_with(2);
        let rules = vec![
            Rule::catch_all("ÜBERPRÜFEN").with_subject(FieldCondition::with_operand(
                Operator::Contains,
                "first",
            )),
            Rule::catch_all("Überprüfen"),
        ];
        mailbox.add_message(InMemoryMailbox::message("m2", "first", "body", None));
        let summary = driver(mailbox.clone(), rules, local())
            .run("anything")
            .await
            .unwrap();
        assert_eq!(summary.labelled(), 3);
        assert_eq!(mailbox.label_names(), vec!["Überprüfen"]);
    }

    #[tokio::test]
    async fn extractor_crash_skips_only_that_message() {
        let mailbox = InMemoryMailbox::new();
        for (id, payload) in [("m0", "boom"), ("m1", "JVBERi0")] {
            mailbox.add_message(InMemoryMailbox::message(id, "Application", "cv", Some("cv.pdf")));
            mailbox.set_attachment(id, &format!("{id}-pdf"), payload);
        }
        let mailbox = Arc::new(mailbox);
        let rules = vec![Rule::catch_all("Weak").with_pdf(FieldCondition::with_operand(
            Operator::DoesNotQualifyFor,
            "spring developer",
        ))];
        let summary = CategorizationDriver::new(
            mailbox.clone(),
            Arc::new(FragileText),
            Arc::new(FixedRules(rules)),
            local(),
            &ScannerConfig::default(),
        )
        .run("anything")
        .await
        .unwrap();

        assert_eq!(summary.state, RunState::Done);
        assert_eq!(summary.skipped, 1);
        assert!(mailbox.labels_on("m0").is_empty());
        assert_eq!(mailbox.labels_on("m1"), vec!["Weak"]);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_only_between_evaluations() {
        let evaluator = Arc::new(PacedEvaluator {
            delay: Duration::from_secs(4),
            calls: AtomicUsize::new(0),
        });
        let start = tokio::time::Instant::now();
        let summary = driver(mailbox_with(3), vec![Rule::catch_all("x")], evaluator.clone())
            .run("anything")
            .await
            .unwrap();
        assert_eq!(summary.scanned, 3);
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }
}
