//! Model-assisted rule production and per-email classification.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, RetryPolicy, is_rate_limited, retry_with_backoff};
use crate::mailbox::label_key;
use crate::pipeline::rule::Rule;
use crate::pipeline::types::EmailComponents;

/// Deterministic output for both call sites.
const MODEL_TEMPERATURE: f32 = 0.0;
const RULES_MAX_TOKENS: u32 = 2048;
const CLASSIFY_MAX_TOKENS: u32 = 64;

const RULES_RETRY: RetryPolicy = RetryPolicy::new(3, Duration::from_secs(2));
const CLASSIFY_RETRY: RetryPolicy = RetryPolicy::new(3, Duration::from_secs(1));

/// Sentinel the model returns when no rule matches.
pub const NO_MATCH: &str = "NO_MATCH";

const BODY_PREVIEW_CHARS: usize = 4000;
const RESUME_EXCERPT_CHARS: usize = 1500;

// ── Rule production ─────────────────────────────────────────────────

/// Asks a language model to turn a prompt into rules.
pub struct ModelRuleProducer {
    llm: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
}

impl ModelRuleProducer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            retry: RULES_RETRY,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rules for `prompt`, or an empty list on any failure.
    pub async fn generate_rules(&self, prompt: &str) -> Vec<Rule> {
        let system = build_rules_system_prompt();
        let user = build_rules_user_prompt(prompt);

        let result = retry_with_backoff(self.retry, is_rate_limited, || {
            let request = CompletionRequest::new(vec![
                ChatMessage::system(system.as_str()),
                ChatMessage::user(user.as_str()),
            ])
            .with_temperature(MODEL_TEMPERATURE)
            .with_max_tokens(RULES_MAX_TOKENS);
            self.llm.complete(request)
        })
        .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                error!(model = self.llm.model_name(), error = %e, "Rule generation failed");
                return Vec::new();
            }
        };

        match parse_rules_response(&response.content) {
            Ok(rules) => {
                info!(count = rules.len(), "Model produced rules");
                rules
            }
            Err(e) => {
                error!(raw_response = %response.content, error = %e, "Failed to parse model rules");
                Vec::new()
            }
        }
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Asks a language model which rule, if any, an email matches.
pub struct ModelEvaluator {
    llm: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
    call_delay: Duration,
}

impl ModelEvaluator {
    pub fn new(llm: Arc<dyn LlmProvider>, call_delay: Duration) -> Self {
        Self {
            llm,
            retry: CLASSIFY_RETRY,
            call_delay,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pause the driver keeps between consecutive classifications.
    pub fn call_delay(&self) -> Duration {
        self.call_delay
    }

    /// Label of the first matching rule, `None` for `NO_MATCH` or for a
    /// reply that names no rule's label.
    pub async fn classify(
        &self,
        email: &EmailComponents,
        rules: &[Rule],
    ) -> Result<Option<String>, PipelineError> {
        let system = build_classify_system_prompt();
        let user = build_classify_user_prompt(email, rules)?;

        let response = retry_with_backoff(self.retry, is_rate_limited, || {
            let request = CompletionRequest::new(vec![
                ChatMessage::system(system.as_str()),
                ChatMessage::user(user.as_str()),
            ])
            .with_temperature(MODEL_TEMPERATURE)
            .with_max_tokens(CLASSIFY_MAX_TOKENS);
            self.llm.complete(request)
        })
        .await
        .map_err(|e| PipelineError::Classification(format!("LLM call failed: {e}")))?;

        let reply = parse_label_response(&response.content);
        let label = reply.as_deref().and_then(|reply| {
            let label = rule_label(reply, rules);
            if label.is_none() {
                warn!(
                    message_id = %email.message_id,
                    reply,
                    "Model replied with a label no rule defines, treating as no match"
                );
            }
            label
        });
        debug!(
            message_id = %email.message_id,
            raw = %response.content.trim(),
            label = label.as_deref(),
            "Model classification"
        );
        Ok(label)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_rules_system_prompt() -> String {
    "You are an email categorization expert. Given a user's prompt, create ONLY the \
     categorization rules that are explicitly mentioned.\n\n\
     Rules:\n\
     - Do NOT create additional catch-all or \"else\" rules unless the user explicitly asks for them\n\
     - Understand the pattern, not just the exact text: in \"I am XYZ from ABC city\", XYZ and ABC \
       are placeholders for any name and any city\n\
     - Bracketed words in a pattern such as [name] or [city] stand for any value\n\
     - Use the EXACT case of label names as written in the prompt\n\n\
     Each rule may have these groups, each a JSON array of an operator and an optional operand:\n\
     - \"Subject\": Exists, Does not Exist, Contains <text>, Does not Contain <text>, \
       Starts with <text>, Ends with <text>\n\
     - \"Body\": the Subject operators plus Contains pattern <regex or description>\n\
     - \"PDF\": Exists, Does not Exist, Contains skill <skill>, Does not contain skill <skill>, \
       Qualifies for <criteria>, Does not qualify for <criteria>\n\
     - \"Label Action\": [\"<label name>\"]\n\n\
     Respond with ONLY a JSON array, no markdown and no extra text, for example:\n\
     [{\"Subject\": [\"Does not Exist\"], \"Body\": [\"Does not Exist\"], \"Label Action\": [\"To be Deleted\"]},\n \
      {\"Body\": [\"Contains pattern\", \"I am [name] from [city]\"], \"Label Action\": [\"To be Deleted\"]}]"
        .to_string()
}

fn build_rules_user_prompt(prompt: &str) -> String {
    format!(
        "Turn this prompt into rules: \"{prompt}\"\n\n\
         Only create rules the prompt asks for. If it says \"else\" or \"otherwise\", add a rule \
         for that case. \"no subject and no body\" means Subject [\"Does not Exist\"] and \
         Body [\"Does not Exist\"] in the same rule."
    )
}

fn build_classify_system_prompt() -> String {
    format!(
        "You are an email categorization expert. Given an email's subject, body and PDF status, \
         decide which rule it matches.\n\n\
         Rules:\n\
         - Check rules in order; the first matching rule wins\n\
         - All groups present in a rule must hold\n\
         - \"Contains\" is a case-insensitive text check\n\
         - \"Contains pattern\" matches the meaning of the pattern; bracketed words stand for any value\n\
         - \"Contains skill\" checks the resume text when it is provided\n\
         - Reply with the matching rule's label exactly as written, or {NO_MATCH} if no rule matches\n\
         - Reply with the label only, no quotes and no explanation"
    )
}

fn build_classify_user_prompt(
    email: &EmailComponents,
    rules: &[Rule],
) -> Result<String, PipelineError> {
    let rules_json = serde_json::to_string_pretty(rules)
        .map_err(|e| PipelineError::Classification(format!("cannot encode rules: {e}")))?;

    let mut prompt = String::with_capacity(1024);
    prompt.push_str(&format!("Subject: \"{}\"\n", email.subject));
    let body_preview: String = email.body.chars().take(BODY_PREVIEW_CHARS).collect();
    prompt.push_str(&format!("Body: \"{}\"\n", body_preview));
    prompt.push_str(&format!("Has PDF: {}\n", email.has_pdf));
    if let Some(text) = email.pdf_text.as_deref().filter(|t| !t.is_empty()) {
        let excerpt: String = text.chars().take(RESUME_EXCERPT_CHARS).collect();
        prompt.push_str(&format!("Resume excerpt: \"{}\"\n", excerpt));
    }
    prompt.push_str(&format!("\nRules:\n{rules_json}\n"));
    prompt.push_str(&format!("\nReply with the label or {NO_MATCH}."));
    Ok(prompt)
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse a model's rule list. Elements that are not valid rules are dropped.
fn parse_rules_response(raw: &str) -> Result<Vec<Rule>, String> {
    let cleaned = strip_code_fence(raw);
    let elements: Vec<serde_json::Value> = match serde_json::from_str(cleaned) {
        Ok(elements) => elements,
        Err(direct) => {
            let extracted = extract_json_array(raw)
                .ok_or_else(|| format!("no JSON array in response ({direct})"))?;
            debug!(extracted, "Recovered JSON array from model output");
            serde_json::from_str(extracted).map_err(|e| format!("JSON parse error: {e}"))?
        }
    };

    Ok(elements
        .into_iter()
        .filter_map(|element| match serde_json::from_value::<Rule>(element.clone()) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(element = %element, error = %e, "Dropping invalid rule from model output");
                None
            }
        })
        .collect())
}

/// Strip a leading fence line (with optional language tag) and a trailing fence.
fn strip_code_fence(text: &str) -> &str {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// First top-level `[...]` in `text`, honoring brackets inside JSON strings.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Trim the reply and strip surrounding quotes or backticks.
/// The rule label `reply` names, in the rule's own spelling.
fn rule_label(reply: &str, rules: &[Rule]) -> Option<String> {
    let key = label_key(reply);
    rules
        .iter()
        .map(Rule::label)
        .find(|label| label_key(label) == key)
        .map(str::to_string)
}

fn parse_label_response(raw: &str) -> Option<String> {
    let label = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim();
    if label.is_empty() || label.eq_ignore_ascii_case(NO_MATCH) {
        None
    } else {
        Some(label.to_string())
    }
}
