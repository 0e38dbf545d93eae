use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use resume_scanner::config::{PipelineMode, ScannerConfig};
use resume_scanner::document::PdfTextExtractor;
use resume_scanner::error::PipelineError;
use resume_scanner::llm::{LlmConfig, create_provider};
use resume_scanner::mailbox::{GmailMailbox, Mailbox};
use resume_scanner::pipeline::{CategorizationDriver, build_pipeline};

/// Label Gmail messages by rules derived from a prompt.
#[derive(Debug, Parser)]
#[command(name = "resume-scanner", version)]
struct Cli {
    /// Categorization prompt. Read from stdin when omitted.
    prompt: Option<String>,

    /// Rule pipeline: pattern, model or keyword.
    #[arg(long)]
    pipeline: Option<PipelineMode>,

    /// Stop after this many messages.
    #[arg(long)]
    max_emails: Option<usize>,

    /// Gmail search query selecting messages to scan.
    #[arg(long)]
    query: Option<String>,

    /// Messages requested per page.
    #[arg(long)]
    batch_size: Option<usize>,
}

/// Console logging, plus a daily log file when `SCANNER_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match std::env::var("SCANNER_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "resume-scanner.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn read_prompt(arg: Option<String>) -> anyhow::Result<String> {
    let prompt = match arg {
        Some(prompt) => prompt,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read prompt from stdin")?;
            buf
        }
    };
    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        bail!("empty prompt; pass one as an argument or on stdin");
    }
    Ok(prompt)
}

fn run_error(e: PipelineError) -> anyhow::Error {
    match e {
        PipelineError::MailboxUnavailable => anyhow!("could not start, the mailbox is unavailable"),
        other => anyhow::Error::new(other).context("scan failed"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let mut config = ScannerConfig::from_env().context("invalid scanner configuration")?;
    if let Some(mode) = cli.pipeline {
        config.pipeline = mode;
    }
    if let Some(max) = cli.max_emails {
        config.max_messages = Some(max);
    }
    if let Some(query) = cli.query {
        config.search_query = query;
    }
    if let Some(size) = cli.batch_size {
        config.batch_size = size.max(1);
    }

    let prompt = read_prompt(cli.prompt)?;

    eprintln!("📬 Resume Scanner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Pipeline: {}", config.pipeline);
    eprintln!("   Query: {}", config.search_query);
    match config.max_messages {
        Some(max) => eprintln!("   Max emails: {max}"),
        None => eprintln!("   Max emails: unlimited"),
    }

    let llm = if config.pipeline == PipelineMode::Model {
        let llm_config = LlmConfig::from_env().context("LLM configuration")?;
        eprintln!("   Model: {} ({:?})", llm_config.model, llm_config.backend);
        Some(create_provider(&llm_config).context("failed to create LLM provider")?)
    } else {
        None
    };

    let mailbox: Arc<dyn Mailbox> = Arc::new(
        GmailMailbox::from_env()
            .await
            .context("failed to load Gmail credentials")?,
    );

    let (producer, evaluator) = build_pipeline(config.pipeline, &config, llm)?;
    let driver = CategorizationDriver::new(
        mailbox,
        Arc::new(PdfTextExtractor::new()),
        producer,
        evaluator,
        &config,
    );

    // Returning the error lets `_log_guard` flush the log file.
    let summary = driver.run(&prompt).await.map_err(run_error)?;

    println!("Run {} finished: {}", summary.run_id, summary.state);
    println!("  Rules:   {}", summary.rules);
    println!("  Scanned: {}", summary.scanned);
    println!("  Skipped: {}", summary.skipped);
    for (label, count) in &summary.label_counts {
        println!("  {label}: {count}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_mailbox_reports_could_not_start() {
        let message = run_error(PipelineError::MailboxUnavailable).to_string();
        assert_eq!(message, "could not start, the mailbox is unavailable");
    }

    #[test]
    fn other_failures_keep_their_cause() {
        let e = run_error(PipelineError::Rules("no provider".into()));
        assert_eq!(e.to_string(), "scan failed");
        assert!(format!("{e:#}").contains("no provider"));
    }

    #[test]
    fn blank_prompt_is_rejected() {
        assert!(read_prompt(Some("   ".into())).is_err());
        assert_eq!(read_prompt(Some(" label it ".into())).unwrap(), "label it");
    }
}
