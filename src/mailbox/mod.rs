//! Mailbox collaborator: message listing, attachments and labels.
//!
//! The scanner only needs a narrow slice of a mail provider. `Mailbox`
//! captures that slice; `MessageBatches` turns paged listing into a lazy
//! batch producer with an optional total cap.

pub mod gmail;
pub mod memory;
pub mod types;

pub use gmail::GmailMailbox;
pub use memory::InMemoryMailbox;
pub use types::{Header, MessagePage, MessagePart, PartBody, RawMessage};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MailboxError;

/// Operations the scanner needs from a mail provider.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Whether the provider is reachable and authorized.
    async fn is_available(&self) -> bool;

    /// Fetch one page of message ids matching `query`.
    async fn list_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailboxError>;

    /// Fetch a full message: headers, body parts and attachment references.
    async fn get_message(&self, id: &str) -> Result<RawMessage, MailboxError>;

    /// Fetch an attachment's base64url payload.
    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<String, MailboxError>;

    /// Find a label by name (compared through `label_key`) or create it.
    /// Returns its id.
    async fn get_or_create_label(&self, name: &str) -> Result<String, MailboxError>;

    /// Add a label to a message.
    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailboxError>;
}

/// Case-folded form under which label names are compared.
pub fn label_key(name: &str) -> String {
    name.to_lowercase()
}

/// Lazily pulls pages of message ids, at most `max_results` in total.
pub struct MessageBatches {
    mailbox: Arc<dyn Mailbox>,
    query: String,
    batch_size: usize,
    max_results: Option<usize>,
    next_token: Option<String>,
    fetched: usize,
    exhausted: bool,
}

impl MessageBatches {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        query: impl Into<String>,
        batch_size: usize,
        max_results: Option<usize>,
    ) -> Self {
        Self {
            mailbox,
            query: query.into(),
            batch_size: batch_size.max(1),
            max_results,
            next_token: None,
            fetched: 0,
            exhausted: false,
        }
    }

    /// Next non-empty batch, or `None` when the listing or the cap is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<String>>, MailboxError> {
        if self.exhausted {
            return Ok(None);
        }
        let remaining = self.max_results.map(|max| max.saturating_sub(self.fetched));
        if remaining == Some(0) {
            self.exhausted = true;
            return Ok(None);
        }
        let page_size = remaining.map_or(self.batch_size, |left| left.min(self.batch_size));

        let page = self
            .mailbox
            .list_page(&self.query, page_size, self.next_token.as_deref())
            .await?;

        self.next_token = page.next_page_token;
        if self.next_token.is_none() {
            self.exhausted = true;
        }

        let mut ids = page.ids;
        if let Some(left) = remaining {
            ids.truncate(left);
        }
        self.fetched += ids.len();

        tracing::debug!(
            batch = ids.len(),
            fetched = self.fetched,
            more = !self.exhausted,
            "Fetched message batch"
        );

        if ids.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        Ok(Some(ids))
    }
}
