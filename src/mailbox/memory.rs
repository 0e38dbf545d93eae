//! In-memory mailbox for tests and local dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::MailboxError;
use crate::mailbox::{Mailbox, label_key};
use crate::mailbox::types::{Header, MessagePage, MessagePart, PartBody, RawMessage};

#[derive(Default)]
struct State {
    messages: Vec<RawMessage>,
    attachments: HashMap<(String, String), String>,
    /// (id, name) in creation order.
    labels: Vec<(String, String)>,
    /// (message id, label id) in application order.
    applied: Vec<(String, String)>,
    list_calls: usize,
    page_sizes: Vec<usize>,
    unavailable: bool,
    fail_get: HashSet<String>,
    fail_apply: HashSet<String>,
    fail_list_from_page: Option<usize>,
}

/// Mailbox backed by a `Vec` of messages. Page tokens are offsets.
#[derive(Default)]
pub struct InMemoryMailbox {
    state: Mutex<State>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a simple message: a text/plain body and, optionally, a PDF
    /// attachment with id `<id>-pdf`.
    pub fn message(id: &str, subject: &str, body: &str, pdf_filename: Option<&str>) -> RawMessage {
        let mut parts = vec![MessagePart {
            mime_type: "text/plain".into(),
            body: PartBody {
                data: Some(URL_SAFE_NO_PAD.encode(body)),
                attachment_id: None,
                size: body.len() as u64,
            },
            ..Default::default()
        }];
        if let Some(filename) = pdf_filename {
            parts.push(MessagePart {
                mime_type: "application/pdf".into(),
                filename: filename.into(),
                body: PartBody {
                    data: None,
                    attachment_id: Some(format!("{id}-pdf")),
                    size: 0,
                },
                ..Default::default()
            });
        }

        let mut headers = Vec::new();
        if !subject.is_empty() {
            headers.push(Header {
                name: "Subject".into(),
                value: subject.into(),
            });
        }

        RawMessage {
            id: id.into(),
            thread_id: format!("t-{id}"),
            payload: MessagePart {
                mime_type: "multipart/mixed".into(),
                headers,
                parts,
                ..Default::default()
            },
        }
    }

    pub fn add_message(&self, message: RawMessage) {
        self.lock().messages.push(message);
    }

    /// Store the base64url payload returned for an attachment.
    pub fn set_attachment(&self, message_id: &str, attachment_id: &str, data: &str) {
        self.lock().attachments.insert(
            (message_id.to_string(), attachment_id.to_string()),
            data.to_string(),
        );
    }

    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    /// Make `get_message` fail for one message.
    pub fn fail_get_on(&self, message_id: &str) {
        self.lock().fail_get.insert(message_id.to_string());
    }

    /// Make `apply_label` fail for one message.
    pub fn fail_apply_on(&self, message_id: &str) {
        self.lock().fail_apply.insert(message_id.to_string());
    }

    /// Make listing fail from the given zero-based page onwards.
    pub fn fail_listing_from_page(&self, page: usize) {
        self.lock().fail_list_from_page = Some(page);
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Page sizes passed to `list_page`, in call order.
    pub fn requested_page_sizes(&self) -> Vec<usize> {
        self.lock().page_sizes.clone()
    }

    /// Names of all labels, in creation order.
    pub fn label_names(&self) -> Vec<String> {
        self.lock().labels.iter().map(|(_, name)| name.clone()).collect()
    }

    /// Names of labels applied to a message.
    pub fn labels_on(&self, message_id: &str) -> Vec<String> {
        let state = self.lock();
        state
            .applied
            .iter()
            .filter(|(msg, _)| msg == message_id)
            .filter_map(|(_, label_id)| {
                state
                    .labels
                    .iter()
                    .find(|(id, _)| id == label_id)
                    .map(|(_, name)| name.clone())
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Mailbox for InMemoryMailbox {
    async fn is_available(&self) -> bool {
        !self.lock().unavailable
    }

    async fn list_page(
        &self,
        _query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailboxError> {
        let mut state = self.lock();
        let page_index = state.list_calls;
        state.list_calls += 1;
        state.page_sizes.push(page_size);

        if let Some(fail_from) = state.fail_list_from_page
            && page_index >= fail_from
        {
            return Err(MailboxError::RequestFailed {
                operation: "messages.list".into(),
                reason: "injected listing failure".into(),
            });
        }

        let start = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| MailboxError::InvalidPayload(format!("bad page token '{token}'")))?,
            None => 0,
        };
        let end = (start + page_size).min(state.messages.len());
        let ids = state
            .messages
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|m| m.id.clone())
            .collect();
        let next_page_token = (end < state.messages.len()).then(|| end.to_string());

        Ok(MessagePage {
            ids,
            next_page_token,
        })
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage, MailboxError> {
        let state = self.lock();
        if state.fail_get.contains(id) {
            return Err(MailboxError::Status {
                operation: "messages.get".into(),
                status: 500,
                body: "injected fetch failure".into(),
            });
        }
        state
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| MailboxError::MessageNotFound { id: id.to_string() })
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<String, MailboxError> {
        self.lock()
            .attachments
            .get(&(message_id.to_string(), attachment_id.to_string()))
            .cloned()
            .ok_or_else(|| MailboxError::AttachmentNotFound {
                message_id: message_id.to_string(),
                attachment_id: attachment_id.to_string(),
            })
    }

    async fn get_or_create_label(&self, name: &str) -> Result<String, MailboxError> {
        let mut state = self.lock();
        if let Some((id, _)) = state
            .labels
            .iter()
            .find(|(_, existing)| label_key(existing) == label_key(name))
        {
            return Ok(id.clone());
        }
        let id = format!("Label_{}", state.labels.len() + 1);
        state.labels.push((id.clone(), name.to_string()));
        Ok(id)
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailboxError> {
        let mut state = self.lock();
        if state.fail_apply.contains(message_id) {
            return Err(MailboxError::RequestFailed {
                operation: "messages.modify".into(),
                reason: "injected apply failure".into(),
            });
        }
        if !state.messages.iter().any(|m| m.id == message_id) {
            return Err(MailboxError::MessageNotFound {
                id: message_id.to_string(),
            });
        }
        let pair = (message_id.to_string(), label_id.to_string());
        if !state.applied.contains(&pair) {
            state.applied.push(pair);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_label_is_idempotent() {
        let mailbox = InMemoryMailbox::new();
        let first = mailbox.get_or_create_label("To be Reviewed").await.unwrap();
        let second = mailbox.get_or_create_label("to be reviewed").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mailbox.label_names(), vec!["To be Reviewed"]);
    }

    #[tokio::test]
    async fn label_lookup_folds_non_ascii_case() {
        let mailbox = InMemoryMailbox::new();
        let first = mailbox.get_or_create_label("Überprüfen").await.unwrap();
        let second = mailbox.get_or_create_label("ÜBERPRÜFEN").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mailbox.label_names(), vec!["Überprüfen"]);
    }

    #[tokio::test]
    async fn get_message_and_injected_failure() {
        let mailbox = InMemoryMailbox::new();
        mailbox.add_message(InMemoryMailbox::message("m1", "s", "b", None));
        mailbox.add_message(InMemoryMailbox::message("m2", "s", "b", None));
        mailbox.fail_get_on("m2");

        assert_eq!(mailbox.get_message("m1").await.unwrap().id, "m1");
        assert!(matches!(
            mailbox.get_message("m2").await,
            Err(MailboxError::Status { status: 500, .. })
        ));
        assert!(matches!(
            mailbox.get_message("nope").await,
            Err(MailboxError::MessageNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn apply_label_records_once() {
        let mailbox = InMemoryMailbox::new();
        mailbox.add_message(InMemoryMailbox::message("m1", "s", "b", None));
        let id = mailbox.get_or_create_label("Java").await.unwrap();
        mailbox.apply_label("m1", &id).await.unwrap();
        mailbox.apply_label("m1", &id).await.unwrap();
        assert_eq!(mailbox.labels_on("m1"), vec!["Java"]);
    }

    #[tokio::test]
    async fn apply_label_unknown_message() {
        let mailbox = InMemoryMailbox::new();
        let id = mailbox.get_or_create_label("Java").await.unwrap();
        assert!(matches!(
            mailbox.apply_label("nope", &id).await,
            Err(MailboxError::MessageNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn missing_attachment() {
        let mailbox = InMemoryMailbox::new();
        assert!(matches!(
            mailbox.get_attachment("m1", "a1").await,
            Err(MailboxError::AttachmentNotFound { .. })
        ));
        mailbox.set_attachment("m1", "a1", "JVBERi0");
        assert_eq!(mailbox.get_attachment("m1", "a1").await.unwrap(), "JVBERi0");
    }

    #[tokio::test]
    async fn availability_toggle() {
        let mailbox = InMemoryMailbox::new();
        assert!(mailbox.is_available().await);
        mailbox.set_available(false);
        assert!(!mailbox.is_available().await);
    }
}
