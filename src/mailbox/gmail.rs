//! Gmail mailbox over the REST v1 API.
//!
//! Authorization is a bearer access token, taken either directly from
//! `GMAIL_ACCESS_TOKEN` or obtained by exchanging the refresh token stored in
//! an authorized-user token file (`GMAIL_TOKEN_FILE`, default `token.json`).

use std::path::Path;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::MailboxError;
use crate::mailbox::{Mailbox, label_key};
use crate::mailbox::types::{MessagePage, RawMessage};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Gmail REST client scoped to the authorized user.
pub struct GmailMailbox {
    client: reqwest::Client,
    access_token: SecretString,
}

/// Authorized-user token file as written by Google's OAuth client libraries.
#[derive(Deserialize)]
struct TokenFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Deserialize)]
struct AttachmentResponse {
    #[serde(default)]
    data: String,
}

#[derive(Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Deserialize)]
struct Label {
    id: String,
    name: String,
}

impl GmailMailbox {
    pub fn new(access_token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
        }
    }

    /// Build from `GMAIL_ACCESS_TOKEN`, falling back to the token file.
    pub async fn from_env() -> Result<Self, MailboxError> {
        if let Ok(token) = std::env::var("GMAIL_ACCESS_TOKEN") {
            return Ok(Self::new(SecretString::from(token)));
        }
        let path =
            std::env::var("GMAIL_TOKEN_FILE").unwrap_or_else(|_| DEFAULT_TOKEN_FILE.to_string());
        Self::from_token_file(Path::new(&path)).await
    }

    /// Read an authorized-user token file, refreshing the access token when a
    /// refresh token and client credentials are present.
    pub async fn from_token_file(path: &Path) -> Result<Self, MailboxError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MailboxError::AuthFailed(format!("cannot read {}: {e}", path.display()))
        })?;
        let file: TokenFile = serde_json::from_str(&raw)
            .map_err(|e| MailboxError::AuthFailed(format!("malformed token file: {e}")))?;

        let client = reqwest::Client::new();
        let token = match (&file.refresh_token, &file.client_id, &file.client_secret) {
            (Some(refresh), Some(id), Some(secret)) => {
                let uri = file.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
                refresh_access_token(&client, uri, id, secret, refresh).await?
            }
            _ => file
                .token
                .ok_or_else(|| MailboxError::AuthFailed("token file has no usable token".into()))?,
        };

        tracing::info!("Gmail credentials loaded from {}", path.display());
        Ok(Self {
            client,
            access_token: SecretString::from(token),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{GMAIL_API_BASE}/{path}")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailboxError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(self.access_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| request_failed(operation, e))?;
        decode(operation, resp).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, MailboxError> {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(self.access_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| request_failed(operation, e))?;
        decode(operation, resp).await
    }
}

async fn refresh_access_token(
    client: &reqwest::Client,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<String, MailboxError> {
    let resp = client
        .post(token_uri)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .map_err(|e| MailboxError::AuthFailed(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(MailboxError::AuthFailed(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| MailboxError::AuthFailed(e.to_string()))?;
    Ok(token.access_token)
}

fn request_failed(operation: &str, e: reqwest::Error) -> MailboxError {
    MailboxError::RequestFailed {
        operation: operation.to_string(),
        reason: e.to_string(),
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    operation: &str,
    resp: reqwest::Response,
) -> Result<T, MailboxError> {
    let status = resp.status();
    let text = resp.text().await.map_err(|e| request_failed(operation, e))?;
    if !status.is_success() {
        return Err(MailboxError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str(&text)
        .map_err(|e| MailboxError::InvalidPayload(format!("{operation}: {e}")))
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn is_available(&self) -> bool {
        match self
            .get_json::<serde_json::Value>("profile", "profile", &[])
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "Gmail profile check failed");
                false
            }
        }
    }

    async fn list_page(
        &self,
        query: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage, MailboxError> {
        let mut params = vec![
            ("q", query.to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let listing: ListResponse = self.get_json("messages.list", "messages", &params).await?;
        tracing::debug!(count = listing.messages.len(), "Listed message ids");

        Ok(MessagePage {
            ids: listing.messages.into_iter().map(|m| m.id).collect(),
            next_page_token: listing.next_page_token,
        })
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage, MailboxError> {
        self.get_json(
            "messages.get",
            &format!("messages/{id}"),
            &[("format", "full".to_string())],
        )
        .await
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<String, MailboxError> {
        let attachment: AttachmentResponse = self
            .get_json(
                "attachments.get",
                &format!("messages/{message_id}/attachments/{attachment_id}"),
                &[],
            )
            .await?;
        if attachment.data.is_empty() {
            return Err(MailboxError::AttachmentNotFound {
                message_id: message_id.to_string(),
                attachment_id: attachment_id.to_string(),
            });
        }
        Ok(attachment.data)
    }

    async fn get_or_create_label(&self, name: &str) -> Result<String, MailboxError> {
        let existing: LabelList = self.get_json("labels.list", "labels", &[]).await?;
        if let Some(label) = existing
            .labels
            .into_iter()
            .find(|l| label_key(&l.name) == label_key(name))
        {
            return Ok(label.id);
        }

        let body = serde_json::json!({
            "name": name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show",
        });
        let created: Label = self.post_json("labels.create", "labels", &body).await?;
        tracing::info!(label = %created.name, id = %created.id, "Created label");
        Ok(created.id)
    }

    async fn apply_label(&self, message_id: &str, label_id: &str) -> Result<(), MailboxError> {
        let body = serde_json::json!({ "addLabelIds": [label_id] });
        let _: serde_json::Value = self
            .post_json(
                "messages.modify",
                &format!("messages/{message_id}/modify"),
                &body,
            )
            .await?;
        tracing::debug!(message_id, label_id, "Applied label");
        Ok(())
    }
}
