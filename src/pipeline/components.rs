//! Derive `EmailComponents` from a raw Gmail message.

use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};

use crate::mailbox::types::{MessagePart, RawMessage};
use crate::pipeline::types::{EmailComponents, PdfAttachment};

impl EmailComponents {
    /// Normalize a raw message: subject header, flattened body text and the
    /// first PDF attachment, if any.
    pub fn from_message(message: &RawMessage) -> Self {
        let payload = &message.payload;
        let subject = payload.header("Subject").unwrap_or_default().to_string();

        let mut texts = Vec::new();
        collect_text(payload, &mut texts);
        let body = texts.join("\n");

        let pdf = find_pdf(payload);

        Self {
            message_id: message.id.clone(),
            subject,
            body,
            has_pdf: pdf.is_some(),
            pdf,
            pdf_text: None,
        }
    }
}

/// Depth-first walk collecting text/plain and tag-stripped text/html.
fn collect_text(part: &MessagePart, out: &mut Vec<String>) {
    let is_leaf = part.parts.is_empty();
    if is_leaf && part.filename.is_empty() {
        let decoded = part.body.data.as_deref().and_then(decode_base64url);
        match (part.mime_type.as_str(), decoded) {
            ("text/plain", Some(text)) => out.push(text),
            ("text/html", Some(html)) => out.push(strip_html(&html)),
            _ => {}
        }
    }
    for child in &part.parts {
        collect_text(child, out);
    }
}

fn find_pdf(part: &MessagePart) -> Option<PdfAttachment> {
    if part.filename.to_lowercase().ends_with(".pdf") {
        return Some(PdfAttachment {
            filename: part.filename.clone(),
            attachment_id: part.body.attachment_id.clone(),
            inline_data: part.body.data.clone(),
        });
    }
    part.parts.iter().find_map(find_pdf)
}

fn decode_base64url(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .or_else(|_| URL_SAFE.decode(data))
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Basic HTML tag stripping (no external dependency).
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                result.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    // Normalize whitespace
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::types::{Header, PartBody};

    fn encode(s: &str) -> String {
        URL_SAFE_NO_PAD.encode(s)
    }

    fn text_part(mime: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: mime.into(),
            body: PartBody {
                data: Some(encode(text)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn flattens_nested_multipart_depth_first() {
        let message = RawMessage {
            id: "m1".into(),
            payload: MessagePart {
                mime_type: "multipart/mixed".into(),
                headers: vec![Header {
                    name: "subject".into(),
                    value: "Application: Java Developer".into(),
                }],
                parts: vec![
                    MessagePart {
                        mime_type: "multipart/alternative".into(),
                        parts: vec![
                            text_part("text/plain", "Hi, I am John"),
                            text_part("text/html", "<p>Hi, <b>I am</b> John</p>"),
                        ],
                        ..Default::default()
                    },
                    MessagePart {
                        mime_type: "application/pdf".into(),
                        filename: "John_CV.PDF".into(),
                        body: PartBody {
                            attachment_id: Some("att-9".into()),
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
            ..Default::default()
        };

        let c = EmailComponents::from_message(&message);
        assert_eq!(c.subject, "Application: Java Developer");
        assert_eq!(c.body, "Hi, I am John\nHi, I am John");
        assert!(c.has_pdf);
        let pdf = c.pdf.unwrap();
        assert_eq!(pdf.filename, "John_CV.PDF");
        assert_eq!(pdf.attachment_id.as_deref(), Some("att-9"));
        assert!(c.pdf_text.is_none());
    }

    #[test]
    fn single_part_message() {
        let message = RawMessage {
            id: "m2".into(),
            payload: text_part("text/plain", "just text"),
            ..Default::default()
        };
        let c = EmailComponents::from_message(&message);
        assert_eq!(c.subject, "");
        assert_eq!(c.body, "just text");
        assert!(!c.has_pdf);
    }

    #[test]
    fn padded_and_undecodable_bodies() {
        let mut padded = text_part("text/plain", "");
        padded.body.data = Some("aGk=".into());
        let mut broken = text_part("text/plain", "");
        broken.body.data = Some("%%%".into());

        let message = RawMessage {
            id: "m3".into(),
            payload: MessagePart {
                mime_type: "multipart/mixed".into(),
                parts: vec![padded, broken],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(EmailComponents::from_message(&message).body, "hi");
    }

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn strip_html_separates_block_text() {
        assert_eq!(strip_html("<p>one</p><p>two</p>"), "one two");
    }
}
