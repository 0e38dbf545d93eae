//! Resume text extraction from base64 PDF payloads.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};

/// Turns an attachment payload into searchable text.
pub trait DocumentText: Send + Sync {
    /// Lowercased document text; empty on any failure.
    fn extract_text(&self, base64_pdf: &str) -> String;
}

/// `pdf-extract` backed extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// Gmail hands out base64url, usually without padding; accept standard too.
fn decode_payload(payload: &str) -> Option<Vec<u8>> {
    let trimmed = payload.trim();
    URL_SAFE
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed))
        .or_else(|_| STANDARD.decode(trimmed))
        .ok()
}

impl DocumentText for PdfTextExtractor {
    fn extract_text(&self, base64_pdf: &str) -> String {
        let Some(bytes) = decode_payload(base64_pdf) else {
            tracing::warn!("Attachment payload is not valid base64");
            return String::new();
        };

        // pdf-extract panics on some malformed documents.
        match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(&bytes)) {
            Ok(Ok(text)) => text.to_lowercase(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to extract PDF text");
                String::new()
            }
            Err(_) => {
                tracing::warn!("PDF extraction panicked on a malformed document");
                String::new()
            }
        }
    }
}
