//! Resume scanner: categorize mailbox messages from a natural-language prompt.

pub mod config;
pub mod document;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
