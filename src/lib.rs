//! Inbox Triage: fetch recent mail over IMAP, classify it, report.

pub mod config;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
pub mod report;
