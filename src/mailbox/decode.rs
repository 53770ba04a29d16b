//! Decoding raw RFC 822 payloads into `NormalizedMessage`s.
//!
//! Pure functions over bytes; no network. Decoding is permissive: bad
//! charsets and invalid bytes degrade to replacement characters instead of
//! failing the message.

use std::sync::LazyLock;

use mail_parser::{HeaderName, MessageParser, MessagePart, MimeHeaders, PartType};
use regex::Regex;

use crate::error::MailError;
use crate::mailbox::connection::RawMessage;
use crate::pipeline::types::NormalizedMessage;

static DISPLAY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^<]+)<").expect("display name pattern"));

/// Decode one fetched payload.
pub fn normalize(raw: &RawMessage) -> Result<NormalizedMessage, MailError> {
    let parsed = MessageParser::default()
        .parse(&raw.payload)
        .ok_or_else(|| MailError::Decode {
            id: raw.id.clone(),
            reason: "payload is not a parseable message".into(),
        })?;

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();
    let from = from_field(&parsed);
    let date = parsed
        .header_raw(HeaderName::Date)
        .map(collapse_whitespace)
        .unwrap_or_default();

    Ok(NormalizedMessage {
        sender: sender_display_name(&from),
        subject,
        date,
        body: collapse_whitespace(&plain_text_body(&parsed)),
    })
}

/// From header as `Name <addr>`, bare `addr`, or the raw header value.
fn from_field(parsed: &mail_parser::Message) -> String {
    let first = parsed.from().and_then(|addr| addr.first());
    match first {
        Some(a) => match (a.name(), a.address()) {
            (Some(name), Some(address)) => format!("{name} <{address}>"),
            (None, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => raw_from(parsed),
        },
        None => raw_from(parsed),
    }
}

fn raw_from(parsed: &mail_parser::Message) -> String {
    parsed
        .header_raw(HeaderName::From)
        .map(|f| f.trim().to_string())
        .unwrap_or_default()
}

/// Body text: first `text/plain` part of a multipart message, else the single part.
fn plain_text_body(parsed: &mail_parser::Message) -> String {
    let Some(root) = parsed.parts.first() else {
        return String::new();
    };

    if matches!(root.body, PartType::Multipart(_)) {
        parsed
            .parts
            .iter()
            .find(|part| is_plain_text(part))
            .map(part_text)
            .unwrap_or_default()
    } else {
        part_text(root)
    }
}

fn is_plain_text(part: &MessagePart) -> bool {
    match MimeHeaders::content_type(part) {
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct.subtype().is_some_and(|s| s.eq_ignore_ascii_case("plain"))
        }
        None => matches!(part.body, PartType::Text(_)),
    }
}

fn part_text(part: &MessagePart) -> String {
    match &part.body {
        PartType::Text(text) | PartType::Html(text) => text.to_string(),
        // Binary or otherwise non-text part: keep the raw bytes.
        _ => String::from_utf8_lossy(part.contents()).into_owned(),
    }
}

/// Collapse every whitespace run (newlines included) to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Display name from `Name <addr>`; the input unchanged when there is no `<`.
pub fn sender_display_name(from: &str) -> String {
    DISPLAY_NAME
        .captures(from)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_matches('"').trim())
        .filter(|name| !name.is_empty())
        .map_or_else(|| from.to_string(), str::to_string)
}
