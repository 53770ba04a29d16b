//! Shared types for the classification pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Normalized message ──────────────────────────────────────────────

/// One decoded inbox message, as handed from the fetcher to the classifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Display name when the From header has one, otherwise the raw From value.
    pub sender: String,
    /// Charset-decoded subject line.
    pub subject: String,
    /// Raw `Date:` header. Not reparsed at fetch time.
    pub date: String,
    /// Plain-text body with whitespace runs collapsed to single spaces.
    pub body: String,
}

// ── Category ────────────────────────────────────────────────────────

/// Outcome category for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Positive,
    Negative,
    Neutral,
    #[serde(rename = "Follow-up needed")]
    FollowUpNeeded,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 4] = [
        Category::Positive,
        Category::Negative,
        Category::Neutral,
        Category::FollowUpNeeded,
    ];

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
            Self::FollowUpNeeded => "Follow-up needed",
        }
    }

    /// Map free text from the model onto a category.
    ///
    /// Lexical: "positive", then "negative", then "follow"/"needed", else Neutral.
    pub fn from_model_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("positive") {
            Self::Positive
        } else if lower.contains("negative") {
            Self::Negative
        } else if lower.contains("follow") || lower.contains("needed") {
            Self::FollowUpNeeded
        } else {
            Self::Neutral
        }
    }

    /// Suggested next step shown alongside a record.
    pub fn suggested_action(self) -> &'static str {
        match self {
            Self::FollowUpNeeded => "Follow up",
            _ => "Monitor",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Classification result ───────────────────────────────────────────

/// Category and short summary for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub summary: String,
}

impl ClassificationResult {
    pub fn new(category: Category, summary: impl Into<String>) -> Self {
        Self {
            category,
            summary: summary.into(),
        }
    }
}

/// Which classifier produced a batch of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Remote,
    RuleFallback,
}

// ── Output record ───────────────────────────────────────────────────

/// Final per-message record handed to whatever renders or exports the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub from: String,
    pub subject: String,
    pub date: String,
    pub category: Category,
    pub summary: String,
    pub suggested_action: String,
}

impl OutputRecord {
    pub fn new(message: &NormalizedMessage, result: &ClassificationResult) -> Self {
        Self {
            from: message.sender.clone(),
            subject: message.subject.clone(),
            date: message.date.clone(),
            category: result.category,
            summary: result.summary.clone(),
            suggested_action: result.category.suggested_action().to_string(),
        }
    }
}
