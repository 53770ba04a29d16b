//! Rule-based fallback classifier.
//!
//! Used for the whole batch whenever the remote classification is unusable.
//! Keyword rules run in order against the lower-cased subject and body;
//! the first match wins:
//! - interview / next step / schedule / congratulation → Positive
//! - reject / not selected / unfortunately / regret → Negative
//! - follow up / document / confirm / required → Follow-up needed
//! - anything else → Neutral

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::{Category, ClassificationResult, NormalizedMessage};

/// Longest summary kept before truncation, in characters.
pub const SUMMARY_MAX_CHARS: usize = 150;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+").expect("sentence terminator pattern"));

/// A single keyword rule: an alternation of escaped keywords and the
/// category assigned on match.
#[derive(Debug, Clone)]
struct KeywordRule {
    regex: Regex,
    category: Category,
}

impl KeywordRule {
    fn new(keywords: &[&str], category: Category) -> Result<Self, regex::Error> {
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(&k.to_lowercase()))
            .collect::<Vec<_>>()
            .join("|");
        Ok(Self {
            regex: Regex::new(&alternation)?,
            category,
        })
    }
}

/// Deterministic keyword classifier. No I/O.
#[derive(Debug, Clone)]
pub struct RuleFallbackClassifier {
    rules: Vec<KeywordRule>,
}

impl RuleFallbackClassifier {
    /// Create a classifier with the default job-application rules.
    pub fn new() -> Self {
        let table: [(&[&str], Category); 3] = [
            (
                &["interview", "next step", "schedule", "congratulation"],
                Category::Positive,
            ),
            (
                &["reject", "not selected", "unfortunately", "regret"],
                Category::Negative,
            ),
            (
                &["follow up", "document", "confirm", "required"],
                Category::FollowUpNeeded,
            ),
        ];

        let rules = table
            .into_iter()
            .filter_map(|(keywords, category)| KeywordRule::new(keywords, category).ok())
            .collect();

        Self { rules }
    }

    /// Classify a single message.
    pub fn classify_one(&self, message: &NormalizedMessage) -> ClassificationResult {
        let haystack = format!("{}{}", message.subject, message.body).to_lowercase();

        let category = self
            .rules
            .iter()
            .find(|rule| rule.regex.is_match(&haystack))
            .map_or(Category::Neutral, |rule| rule.category);

        debug!(
            subject = %message.subject,
            category = %category,
            "Rule fallback classified message"
        );

        ClassificationResult {
            category,
            summary: first_sentence_summary(&message.body),
        }
    }

    /// Classify every message, preserving order.
    pub fn classify_all(&self, messages: &[NormalizedMessage]) -> Vec<ClassificationResult> {
        messages.iter().map(|m| self.classify_one(m)).collect()
    }
}

impl Default for RuleFallbackClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Text before the first sentence terminator, capped at [`SUMMARY_MAX_CHARS`].
pub fn first_sentence_summary(body: &str) -> String {
    let sentence = SENTENCE_END.split(body).next().unwrap_or_default().trim();

    if sentence.chars().count() > SUMMARY_MAX_CHARS {
        let mut summary: String = sentence.chars().take(SUMMARY_MAX_CHARS).collect();
        summary.push_str("...");
        summary
    } else {
        sentence.to_string()
    }
}
