//! Batch classifier: one remote request for the whole run.
//!
//! Flow:
//! 1. Build a single prompt listing every message (1-indexed)
//! 2. One completion call, low temperature, bounded tokens
//! 3. Parse `Email N: Category: ..., Summary: ...` lines back into results
//!
//! The parsed list must line up 1:1 with the input. A shortfall is a
//! `ClassifyError::CountMismatch`; no partial salvage.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::ClassifyError;
use crate::llm::provider::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};
use crate::pipeline::types::{Category, ClassificationResult, NormalizedMessage};

/// Body characters included per message in the prompt.
pub const PROMPT_BODY_CHARS: usize = 300;

/// Max tokens for the batch call.
const BATCH_MAX_TOKENS: u32 = 800;

/// Temperature for the batch call (deterministic-ish).
const BATCH_TEMPERATURE: f32 = 0.1;

/// Summary used when a line has a marker but no `Summary:` field.
pub const NO_SUMMARY: &str = "No summary available";

static CATEGORY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Category:\s*(\w+(?:\s+\w+)*)").expect("category field pattern")
});

static SUMMARY_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Summary:\s*(.*)").expect("summary field pattern"));

/// Classifies a batch of messages with a single LLM call.
pub struct BatchClassifier {
    llm: Arc<dyn LlmProvider>,
    max_tokens: u32,
    temperature: f32,
}

impl BatchClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            max_tokens: BATCH_MAX_TOKENS,
            temperature: BATCH_TEMPERATURE,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Classify every message, or fail so the caller can fall back.
    ///
    /// On `Ok`, the result has exactly `messages.len()` entries in input order.
    pub async fn classify(
        &self,
        messages: &[NormalizedMessage],
    ) -> Result<Vec<ClassificationResult>, ClassifyError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let request = CompletionRequest::new(vec![ChatMessage::user(build_batch_prompt(messages))])
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        info!(
            count = messages.len(),
            model = self.llm.model_name(),
            "Requesting batch classification"
        );

        let response = self.llm.complete(request).await?;

        debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Batch classification response received"
        );

        let truncated = response.finish_reason == FinishReason::Length;
        if truncated {
            warn!(
                max_tokens = self.max_tokens,
                count = messages.len(),
                "Batch response stopped at the token limit"
            );
        }

        let results = parse_batch_response(&response.content, messages.len());
        if results.len() != messages.len() {
            warn!(
                expected = messages.len(),
                parsed = results.len(),
                truncated,
                raw_response = %response.content,
                "Batch response incomplete"
            );
            return Err(ClassifyError::CountMismatch {
                expected: messages.len(),
                parsed: results.len(),
                truncated,
            });
        }

        Ok(results)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the combined classification prompt.
pub fn build_batch_prompt(messages: &[NormalizedMessage]) -> String {
    let mut prompt = String::with_capacity(256 + messages.len() * (PROMPT_BODY_CHARS + 64));
    prompt.push_str("Classify and summarize these job application emails:\n\n");

    for (i, message) in messages.iter().enumerate() {
        let body_preview: String = message.body.chars().take(PROMPT_BODY_CHARS).collect();
        prompt.push_str(&format!("Email {}:\n", i + 1));
        prompt.push_str(&format!("Subject: {}\n", message.subject));
        prompt.push_str(&format!("Body: {body_preview}\n\n"));
    }

    prompt.push_str(
        "For each email, provide:\n\
         1. Category (Positive, Negative, Neutral, or Follow-up needed)\n\
         2. A brief summary (1-2 sentences)\n\n\
         Format your response as:\n\
         Email 1: Category: <category>, Summary: <summary>\n\
         Email 2: Category: <category>, Summary: <summary>\n",
    );

    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse the model's free text into per-message results.
///
/// Each position looks up its own `Email <i+1>:` line, so line order in the
/// response does not matter. Positions without a line produce no entry; the
/// returned list is then shorter than `expected`.
pub fn parse_batch_response(raw: &str, expected: usize) -> Vec<ClassificationResult> {
    let lines: Vec<&str> = raw.lines().collect();

    (1..=expected)
        .filter_map(|n| {
            let marker = format!("Email {n}:");
            lines
                .iter()
                .find(|line| line.contains(&marker))
                .map(|line| parse_result_line(line))
        })
        .collect()
}

fn parse_result_line(line: &str) -> ClassificationResult {
    let category = CATEGORY_FIELD
        .captures(line)
        .and_then(|c| c.get(1))
        .map_or(Category::Neutral, |m| Category::from_model_text(m.as_str()));

    let summary = SUMMARY_FIELD
        .captures(line)
        .and_then(|c| c.get(1))
        .map_or_else(|| NO_SUMMARY.to_string(), |m| m.as_str().trim().to_string());

    ClassificationResult { category, summary }
}
