//! Triage processor: fetch → classify (with fallback) → assemble records.
//!
//! Flow:
//! 1. Blocking IMAP session on a `spawn_blocking` thread
//! 2. One batch classification call
//! 3. Rule-based fallback for the whole batch if step 2 fails in any way
//! 4. Zip messages and results into `OutputRecord`s
//!
//! Only configuration and authentication problems fail a run. Everything
//! else degrades: fewer messages, or rule-based results.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{AppConfig, ClassifierConfig, MailConfig};
use crate::error::{Error, LlmError, MailError, Result};
use crate::llm::create_provider;
use crate::llm::provider::LlmProvider;
use crate::mailbox::{
    Connector, Credentials, FetchOptions, ImapConnector, MailboxSession, MessageFetcher,
};
use crate::pipeline::batch::BatchClassifier;
use crate::pipeline::rules::RuleFallbackClassifier;
use crate::pipeline::types::{
    ClassificationResult, ClassificationSource, NormalizedMessage, OutputRecord,
};
use crate::report::RunReport;

/// Results for a batch plus the classifier that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedBatch {
    pub results: Vec<ClassificationResult>,
    pub source: ClassificationSource,
}

/// Classifies fetched messages, falling back to keyword rules when the
/// remote classifier cannot produce a complete answer.
pub struct TriageProcessor {
    batch: BatchClassifier,
    rules: RuleFallbackClassifier,
}

impl TriageProcessor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            batch: BatchClassifier::new(llm),
            rules: RuleFallbackClassifier::new(),
        }
    }

    /// Build with the OpenRouter provider and the configured call parameters.
    pub fn from_config(config: &ClassifierConfig) -> std::result::Result<Self, LlmError> {
        let llm = create_provider(config)?;
        Ok(Self {
            batch: BatchClassifier::new(llm)
                .with_max_tokens(config.max_tokens)
                .with_temperature(config.temperature),
            rules: RuleFallbackClassifier::new(),
        })
    }

    /// One result per message, in input order, whichever classifier answers.
    pub async fn classify_with_fallback(&self, messages: &[NormalizedMessage]) -> ClassifiedBatch {
        match self.batch.classify(messages).await {
            Ok(results) if results.len() == messages.len() => ClassifiedBatch {
                results,
                source: ClassificationSource::Remote,
            },
            Ok(results) => {
                warn!(
                    expected = messages.len(),
                    parsed = results.len(),
                    "Remote classification misaligned, using rule fallback"
                );
                self.fallback(messages)
            }
            Err(e) => {
                warn!(error = %e, "Remote classification failed, using rule fallback");
                self.fallback(messages)
            }
        }
    }

    fn fallback(&self, messages: &[NormalizedMessage]) -> ClassifiedBatch {
        ClassifiedBatch {
            results: self.rules.classify_all(messages),
            source: ClassificationSource::RuleFallback,
        }
    }

    /// Classify and assemble a report. An empty batch skips classification.
    pub async fn process(&self, messages: Vec<NormalizedMessage>) -> RunReport {
        if messages.is_empty() {
            info!("No messages in window, nothing to classify");
            return RunReport::empty();
        }

        let classified = self.classify_with_fallback(&messages).await;
        let records = assemble_records(&messages, &classified.results);

        info!(
            count = records.len(),
            source = ?classified.source,
            "Triage complete"
        );

        RunReport::new(records, Some(classified.source))
    }
}

/// Zip messages with their results. Both slices are in the same order.
pub fn assemble_records(
    messages: &[NormalizedMessage],
    results: &[ClassificationResult],
) -> Vec<OutputRecord> {
    messages
        .iter()
        .zip(results)
        .map(|(message, result)| OutputRecord::new(message, result))
        .collect()
}

// ── Fetch ───────────────────────────────────────────────────────────

/// Connect, fetch recent messages, close. Blocking.
///
/// Fails only when the initial connect fails; see [`MessageFetcher`] for how
/// later problems degrade.
pub fn fetch_with<C: Connector>(
    connector: C,
    credentials: Credentials,
    options: FetchOptions,
) -> std::result::Result<Vec<NormalizedMessage>, MailError> {
    let mut session = MailboxSession::connect(connector, credentials)?;
    let messages = MessageFetcher::new(options).fetch(&mut session);
    session.close();
    Ok(messages)
}

/// Run [`fetch_with`] on the blocking pool.
pub async fn fetch_recent<C>(
    connector: C,
    credentials: Credentials,
    options: FetchOptions,
) -> Result<Vec<NormalizedMessage>>
where
    C: Connector + 'static,
{
    let messages = tokio::task::spawn_blocking(move || fetch_with(connector, credentials, options))
        .await
        .map_err(|e| Error::Task(e.to_string()))??;
    Ok(messages)
}

/// Credentials for the configured mailbox.
pub fn credentials(config: &MailConfig) -> Credentials {
    Credentials::new(config.address.clone(), config.password.clone())
}

/// Full run against the configured IMAP server and classifier.
pub async fn run(config: &AppConfig) -> Result<RunReport> {
    let processor = TriageProcessor::from_config(&config.classifier)?;

    info!(
        host = %config.mail.imap_host,
        folder = %config.mail.folder,
        since_days = config.mail.since_days,
        "Starting triage run"
    );

    let messages = fetch_recent(
        ImapConnector::from_config(&config.mail),
        credentials(&config.mail),
        FetchOptions::from_config(&config.mail),
    )
    .await?;

    Ok(processor.process(messages).await)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason};
    use crate::pipeline::types::Category;

    /// Replies with a fixed text, or fails.
    struct MockLlm {
        reply: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, LlmError> {
            match &self.reply {
                Some(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 10,
                    output_tokens: 10,
                    finish_reason: FinishReason::Stop,
                }),
                None => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "connection refused".into(),
                }),
            }
        }
    }

    fn processor(reply: Option<&str>) -> TriageProcessor {
        TriageProcessor::new(Arc::new(MockLlm {
            reply: reply.map(str::to_string),
        }))
    }

    fn message(subject: &str, body: &str) -> NormalizedMessage {
        NormalizedMessage {
            sender: "Acme".into(),
            subject: subject.into(),
            date: "Mon, 12 Oct 2026 09:00:00 +0000".into(),
            body: body.into(),
        }
    }

    fn inbox() -> Vec<NormalizedMessage> {
        vec![
            message("Congratulations!", "We'd like to schedule an interview."),
            message("Update", "Unfortunately we went another way."),
            message("Newsletter", "Our weekly digest"),
        ]
    }

    #[tokio::test]
    async fn remote_results_used_when_complete() {
        let p = processor(Some(
            "Email 1: Category: Positive, Summary: Interview.\n\
             Email 2: Category: Negative, Summary: Declined.\n\
             Email 3: Category: Neutral, Summary: Digest.",
        ));
        let batch = p.classify_with_fallback(&inbox()).await;
        assert_eq!(batch.source, ClassificationSource::Remote);
        assert_eq!(batch.results[1].summary, "Declined.");
    }

    #[tokio::test]
    async fn remote_failure_falls_back() {
        let batch = processor(None).classify_with_fallback(&inbox()).await;
        assert_eq!(batch.source, ClassificationSource::RuleFallback);
        let categories: Vec<Category> = batch.results.iter().map(|r| r.category).collect();
        assert_eq!(
            categories,
            vec![Category::Positive, Category::Negative, Category::Neutral]
        );
    }

    #[tokio::test]
    async fn shortfall_reclassifies_whole_batch() {
        // Only one of three lines: remote summary must not leak through.
        let p = processor(Some("Email 1: Category: Negative, Summary: From the model."));
        let batch = p.classify_with_fallback(&inbox()).await;
        assert_eq!(batch.source, ClassificationSource::RuleFallback);
        assert_eq!(batch.results.len(), 3);
        assert_eq!(batch.results[0].category, Category::Positive);
        assert_ne!(batch.results[0].summary, "From the model.");
    }

    #[tokio::test]
    async fn length_and_order_preserved_for_any_size() {
        for n in 0..12 {
            let messages: Vec<NormalizedMessage> = (0..n)
                .map(|i| message(&format!("Subject {i}"), "Unfortunately no."))
                .collect();
            let batch = processor(None).classify_with_fallback(&messages).await;
            assert_eq!(batch.results.len(), n);
        }
    }

    #[tokio::test]
    async fn process_builds_records_in_order() {
        let report = processor(None).process(inbox()).await;
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[0].subject, "Congratulations!");
        assert_eq!(report.records[0].suggested_action, "Monitor");
        assert_eq!(report.records[1].category, Category::Negative);
        assert_eq!(report.source, Some(ClassificationSource::RuleFallback));
        assert_eq!(report.summary.count(Category::Positive), 1);
    }

    #[tokio::test]
    async fn process_empty_is_empty_report() {
        let report = processor(None).process(Vec::new()).await;
        assert!(report.is_empty());
        assert_eq!(report.source, None);
    }

    #[test]
    fn assemble_sets_suggested_action() {
        let records = assemble_records(
            &[message("Docs", "Please send documents")],
            &[ClassificationResult::new(Category::FollowUpNeeded, "Send docs")],
        );
        assert_eq!(records[0].suggested_action, "Follow up");
        assert_eq!(records[0].from, "Acme");
    }
}
