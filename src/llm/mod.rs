//! LLM integration for inbox-triage.
//!
//! One backend: OpenRouter's OpenAI-compatible chat completions endpoint,
//! behind the `LlmProvider` trait so the classifier can be tested offline.

pub mod openrouter;
pub mod provider;

pub use openrouter::OpenRouterProvider;
pub use provider::*;

use std::sync::Arc;

use crate::config::ClassifierConfig;
use crate::error::LlmError;

/// Create an LLM provider from configuration.
pub fn create_provider(config: &ClassifierConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenRouterProvider::new(config)?;
    tracing::info!("Using OpenRouter (model: {})", config.model);
    Ok(Arc::new(provider))
}
