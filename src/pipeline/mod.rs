//! Classification pipeline.
//!
//! Fetched messages flow through:
//! 1. `BatchClassifier::classify()`: one remote request for the whole batch
//! 2. `RuleFallbackClassifier::classify_all()`: keyword rules, only when step 1 fails
//! 3. `assemble_records()`: messages and results zipped into output records
//!
//! The result list always matches the input in length and order.

pub mod batch;
pub mod processor;
pub mod rules;
pub mod types;
