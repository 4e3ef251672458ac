//! # Extraction Prompt Tuner
//!
//! A library for measuring how accurately an Intelligent Document Processing (IDP)
//! service extracts loan datapoints, and for rewriting the prompts that fall short.
//!
//! ## Core Concepts
//!
//! - **Actual vs Expected**: Each loan's machine extraction is compared against a hand-verified one
//! - **Datapoint Accuracy**: The match rate of a datapoint name across every loan and category
//! - **Prompt Catalog**: The extraction prompts configured per document category on the IDP service
//! - **Refinement Loop**: The IDP prompt-test endpoint rewrites a failing prompt, and the
//!   candidate is re-tested on every loan carrying that datapoint until it clears the threshold
//!
//! ## Example
//!
//! ```rust,ignore
//! use extraction_prompt_tuner::*;
//!
//! let mut config = TunerConfig::new(
//!     "https://idp.example.com/v2",
//!     Credentials {
//!         email: "qa@lender.example".to_string(),
//!         password: "secret".to_string(),
//!     },
//! );
//! config.threshold = Some(0.85);
//!
//! let api = IdpClient::with_timeout(&config.base_url, config.http_timeout)?;
//! let tokens = FileTokenStore::new(&config.token_cache_path);
//! let log = FileAttemptLog::new(&config.attempt_log_path);
//!
//! let mut pipeline = Pipeline::new(config, api, tokens, log);
//! let summary = pipeline
//!     .run(&mut std::io::stdin().lock(), &mut std::io::stdout())
//!     .await?;
//! println!("{} prompts rewritten", summary.improvements.len());
//! ```

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod diff;
pub mod error;
pub mod fetcher;
pub mod improver;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod store;
pub mod tester;
pub mod threshold;

#[cfg(test)]
mod testing;

pub use api::{DataPoint, IdpApi, IdpClient, PromptSpec, PromptTestRequest};
pub use auth::{ensure_token, Credentials, TOKEN_LIFETIME_HOURS};
pub use catalog::{
    attach_category_uids, categories_to_query, merge_prompts, retrieve_prompts, select_failing,
};
pub use config::TunerConfig;
pub use diff::{aggregate_accuracy, compare_loan, flatten, load_extraction, values_match};
pub use error::{ErrorKind, PromptTunerError, Result};
pub use fetcher::{download_extraction, load_or_download_categories};
pub use improver::{refinement_request, ImproverSettings, PromptImprover, DEFAULT_MAX_ATTEMPTS};
pub use pipeline::{Pipeline, RunSummary};
pub use report::{read_loans, write_improvements, write_prompt_report};
pub use schema::*;
pub use store::{
    AttemptLog, FileAttemptLog, FileTokenStore, MemoryAttemptLog, MemoryTokenStore, TokenStore,
};
pub use tester::{poll_result, submit_test, test_and_retrieve, PollSettings};
pub use threshold::{parse_threshold, read_threshold};
