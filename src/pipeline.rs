use chrono::Utc;
use log::{info, warn};
use std::fmt::Display;
use std::io::{BufRead, Write};

use crate::api::IdpApi;
use crate::auth::ensure_token;
use crate::catalog::{
    attach_category_uids, categories_to_query, merge_prompts, retrieve_prompts, select_failing,
};
use crate::config::TunerConfig;
use crate::diff::{aggregate_accuracy, compare_loan};
use crate::error::Result;
use crate::fetcher::{download_extraction, load_or_download_categories};
use crate::improver::PromptImprover;
use crate::report::{read_loans, write_improvements, write_prompt_report};
use crate::schema::{ComparisonRow, ImprovementResult, Loan, PromptAccuracyRow, ScoredRow};
use crate::store::{AttemptLog, TokenStore};
use crate::threshold::read_threshold;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub loans_processed: usize,
    pub loans_skipped: usize,
    pub comparison_rows: usize,
    pub prompt_rows: usize,
    pub failing_prompts: usize,
    pub threshold: f64,
    pub improvements: Vec<ImprovementResult>,
}

/// Turns a non-fatal failure of one loan, category or prompt into a skip.
fn skip_item<T>(result: Result<T>, item: impl Display) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if !e.is_fatal() => {
            warn!("Skipping {}: {}", item, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// One end-to-end tuning run: measure every prompt, then rewrite the weak ones.
pub struct Pipeline<A: IdpApi, S: TokenStore, L: AttemptLog> {
    config: TunerConfig,
    api: A,
    tokens: S,
    log: L,
}

impl<A: IdpApi, S: TokenStore, L: AttemptLog> Pipeline<A, S, L> {
    pub fn new(config: TunerConfig, api: A, tokens: S, log: L) -> Self {
        Self {
            config,
            api,
            tokens,
            log,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Runs every step; `input`/`output` are only used when no threshold is configured.
    pub async fn run<R, W>(&mut self, input: &mut R, output: &mut W) -> Result<RunSummary>
    where
        R: BufRead,
        W: Write,
    {
        self.config.validate()?;
        let mut summary = RunSummary::default();

        let token = ensure_token(
            &self.api,
            &self.tokens,
            &self.config.credentials,
            Utc::now(),
        )
        .await?;
        self.api.set_token(&token.value);

        let loans = read_loans(&self.config.loans_path)?;
        let catalog = load_or_download_categories(&self.api, &self.config.categories_path).await?;

        let mut rows = Vec::new();
        for loan in &loans {
            match skip_item(self.process_loan(loan).await, format!("loan {}", loan.loan_number))? {
                Some(loan_rows) => {
                    summary.loans_processed += 1;
                    rows.extend(loan_rows);
                }
                None => summary.loans_skipped += 1,
            }
        }
        summary.comparison_rows = rows.len();
        info!(
            "Compared {} datapoints across {} loans ({} skipped)",
            rows.len(),
            summary.loans_processed,
            summary.loans_skipped
        );

        let mut scored = aggregate_accuracy(rows);
        attach_category_uids(&mut scored, &catalog);

        let merged = self.collect_prompts(&scored).await?;
        summary.prompt_rows = merged.len();
        write_prompt_report(&self.config.prompts_report_path, &merged)?;

        let threshold = match self.config.threshold {
            Some(threshold) => threshold,
            None => read_threshold(input, output)?,
        };
        summary.threshold = threshold;

        let failing = select_failing(&merged, threshold);
        summary.failing_prompts = failing.len();

        let improver = PromptImprover::new(&self.api, self.config.improver);
        for prompt in &failing {
            let outcome = improver
                .improve(&mut self.log, prompt, &scored, threshold)
                .await;
            let item = format!(
                "prompt '{}' / '{}'",
                prompt.prompt.document_category, prompt.prompt.datapoint_name
            );
            if let Some(result) = skip_item(outcome, item)? {
                summary.improvements.push(result);
            }
        }

        write_improvements(&self.config.improvements_path, &summary.improvements)?;
        info!(
            "Processed {} failing prompts; results in {}",
            summary.improvements.len(),
            self.config.improvements_path.display()
        );

        Ok(summary)
    }

    async fn process_loan(&self, loan: &Loan) -> Result<Vec<ComparisonRow>> {
        let actual_path = self.config.actual_path(&loan.loan_number);
        let expected_path = self.config.expected_path(&loan.loan_number);

        download_extraction(&self.api, &loan.upload_id, &actual_path).await?;
        compare_loan(&loan.loan_number, &actual_path, &expected_path)
    }

    async fn collect_prompts(&self, scored: &[ScoredRow]) -> Result<Vec<PromptAccuracyRow>> {
        let mut prompts = Vec::new();
        for (category, uid) in categories_to_query(scored) {
            let fetched = retrieve_prompts(&self.api, &category, &uid).await;
            if let Some(entries) = skip_item(fetched, format!("prompts of category '{}'", category))? {
                prompts.extend(entries);
            }
        }
        Ok(merge_prompts(&prompts, scored))
    }
}
