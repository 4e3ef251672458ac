use log::{info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Instant;

use crate::api::{IdpApi, PromptTestRequest};
use crate::diff::values_match;
use crate::error::Result;
use crate::schema::{
    value_text, AttemptLogEntry, ComparisonRow, FailingPrompt, ImprovementResult, ScoredRow,
};
use crate::store::AttemptLog;
use crate::tester::{test_and_retrieve, PollSettings};

pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImproverSettings {
    /// Refinement requests allowed per prompt, duplicates included.
    pub max_attempts: usize,
    pub poll: PollSettings,
}

impl Default for ImproverSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll: PollSettings::default(),
        }
    }
}

/// The instruction sent to the prompt-test endpoint to obtain a rewritten prompt.
pub fn refinement_request(current_prompt: &str, actual: &Value, expected: &Value) -> String {
    format!(
        "This is my current prompt: *{}* It returns {} and I want it to return {}. \
         Make corrections to the prompt as needed and improve it so that you are able to \
         better extract that data. Please return the new prompt text.",
        current_prompt,
        value_text(actual),
        value_text(expected)
    )
}

/// Rewrites under-performing prompts through the IDP prompt-test endpoint.
///
/// The endpoint doubles as the rewriting model: submitting the refinement
/// request as a "prompt" yields the candidate prompt text as its result.
pub struct PromptImprover<'a, A: IdpApi + ?Sized> {
    api: &'a A,
    settings: ImproverSettings,
}

impl<'a, A: IdpApi + ?Sized> PromptImprover<'a, A> {
    pub fn new(api: &'a A, settings: ImproverSettings) -> Self {
        Self { api, settings }
    }

    /// Refines one failing prompt until its accuracy exceeds `threshold` or the
    /// attempt budget runs out.
    ///
    /// Candidates are verified against every comparison row sharing the
    /// datapoint name in `datapoints`. The returned prompt is the last candidate
    /// produced, whether or not it cleared the threshold.
    pub async fn improve<L>(
        &self,
        log: &mut L,
        failing: &FailingPrompt,
        datapoints: &[ScoredRow],
        threshold: f64,
    ) -> Result<ImprovementResult>
    where
        L: AttemptLog + ?Sized,
    {
        let prompt = &failing.prompt;
        let start = Instant::now();
        let view: Vec<&ComparisonRow> = datapoints
            .iter()
            .map(|s| &s.row)
            .filter(|r| r.datapoint_name == prompt.datapoint_name)
            .collect();

        let mut result = ImprovementResult {
            document: prompt.document_category.clone(),
            datapoint: prompt.datapoint_name.clone(),
            new_prompt: prompt.prompt.clone(),
            old_prompt: prompt.prompt.clone(),
            old_accuracy: failing.example.accuracy,
            new_accuracy: failing.example.accuracy,
            attempts: 0,
        };

        let Some(representative) = view.first().copied() else {
            warn!(
                "No comparison rows for datapoint '{}'; leaving its prompt unchanged",
                prompt.datapoint_name
            );
            return Ok(result);
        };

        let mut example_actual = failing.example.row.actual.clone();
        let example_expected = &failing.example.row.expected;
        let mut tried: HashSet<String> = HashSet::new();

        info!(
            "Improving prompt for '{}' / '{}' (accuracy {:.2})",
            prompt.document_category, prompt.datapoint_name, result.old_accuracy
        );

        while result.new_accuracy <= threshold && result.attempts < self.settings.max_attempts {
            result.attempts += 1;

            let request = PromptTestRequest::single(
                representative.loan.clone(),
                representative.page_range,
                prompt.datapoint_name.clone(),
                prompt.datapoint_type.clone(),
                refinement_request(&result.new_prompt, &example_actual, example_expected),
                prompt.use_visual_llm,
            );
            let Some((suggestion, refinement_id)) = self.run_test(&request).await? else {
                continue;
            };
            let Some(candidate) = suggestion.as_ref().map(value_text) else {
                warn!(
                    "No prompt suggestion returned for '{}' (attempt {})",
                    prompt.datapoint_name, result.attempts
                );
                continue;
            };

            if !tried.insert(candidate.clone()) {
                info!("LLM suggested a previously tried prompt. Skipping...");
                continue;
            }

            let mut matches = Vec::with_capacity(view.len());
            for row in &view {
                let request = PromptTestRequest::single(
                    row.loan.clone(),
                    row.page_range,
                    row.datapoint_name.clone(),
                    prompt.datapoint_type.clone(),
                    candidate.clone(),
                    prompt.use_visual_llm,
                );
                let (value, verification_id) = self
                    .run_test(&request)
                    .await?
                    .unwrap_or((None, String::new()));
                let value = value.unwrap_or(Value::Null);

                matches.push(values_match(&value, &row.expected));
                if row.loan == representative.loan {
                    example_actual = value.clone();
                }

                log.append(&AttemptLogEntry {
                    document: prompt.document_category.clone(),
                    datapoint: prompt.datapoint_name.clone(),
                    prompt: candidate.clone(),
                    new_value: value,
                    expected: row.expected.clone(),
                    refinement_test_id: refinement_id.clone(),
                    verification_test_id: verification_id,
                })?;
            }

            result.new_accuracy =
                matches.iter().filter(|m| **m).count() as f64 / matches.len() as f64;
            info!(
                "Attempt {} for '{}': accuracy {:.2}",
                result.attempts, prompt.datapoint_name, result.new_accuracy
            );
            if result.new_accuracy > result.old_accuracy {
                info!(
                    "LLM took {:.2} seconds to find a better prompt",
                    start.elapsed().as_secs_f64()
                );
            }
            result.new_prompt = candidate;
        }

        Ok(result)
    }

    /// Runs one prompt test; `Ok(None)` when it failed without ending the run.
    async fn run_test(
        &self,
        request: &PromptTestRequest,
    ) -> Result<Option<(Option<Value>, String)>> {
        match test_and_retrieve(self.api, request, self.settings.poll).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) if !e.is_fatal() => {
                warn!(
                    "Prompt test for loan {} failed: {}",
                    request.loan_number, e
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
