use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Credentials;
use crate::error::{PromptTunerError, Result};
use crate::improver::ImproverSettings;

/// Everything one tuning run needs to know.
#[derive(Debug, Clone)]
pub struct TunerConfig {
    /// IDP API root, e.g. `https://idp.example.com/v2`.
    pub base_url: String,
    pub credentials: Credentials,
    pub loans_path: PathBuf,
    pub categories_path: PathBuf,
    pub token_cache_path: PathBuf,
    /// Downloaded extractions land here as `{loan}.json`.
    pub actual_dir: PathBuf,
    /// Hand-verified extractions, also `{loan}.json`.
    pub expected_dir: PathBuf,
    pub prompts_report_path: PathBuf,
    pub improvements_path: PathBuf,
    pub attempt_log_path: PathBuf,
    /// Asked for interactively when `None`.
    pub threshold: Option<f64>,
    pub improver: ImproverSettings,
    pub http_timeout: Duration,
}

impl TunerConfig {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            loans_path: PathBuf::from("loans.csv"),
            categories_path: PathBuf::from("categories.json"),
            token_cache_path: PathBuf::from("auth_token.txt"),
            actual_dir: PathBuf::from("Extraction/Actual"),
            expected_dir: PathBuf::from("Extraction/Expected"),
            prompts_report_path: PathBuf::from("prompts.csv"),
            improvements_path: PathBuf::from("prompt_out.csv"),
            attempt_log_path: PathBuf::from("prompt_out.log"),
            threshold: None,
            improver: ImproverSettings::default(),
            http_timeout: Duration::from_secs(120),
        }
    }

    /// Places every default relative path under `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        for path in [
            &mut self.loans_path,
            &mut self.categories_path,
            &mut self.token_cache_path,
            &mut self.actual_dir,
            &mut self.expected_dir,
            &mut self.prompts_report_path,
            &mut self.improvements_path,
            &mut self.attempt_log_path,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        self
    }

    pub fn actual_path(&self, loan_number: &str) -> PathBuf {
        self.actual_dir.join(format!("{}.json", loan_number))
    }

    pub fn expected_path(&self, loan_number: &str) -> PathBuf {
        self.expected_dir.join(format!("{}.json", loan_number))
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(PromptTunerError::Config("IDP base URL is empty".to_string()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(PromptTunerError::Config(format!(
                "IDP base URL '{}' must start with http:// or https://",
                self.base_url
            )));
        }
        if self.credentials.email.is_empty() || self.credentials.password.is_empty() {
            return Err(PromptTunerError::Config(
                "email and password must both be set".to_string(),
            ));
        }
        if let Some(threshold) = self.threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(PromptTunerError::InvalidThreshold(threshold.to_string()));
            }
        }
        if self.improver.poll.interval.is_zero() {
            return Err(PromptTunerError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
