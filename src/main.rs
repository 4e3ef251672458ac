use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tracing_subscriber::EnvFilter;

use extraction_prompt_tuner::{
    Credentials, FileAttemptLog, FileTokenStore, IdpClient, Pipeline, TunerConfig,
};

const CREDENTIALS_FILE: &str = "creds.env";

#[derive(Parser, Debug)]
#[command(
    name = "prompt-tuner",
    version,
    about = "Measure IDP extraction accuracy per datapoint and rewrite the weak prompts"
)]
struct Cli {
    /// IDP API root, e.g. https://idp.example.com/v2
    #[arg(long = "idp-url", env = "idp_url")]
    idp_url: String,
    #[arg(long, env = "email")]
    email: String,
    #[arg(long, env = "password", hide_env_values = true)]
    password: String,

    /// Directory the default file locations are resolved against
    #[arg(long, default_value = ".")]
    workdir: PathBuf,
    #[arg(long)]
    loans: Option<PathBuf>,
    #[arg(long)]
    categories: Option<PathBuf>,
    #[arg(long = "token-cache")]
    token_cache: Option<PathBuf>,
    #[arg(long = "actual-dir")]
    actual_dir: Option<PathBuf>,
    #[arg(long = "expected-dir")]
    expected_dir: Option<PathBuf>,
    #[arg(long = "prompts-out")]
    prompts_out: Option<PathBuf>,
    #[arg(long = "improvements-out")]
    improvements_out: Option<PathBuf>,
    #[arg(long = "attempt-log")]
    attempt_log: Option<PathBuf>,

    /// Accuracy at or below which a prompt is rewritten; asked for when omitted
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long = "max-attempts")]
    max_attempts: Option<usize>,
    /// Seconds to wait for one prompt test result
    #[arg(long = "poll-timeout")]
    poll_timeout: Option<u64>,
    /// Seconds between prompt test polls
    #[arg(long = "poll-interval")]
    poll_interval: Option<u64>,
    /// Seconds before a single HTTP request is abandoned
    #[arg(long = "http-timeout")]
    http_timeout: Option<u64>,
}

impl Cli {
    fn into_config(self) -> TunerConfig {
        let mut config = TunerConfig::new(
            self.idp_url,
            Credentials {
                email: self.email,
                password: self.password,
            },
        );

        let overrides = [
            (&mut config.loans_path, self.loans),
            (&mut config.categories_path, self.categories),
            (&mut config.token_cache_path, self.token_cache),
            (&mut config.actual_dir, self.actual_dir),
            (&mut config.expected_dir, self.expected_dir),
            (&mut config.prompts_report_path, self.prompts_out),
            (&mut config.improvements_path, self.improvements_out),
            (&mut config.attempt_log_path, self.attempt_log),
        ];
        for (slot, value) in overrides {
            if let Some(path) = value {
                *slot = path;
            }
        }

        config.threshold = self.threshold;
        if let Some(max_attempts) = self.max_attempts {
            config.improver.max_attempts = max_attempts;
        }
        if let Some(secs) = self.poll_timeout {
            config.improver.poll.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.poll_interval {
            config.improver.poll.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.http_timeout {
            config.http_timeout = Duration::from_secs(secs);
        }

        let workdir = self.workdir;
        config.rooted_at(&workdir)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::from_filename(CREDENTIALS_FILE).ok();
    init_tracing();
    info!("prompt-tuner v{}", env!("CARGO_PKG_VERSION"));

    let config = Cli::parse().into_config();
    config.validate().context("invalid configuration")?;

    let api = IdpClient::with_timeout(&config.base_url, config.http_timeout)
        .context("failed to build HTTP client")?;
    let tokens = FileTokenStore::new(&config.token_cache_path);
    let log = FileAttemptLog::new(&config.attempt_log_path);

    let mut pipeline = Pipeline::new(config, api, tokens, log);
    let summary = pipeline
        .run(&mut io::stdin().lock(), &mut io::stdout())
        .await
        .context("prompt tuning run failed")?;

    info!(
        "Done: {} loans compared ({} skipped), {} failing prompts, {} rewritten",
        summary.loans_processed,
        summary.loans_skipped,
        summary.failing_prompts,
        summary.improvements.len()
    );
    Ok(())
}
