use log::{debug, warn};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::api::{IdpApi, PromptTestRequest};
use crate::error::{ErrorKind, PromptTunerError, Result};

/// How long to wait for a prompt test to produce its result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(5),
        }
    }
}

pub async fn submit_test<A>(api: &A, request: &PromptTestRequest) -> Result<String>
where
    A: IdpApi + ?Sized,
{
    api.submit_prompt_test(request).await
}

/// Null, empty and zero-like values carry no result.
fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Polls a prompt test until its `prompt-result` appears or `settings.timeout` passes.
///
/// Returns `Ok(None)` on timeout, and also when the result arrives without a
/// usable value for `datapoint_name`. Retryable failures are logged and polled
/// through; anything else is returned.
pub async fn poll_result<A>(
    api: &A,
    datapoint_name: &str,
    test_id: &str,
    settings: PollSettings,
) -> Result<Option<Value>>
where
    A: IdpApi + ?Sized,
{
    let start = Instant::now();

    loop {
        match api.fetch_prompt_test(test_id).await {
            Ok(body) => {
                if let Some(result) = body.get("prompt-result") {
                    return match result.get(datapoint_name) {
                        Some(value) if has_content(value) => Ok(Some(value.clone())),
                        _ => {
                            warn!(
                                "Key '{}' not found in result of prompt test {}",
                                datapoint_name, test_id
                            );
                            Ok(None)
                        }
                    };
                }
                debug!("Waiting for 'prompt-result' of prompt test {}", test_id);
            }
            Err(e) if e.kind() == ErrorKind::Retryable => {
                warn!("Polling prompt test {} failed: {}", test_id, e);
            }
            Err(e) => return Err(e),
        }

        if start.elapsed() > settings.timeout {
            warn!(
                "Timed out after {:?} waiting for 'prompt-result' of prompt test {}",
                settings.timeout, test_id
            );
            return Ok(None);
        }

        sleep(settings.interval).await;
    }
}

/// Submits a prompt test and waits for the value of its datapoint.
pub async fn test_and_retrieve<A>(
    api: &A,
    request: &PromptTestRequest,
    settings: PollSettings,
) -> Result<(Option<Value>, String)>
where
    A: IdpApi + ?Sized,
{
    let datapoint_name = request
        .datapoint_name()
        .ok_or_else(|| PromptTunerError::missing("prompts", "prompt test request"))?
        .to_string();

    let test_id = submit_test(api, request).await?;
    let value = poll_result(api, &datapoint_name, &test_id, settings).await?;
    Ok((value, test_id))
}
