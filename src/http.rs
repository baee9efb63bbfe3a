use std::thread;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

const BODY_PREVIEW_CHARS: usize = 240;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum FetchFailure {
    #[error("HTTP status {status}{}", preview_suffix(.body))]
    Status { status: u16, body: String },
    #[error("transport error after {attempts} attempt(s): {detail}")]
    Transport { attempts: usize, detail: String },
    #[error("response is not valid JSON: {0}")]
    MalformedJson(String),
}

impl FetchFailure {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => is_retryable_status(*status),
            Self::Transport { .. } => true,
            Self::MalformedJson(_) => false,
        }
    }
}

fn preview_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" ({body})")
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

/// Timeouts and retry budget for one logical request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(8),
            attempts: 3,
            retry_delay: Duration::from_millis(400),
        }
    }
}

pub(crate) fn get_text_with_retries(
    url: &str,
    query: &[(String, String)],
    policy: RetryPolicy,
) -> Result<String, FetchFailure> {
    let attempts = policy.attempts.max(1);
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(policy.connect_timeout)
        .timeout_read(policy.read_timeout)
        .timeout_write(policy.read_timeout)
        .build();

    let mut attempt = 1;
    loop {
        let mut request = agent.get(url).set("Accept", "application/json");
        for (key, value) in query {
            request = request.query(key, value);
        }

        let failure = match request.call() {
            Ok(response) => {
                return response.into_string().map_err(|err| FetchFailure::Transport {
                    attempts: attempt,
                    detail: format!("response decode failed: {err}"),
                });
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                FetchFailure::Status {
                    status,
                    body: body.trim().chars().take(BODY_PREVIEW_CHARS).collect(),
                }
            }
            Err(ureq::Error::Transport(err)) => FetchFailure::Transport {
                attempts: attempt,
                detail: err.to_string(),
            },
        };

        if failure.is_retryable() && attempt < attempts {
            tracing::debug!(%url, attempt, %failure, "retrying request");
            thread::sleep(policy.retry_delay);
            attempt += 1;
            continue;
        }
        return Err(failure);
    }
}

pub(crate) fn get_json_with_retries(
    url: &str,
    query: &[(String, String)],
    policy: RetryPolicy,
) -> Result<Value, FetchFailure> {
    let body = get_text_with_retries(url, query, policy)?;
    serde_json::from_str(&body).map_err(|err| FetchFailure::MalformedJson(err.to_string()))
}
