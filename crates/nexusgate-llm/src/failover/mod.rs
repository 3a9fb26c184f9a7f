//! Sequential retry and failover across candidates
//!
//! Attempts never overlap: one candidate is tried at a time, retried on the
//! same provider while retries remain, then abandoned for the next one.
//! Non-retriable upstream replies are handed back untouched so the caller can
//! forward them to the client.

mod backoff;
mod transport;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use nexusgate_config::FailoverConfig;
use tokio::time::Instant;

pub use backoff::{backoff_delay, backoff_delay_with_rng};
pub use transport::{HttpTransport, Transport, TransportError};

use crate::candidate::Candidate;
use crate::error::LlmError;
use crate::provider::UpstreamRequest;

/// `final_error` when the overall deadline runs out
pub const DEADLINE_EXCEEDED: &str = "failover deadline exceeded";

/// One failed attempt
#[derive(Debug, Clone)]
pub struct FailoverError {
    pub provider_id: String,
    pub provider_name: String,
    /// 1-based attempt number across the whole sequence
    pub attempt: u32,
    pub message: String,
    /// Upstream status when the upstream answered
    pub status_code: Option<u16>,
    pub retriable: bool,
    pub timestamp: SystemTime,
}

impl FailoverError {
    fn new(candidate: &Candidate, attempt: u32, message: String, status_code: Option<u16>, retriable: bool) -> Self {
        Self {
            provider_id: candidate.provider_id().to_owned(),
            provider_name: candidate.provider_name().to_owned(),
            attempt,
            message,
            status_code,
            retriable,
            timestamp: SystemTime::now(),
        }
    }

    fn summary(&self) -> String {
        format!("{}: {}", self.provider_id, self.message)
    }
}

/// Outcome of a failover sequence
#[derive(Debug)]
pub struct FailoverResult {
    pub success: bool,
    /// Successful reply, or the non-retriable reply to pass through
    pub response: Option<reqwest::Response>,
    /// Candidate that produced `response`
    pub candidate: Option<Candidate>,
    pub errors: Vec<FailoverError>,
    pub total_attempts: u32,
    pub final_error: Option<String>,
}

impl FailoverResult {
    fn failed(errors: Vec<FailoverError>, total_attempts: u32, final_error: String) -> Self {
        Self {
            success: false,
            response: None,
            candidate: None,
            errors,
            total_attempts,
            final_error: Some(final_error),
        }
    }

    /// Error for a sequence that ended without any reply to forward
    pub fn into_error(self) -> LlmError {
        LlmError::FailoverExhausted {
            attempts: self.total_attempts,
            summary: self.final_error.unwrap_or_else(|| "no candidates".to_owned()),
        }
    }
}

/// Runs upstream attempts under a [`FailoverConfig`]
#[derive(Clone)]
pub struct FailoverEngine {
    config: FailoverConfig,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for FailoverEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverEngine").field("config", &self.config).finish_non_exhaustive()
    }
}

impl FailoverEngine {
    pub fn new(config: FailoverConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub const fn config(&self) -> &FailoverConfig {
        &self.config
    }

    /// Try `candidates` in order until one answers 2xx
    ///
    /// `build` produces the outbound request for a candidate; a build failure
    /// ends the sequence. Dropping the returned future cancels the in-flight
    /// attempt or backoff sleep.
    pub async fn execute<F>(&self, candidates: &[Candidate], build: F) -> FailoverResult
    where
        F: Fn(&Candidate) -> Result<UpstreamRequest, LlmError>,
    {
        let deadline = self.config.total_timeout().map(|budget| Instant::now() + budget);
        let limit = self.config.max_provider_attempts.min(candidates.len());

        let mut errors = Vec::new();
        let mut total_attempts = 0u32;

        for candidate in &candidates[..limit] {
            for _ in 0..self.config.attempts_per_candidate() {
                if total_attempts > 0 {
                    let delay = backoff_delay(&self.config.backoff, total_attempts - 1);
                    if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                        return FailoverResult::failed(errors, total_attempts, DEADLINE_EXCEEDED.to_owned());
                    }
                    tracing::debug!(?delay, attempt = total_attempts + 1, "backing off before retry");
                    tokio::time::sleep(delay).await;
                }

                let attempt_timeout = match deadline {
                    Some(d) => {
                        let remaining = d.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            return FailoverResult::failed(errors, total_attempts, DEADLINE_EXCEEDED.to_owned());
                        }
                        remaining.min(self.config.attempt_timeout())
                    }
                    None => self.config.attempt_timeout(),
                };

                total_attempts += 1;

                let outcome = match build(candidate) {
                    Ok(request) => self.attempt(candidate, total_attempts, request, attempt_timeout).await,
                    Err(e) => {
                        tracing::warn!(provider = candidate.provider_id(), error = %e, "failed to build upstream request");
                        Attempt::Abort(FailoverError::new(candidate, total_attempts, e.to_string(), None, false))
                    }
                };

                match outcome {
                    Attempt::Success(response) => {
                        return FailoverResult {
                            success: true,
                            response: Some(response),
                            candidate: Some(candidate.clone()),
                            errors,
                            total_attempts,
                            final_error: None,
                        };
                    }
                    Attempt::Passthrough(response, error) => {
                        let summary = error.summary();
                        errors.push(error);
                        return FailoverResult {
                            success: false,
                            response: Some(response),
                            candidate: Some(candidate.clone()),
                            errors,
                            total_attempts,
                            final_error: Some(summary),
                        };
                    }
                    Attempt::Abort(error) => {
                        let summary = error.summary();
                        errors.push(error);
                        return FailoverResult::failed(errors, total_attempts, summary);
                    }
                    Attempt::Retry(error) => errors.push(error),
                }
            }
        }

        let final_error = errors
            .last()
            .map_or_else(|| "no candidates".to_owned(), FailoverError::summary);

        FailoverResult::failed(errors, total_attempts, final_error)
    }

    async fn attempt(&self, candidate: &Candidate, attempt: u32, request: UpstreamRequest, timeout: Duration) -> Attempt {
        let outcome = tokio::time::timeout(timeout, self.transport.send(request))
            .await
            .unwrap_or_else(|_| Err(TransportError::timeout(timeout)));

        match outcome {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(provider = candidate.provider_id(), attempt, "upstream attempt succeeded");
                Attempt::Success(response)
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let retriable = self.config.is_retriable_status(status);

                tracing::warn!(provider = candidate.provider_id(), attempt, status, retriable, "upstream attempt failed");

                let error = FailoverError::new(
                    candidate,
                    attempt,
                    format!("upstream returned {status}"),
                    Some(status),
                    retriable,
                );
                if retriable {
                    Attempt::Retry(error)
                } else {
                    Attempt::Passthrough(response, error)
                }
            }
            Err(e) => {
                let retriable = e.matches_any(&self.config.retriable_network_errors);

                tracing::warn!(
                    provider = candidate.provider_id(),
                    attempt,
                    code = %e.code,
                    error = %e.message,
                    retriable,
                    "upstream attempt failed"
                );

                let error = FailoverError::new(candidate, attempt, e.to_string(), None, retriable);
                if retriable {
                    Attempt::Retry(error)
                } else {
                    Attempt::Abort(error)
                }
            }
        }
    }
}

/// How one attempt ended
enum Attempt {
    Success(reqwest::Response),
    /// Non-retriable upstream reply, forwarded as is
    Passthrough(reqwest::Response, FailoverError),
    Retry(FailoverError),
    Abort(FailoverError),
}
