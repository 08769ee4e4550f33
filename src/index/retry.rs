//! Retry policy and response classification for index lookups.

use serde::Deserialize;
use std::time::Duration;

/// Upper bound for a single request timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

/// Retry and backoff settings for the CDX index client.
///
/// Delay before retry `n` (1-based, counting failed attempts so far) is
/// `base_delay * multiplier^(n - 1)`. No delay follows the last attempt.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use warcdedup::RetryPolicy;
///
/// let policy = RetryPolicy {
///     base_delay: Duration::from_millis(1000),
///     ..RetryPolicy::default()
/// };
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1300));
/// assert_eq!(policy.schedule().len(), 9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Growth factor applied per further failure.
    pub multiplier: f64,
    /// Per-request timeout, clamped to [`MAX_TIMEOUT`].
    pub timeout: Duration,
    /// Bodies shorter than this are treated as transient failures.
    pub min_body_length: usize,
    /// Statuses that count as success.
    pub accepted_statuses: Vec<u16>,
    /// Statuses that stop retrying and return the body as-is.
    pub fail_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            multiplier: 1.3,
            timeout: Duration::from_secs(60),
            min_body_length: 0,
            accepted_statuses: vec![200],
            fail_statuses: vec![403, 404, 414],
        }
    }
}

/// Retry section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrySettings {
    /// Total attempts.
    pub max_attempts: Option<u32>,
    /// Base delay in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Backoff multiplier.
    pub multiplier: Option<f64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Minimum accepted body length.
    pub min_body_length: Option<usize>,
    /// Success statuses.
    pub accepted_statuses: Option<Vec<u16>>,
    /// Permanent-failure statuses.
    pub fail_statuses: Option<Vec<u16>>,
}

impl RetryPolicy {
    /// Builds a policy from config settings, falling back to defaults.
    #[must_use]
    pub fn from_settings(settings: Option<&RetrySettings>) -> Self {
        let mut policy = Self::default();
        let Some(settings) = settings else {
            return policy;
        };
        if let Some(max_attempts) = settings.max_attempts {
            policy.max_attempts = max_attempts.max(1);
        }
        if let Some(base_delay_ms) = settings.base_delay_ms {
            policy.base_delay = Duration::from_millis(base_delay_ms);
        }
        if let Some(multiplier) = settings.multiplier {
            policy.multiplier = multiplier.max(1.0);
        }
        if let Some(timeout_secs) = settings.timeout_secs {
            policy.timeout = Duration::from_secs(timeout_secs);
        }
        if let Some(min_body_length) = settings.min_body_length {
            policy.min_body_length = min_body_length;
        }
        if let Some(ref statuses) = settings.accepted_statuses {
            policy.accepted_statuses.clone_from(statuses);
        }
        if let Some(ref statuses) = settings.fail_statuses {
            policy.fail_statuses.clone_from(statuses);
        }
        policy
    }

    /// Sleep before the retry that follows failed attempt `attempt` (1-based).
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )] // Bounded by MAX_TIMEOUT before the cast back to integer nanos
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        let nanos = (self.base_delay.as_nanos() as f64 * factor).round();
        if nanos.is_finite() && nanos >= 0.0 && nanos < MAX_TIMEOUT.as_nanos() as f64 {
            Duration::from_nanos(nanos as u64)
        } else {
            MAX_TIMEOUT
        }
    }

    /// All sleeps a fully failing lookup goes through, in order.
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .map(|attempt| self.delay_for_attempt(attempt))
            .collect()
    }

    /// Request timeout after clamping.
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.min(MAX_TIMEOUT)
    }

    /// Classifies a response that arrived over the wire.
    #[must_use]
    pub fn classify(&self, status: u16, body: &str) -> AttemptOutcome {
        if self.fail_statuses.contains(&status) {
            return AttemptOutcome::PermanentFailure;
        }
        if body.len() < self.min_body_length {
            return AttemptOutcome::Retryable(format!(
                "body of {} bytes is shorter than {}",
                body.len(),
                self.min_body_length
            ));
        }
        if self.accepted_statuses.contains(&status) {
            AttemptOutcome::Success
        } else {
            AttemptOutcome::Retryable(format!("unexpected status {status}"))
        }
    }
}

/// What to do with a single attempt's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Accepted status and long-enough body.
    Success,
    /// Status in the permanent-fail set; return immediately.
    PermanentFailure,
    /// Try again after backoff.
    Retryable(String),
}

impl AttemptOutcome {
    /// Metric label for this outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PermanentFailure => "permanent_failure",
            Self::Retryable(_) => "retryable",
        }
    }
}
