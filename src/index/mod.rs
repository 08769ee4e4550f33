//! CDX index client.
//!
//! Looks up prior captures of a URI with a given payload digest in a
//! Wayback-style CDX server. Each lookup is one blocking GET, retried with
//! exponential backoff:
//!
//! - Network errors and timeouts: retry
//! - Status outside the accepted set, or body too short: retry
//! - Status in the fail set (403, 404, 414): stop, keep the body
//!
//! The caller gets the last response either way and decides what it means
//! through [`IndexResponse::interpret`].

mod response;
mod retry;
mod transport;

pub use response::{
    CDX_TIMESTAMP_FORMAT, IndexFailure, IndexHit, IndexOutcome, IndexResponse, parse_cdx_line,
};
pub use retry::{AttemptOutcome, MAX_TIMEOUT, RetryPolicy, RetrySettings};
#[cfg(test)]
pub use transport::MockTransport;
pub use transport::{HttpTransport, IndexTransport, TransportError, TransportResponse};

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;
use url::Url;

/// Default CDX lookup endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://wwwb-dedup.us.archive.org:8083/cdx/search";

/// Index section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexSettings {
    /// Whether external lookups run at all.
    pub enabled: Option<bool>,
    /// CDX search endpoint.
    pub endpoint: Option<String>,
    /// Retry settings.
    pub retry: Option<RetrySettings>,
}

/// Blocking CDX client with retry.
///
/// # Example
///
/// ```rust,ignore
/// use warcdedup::index::{IndexClient, HttpTransport, RetryPolicy, DEFAULT_ENDPOINT};
///
/// let transport = Box::new(HttpTransport::new()?);
/// let client = IndexClient::new(DEFAULT_ENDPOINT, RetryPolicy::default(), transport)?;
/// let response = client.query("http://example.com/", "sha1:ABC", before);
/// println!("{:?}", response.interpret());
/// ```
pub struct IndexClient {
    endpoint: Url,
    policy: RetryPolicy,
    transport: Box<dyn IndexTransport>,
}

impl IndexClient {
    /// Creates a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the endpoint is not an absolute URL.
    pub fn new(
        endpoint: &str,
        policy: RetryPolicy,
        transport: Box<dyn IndexTransport>,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::InvalidInput(format!("index endpoint {endpoint:?}: {e}")))?;
        Ok(Self {
            endpoint,
            policy,
            transport,
        })
    }

    /// Creates a client using the `reqwest` transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is invalid or the HTTP client cannot be built.
    pub fn http(endpoint: &str, policy: RetryPolicy) -> Result<Self> {
        Self::new(endpoint, policy, Box::new(HttpTransport::new()?))
    }

    /// The retry policy in use.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Builds the lookup URL for a capture.
    ///
    /// `before` is exclusive: the service is asked for captures up to one
    /// second earlier. The digest's algorithm prefix is stripped, and
    /// revisit entries are filtered out so matches always point at content.
    #[must_use]
    pub fn query_url(&self, target_uri: &str, digest: &str, before: DateTime<Utc>) -> String {
        let upper = before - chrono::Duration::seconds(1);
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("url", target_uri)
            .append_pair("limit", "1")
            .append_pair("filter", &format!("digest:{}", digest_value(digest)))
            .append_pair("fl", "timestamp,original")
            .append_pair("to", &upper.format(CDX_TIMESTAMP_FORMAT).to_string())
            .append_pair("filter", "!mimetype:warc/revisit");
        url.into()
    }

    /// Queries the index, retrying per the policy.
    ///
    /// Never fails: exhausting attempts yields `success == false` with the
    /// last body received, or an empty body if nothing ever arrived.
    #[instrument(skip(self), fields(operation = "index_query"))]
    pub fn query(&self, target_uri: &str, digest: &str, before: DateTime<Utc>) -> IndexResponse {
        let url = self.query_url(target_uri, digest, before);
        let max_attempts = self.policy.max_attempts.max(1);
        let timeout = self.policy.effective_timeout();
        let mut last = None;

        for attempt in 1..=max_attempts {
            match self.transport.get(&url, timeout) {
                Ok(response) => {
                    let outcome = self.policy.classify(response.status, &response.body);
                    metrics::counter!(
                        "warcdedup_index_attempts_total",
                        "outcome" => outcome.label()
                    )
                    .increment(1);
                    match outcome {
                        AttemptOutcome::Success => {
                            tracing::debug!(
                                attempt,
                                url = %response.final_url,
                                "Index lookup succeeded"
                            );
                            return into_response(true, response, attempt);
                        },
                        AttemptOutcome::PermanentFailure => {
                            tracing::debug!(
                                attempt,
                                status = response.status,
                                "Index lookup failed permanently"
                            );
                            return into_response(false, response, attempt);
                        },
                        AttemptOutcome::Retryable(reason) => {
                            tracing::warn!(
                                attempt,
                                max_attempts,
                                %reason,
                                "Index lookup will be retried"
                            );
                            last = Some(response);
                        },
                    }
                },
                Err(e) => {
                    metrics::counter!(
                        "warcdedup_index_attempts_total",
                        "outcome" => e.kind()
                    )
                    .increment(1);
                    tracing::warn!(attempt, max_attempts, error = %e, "Index request failed");
                },
            }

            if attempt < max_attempts {
                std::thread::sleep(self.policy.delay_for_attempt(attempt));
            }
        }

        last.map_or_else(
            || IndexResponse::no_response(url.clone(), max_attempts),
            |response| into_response(false, response, max_attempts),
        )
    }
}

fn into_response(success: bool, response: TransportResponse, attempts: u32) -> IndexResponse {
    IndexResponse {
        success,
        status: Some(response.status),
        text: response.body,
        final_url: response.final_url,
        attempts,
    }
}

/// Strips the algorithm prefix from a digest (`sha1:ABC` becomes `ABC`).
#[must_use]
pub fn digest_value(digest: &str) -> &str {
    digest.split_once(':').map_or(digest, |(_, value)| value)
}
