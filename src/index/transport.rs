//! HTTP transport seam for index lookups.

use crate::{Error, Result};
use std::time::Duration;

/// A response that made it back over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded body text.
    pub body: String,
    /// URL after redirects.
    pub final_url: String,
}

/// Why a request produced no response at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request hit its timeout.
    Timeout(String),
    /// The connection could not be established.
    Connect(String),
    /// Anything else (TLS, body decoding, redirects, ...).
    Other(String),
}

impl TransportError {
    /// Metric / log label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Connect(_) => "connect",
            Self::Other(_) => "other",
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(msg) | Self::Connect(msg) | Self::Other(msg) => {
                write!(f, "{} error: {msg}", self.kind())
            },
        }
    }
}

/// Issues a single GET. Retries live above this trait.
///
/// Allows for different implementations (e.g., mock for testing).
pub trait IndexTransport: Send + Sync {
    /// Fetches `url`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no HTTP response was received.
    fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// Blocking `reqwest` transport.
pub struct HttpTransport {
    /// HTTP client with connection pooling.
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Connect timeout applied to every request.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a transport with a shared pooled client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(format!("warcdedup/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "build_http_client".to_string(),
                cause: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl IndexTransport for HttpTransport {
    fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().map_err(|e| classify_reqwest_error(&e))?;

        Ok(TransportResponse {
            status,
            body,
            final_url,
        })
    }
}

fn classify_reqwest_error(e: &reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

/// Scripted transport for tests.
#[cfg(test)]
pub struct MockTransport {
    responses: std::sync::Mutex<
        std::collections::VecDeque<std::result::Result<TransportResponse, TransportError>>,
    >,
    /// URLs requested, in order.
    pub requested: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockTransport {
    /// Creates a mock with queued results, returned front to back.
    pub fn new(
        responses: Vec<std::result::Result<TransportResponse, TransportError>>,
    ) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            requested: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A 200 response with `body`.
    pub fn ok(body: &str) -> std::result::Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: 200,
            body: body.to_string(),
            final_url: "http://index.test/cdx/search".to_string(),
        })
    }

    /// Number of requests made.
    pub fn request_count(&self) -> usize {
        self.requested.lock().expect("lock").len()
    }
}

#[cfg(test)]
impl IndexTransport for MockTransport {
    fn get(
        &self,
        url: &str,
        _timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError> {
        self.requested.lock().expect("lock").push(url.to_string());
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Timeout("no scripted response".to_string())))
    }
}
