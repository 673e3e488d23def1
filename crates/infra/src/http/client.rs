use std::sync::Arc;
use std::time::Duration;

use authgear_core::DPoPProvider;
use authgear_domain::{AuthgearError, HttpSettings, Result};
use reqwest::header::HeaderValue;
use reqwest::{Client as ReqwestClient, Method, Request, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use crate::errors::InfraError;

/// HTTP client with retry, timeout and DPoP support.
///
/// Only idempotent requests are retried. A token-endpoint POST is sent
/// exactly once so a rotating refresh token is never spent twice.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: usize,
    base_backoff: Duration,
    dpop: Option<Arc<dyn DPoPProvider>>,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute the provided request builder.
    ///
    /// A `DPoP` header is computed for every attempt, so retries never reuse
    /// a proof.
    ///
    /// # Errors
    /// `Network` for transport failures after the last attempt, `KeyStore`
    /// if the proof cannot be signed.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let mut attempts = self.max_attempts.max(1);

        for attempt in 0..self.max_attempts.max(1) {
            let cloned_builder = builder.try_clone().ok_or_else(|| {
                AuthgearError::Internal(
                    "request body cannot be cloned; buffer the body to enable retries".into(),
                )
            })?;

            let mut request = cloned_builder.build().map_err(InfraError::from)?;
            if !is_idempotent(request.method()) {
                attempts = 1;
            }
            self.attach_dpop(&mut request).await?;

            let method = request.method().clone();
            let url = request.url().clone();
            debug!(attempt = attempt + 1, %method, url = %htu(&url), "sending HTTP request");

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt = attempt + 1, %method, %status, "received HTTP response");

                    if status.is_server_error() && attempt + 1 < attempts {
                        self.sleep_with_backoff(attempt + 1).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt = attempt + 1, %method, error = %err, "HTTP request failed");

                    if attempt + 1 < attempts && should_retry_error(&err) {
                        self.sleep_with_backoff(attempt + 1).await;
                        continue;
                    }

                    return Err(InfraError::from(err).into());
                }
            }
        }

        Err(AuthgearError::Internal(
            "http client exhausted retries without producing a result".into(),
        ))
    }

    async fn attach_dpop(&self, request: &mut Request) -> Result<()> {
        let Some(dpop) = &self.dpop else {
            return Ok(());
        };
        let proof = dpop.proof(request.method().as_str(), &htu(request.url())).await?;
        let value = HeaderValue::from_str(&proof)
            .map_err(|e| AuthgearError::Internal(format!("invalid DPoP header value: {e}")))?;
        request.headers_mut().insert("DPoP", value);
        Ok(())
    }

    fn backoff_delay(&self, retry_number: usize) -> Duration {
        let shift = u32::try_from(retry_number.saturating_sub(1).min(8)).unwrap_or(8);
        let multiplier = 1u32 << shift;
        self.base_backoff.saturating_mul(multiplier)
    }

    async fn sleep_with_backoff(&self, retry_number: usize) {
        let delay = self.backoff_delay(retry_number);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: usize,
    base_backoff: Duration,
    user_agent: Option<String>,
    dpop: Option<Arc<dyn DPoPProvider>>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            user_agent: None,
            dpop: None,
        }
    }
}

impl HttpClientBuilder {
    /// Apply timeout, attempts and backoff from the SDK configuration.
    #[must_use]
    pub fn settings(self, settings: &HttpSettings) -> Self {
        self.timeout(Duration::from_secs(settings.timeout_secs))
            .max_attempts(settings.max_attempts)
            .base_backoff(Duration::from_millis(settings.backoff_ms))
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure the total number of attempts (initial try + retries).
    #[must_use]
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub const fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Sign a `DPoP` proof for every outgoing request.
    #[must_use]
    pub fn dpop(mut self, provider: Arc<dyn DPoPProvider>) -> Self {
        self.dpop = Some(provider);
        self
    }

    /// # Errors
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn build(self) -> Result<HttpClient> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder.build().map_err(InfraError::from)?;

        Ok(HttpClient {
            client,
            max_attempts: self.max_attempts.max(1),
            base_backoff: self.base_backoff,
            dpop: self.dpop,
        })
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::PUT | Method::DELETE)
}

/// The `htu` claim: the request URL without query and fragment.
fn htu(url: &Url) -> String {
    let mut target = url.clone();
    target.set_query(None);
    target.set_fragment(None);
    target.to_string()
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
