use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::errors::ProviderError;
use crate::providers::{TranslationProvider, TranslationRequest};
use crate::translation::retry::RetryPolicy;

/// Public endpoint of the translation API
pub const DEFAULT_ENDPOINT: &str = "https://translate.yandex.net/api/v1.5/tr.json/translate";

/// Client for the query-parameter translation API
#[derive(Debug, Clone)]
pub struct YandexClient {
    /// Endpoint URL, without query string
    endpoint: Url,
    /// Pooled HTTP client shared by all calls
    client: Client,
    /// Retry policy for transport failures
    retry: RetryPolicy,
}

/// Timeouts applied to every attempt
///
/// `request` bounds one attempt end to end. A message can wait up to
/// `attempts * request` per credential, so twice that when the fallback
/// credential is tried: 120 s with the defaults.
#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    /// TCP connect timeout
    pub connect: Duration,
    /// Whole attempt timeout, covering TLS handshake and response headers
    pub request: Duration,
    /// TCP keep-alive interval
    pub keep_alive: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(20),
            keep_alive: Duration::from_secs(10),
        }
    }
}

/// Successful response body
#[derive(Debug, Deserialize)]
pub struct TranslateResponse {
    /// Status code reported by the API
    pub code: i32,
    /// Language pair the API used
    #[serde(default)]
    pub lang: String,
    /// Translated fragments, the first one is the translation
    #[serde(default)]
    pub text: Vec<String>,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: String,
}

impl YandexClient {
    /// Create a client for `endpoint`
    pub fn new(endpoint: &str, timeouts: ClientTimeouts, retry: RetryPolicy) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ProviderError::ConnectionError(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .tcp_keepalive(timeouts.keep_alive)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            client,
            retry,
        })
    }

    /// Build the request URL for one call
    pub fn request_url(&self, request: &TranslationRequest) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("key", &request.api_key)
            .append_pair("lang", &request.language.to_string())
            .append_pair("text", &request.text);
        url
    }

    /// Extract the translation from a decoded response
    pub fn extract_text(response: TranslateResponse) -> Result<String, ProviderError> {
        if response.code != 200 {
            return Err(ProviderError::ApiError {
                status_code: u16::try_from(response.code).unwrap_or_default(),
                message: format!("unexpected response code for pair '{}'", response.lang),
            });
        }

        response.text.into_iter().next().ok_or(ProviderError::EmptyTranslation)
    }
}

#[async_trait]
impl TranslationProvider for YandexClient {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, ProviderError> {
        let url = self.request_url(request);

        let response = self
            .retry
            .run(|attempt| {
                debug!("Translation request attempt {} for pair {}", attempt, request.language);
                let pending = self.client.post(url.clone()).send();
                // The URL carries the API key, keep it out of error messages.
                async move { pending.await.map_err(|e| e.without_url()) }
            })
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Translation API error ({}): {}", status, message);
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<TranslateResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.without_url().to_string()))?;

        Self::extract_text(body)
    }
}
