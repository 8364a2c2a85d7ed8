//! HTTP client collaborator used by API-call steps.
//!
//! The executor never retries; retry policy lives here. `ReqwestHttpClient`
//! retries transport errors and 5xx responses with a linear backoff.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::HttpClientConfig;

/// How a request authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthType {
    Bearer,
    ApiKey,
    Basic,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bearer => "bearer",
            Self::ApiKey => "apiKey",
            Self::Basic => "basic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['_', '-'], "").as_str() {
            "bearer" | "oauth" | "oauth2" => Some(Self::Bearer),
            "apikey" => Some(Self::ApiKey),
            "basic" => Some(Self::Basic),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOptions {
    pub auth_type: AuthType,
    /// Token, API key, or `user:password` for basic auth.
    pub credential: String,
    /// Header for API-key auth; defaults to `X-API-Key`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestOptions {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Milliseconds. `None` means the client default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// `None` means the client default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponseMetadata {
    pub execution_time: u64,
    pub url: String,
    pub method: String,
    /// Retries actually performed.
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub success: bool,
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: HttpResponseMetadata,
}

impl HttpResponse {
    /// Response without a status (transport failure, invalid request).
    pub fn transport_failure(options: &HttpRequestOptions, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: 0,
            status_text: String::new(),
            headers: BTreeMap::new(),
            data: Value::Null,
            error: Some(error.into()),
            metadata: HttpResponseMetadata {
                execution_time: 0,
                url: options.url.clone(),
                method: options.method.clone(),
                retries: 0,
                final_url: None,
            },
        }
    }

    /// The object output-mapping paths traverse.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "status": self.status,
            "statusText": self.status_text,
            "headers": self.headers,
            "data": self.data,
            "url": self.url(),
        })
    }

    pub fn url(&self) -> &str {
        self.metadata
            .final_url
            .as_deref()
            .unwrap_or(&self.metadata.url)
    }
}

#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a request. Failures are reported in the response, never raised.
    async fn make_request(&self, options: HttpRequestOptions) -> HttpResponse;
}

/// `HttpClient` over a pooled `reqwest::Client`.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    config: HttpClientConfig,
}

impl ReqwestHttpClient {
    pub fn new(config: HttpClientConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(config.user_agent.clone())
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    fn build(
        &self,
        method: &reqwest::Method,
        options: &HttpRequestOptions,
        timeout: Duration,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method.clone(), &options.url)
            .timeout(timeout);

        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(auth) = &options.auth {
            builder = match auth.auth_type {
                AuthType::Bearer => builder.bearer_auth(&auth.credential),
                AuthType::ApiKey => builder.header(
                    auth.header_name.as_deref().unwrap_or("X-API-Key"),
                    auth.credential.as_str(),
                ),
                AuthType::Basic => match auth.credential.split_once(':') {
                    Some((user, pass)) => builder.basic_auth(user, Some(pass)),
                    None => builder.basic_auth(&auth.credential, None::<&str>),
                },
            };
        }

        if *method != reqwest::Method::GET && *method != reqwest::Method::HEAD {
            builder = match &options.body {
                Some(Value::String(text)) => builder.body(text.clone()),
                Some(Value::Null) | None => builder,
                Some(json) => builder.json(json),
            };
        }

        builder
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new(HttpClientConfig::default())
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn make_request(&self, options: HttpRequestOptions) -> HttpResponse {
        let method = match reqwest::Method::from_bytes(options.method.to_uppercase().as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                return HttpResponse::transport_failure(
                    &options,
                    format!("Invalid HTTP method: {}", options.method),
                )
            }
        };
        let timeout = Duration::from_millis(options.timeout.unwrap_or(self.config.default_timeout_ms));
        let max_retries = options.retries.unwrap_or(self.config.default_retries);
        let start = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let result = self.build(&method, &options, timeout).send().await;

            let retryable = match &result {
                Ok(resp) => resp.status().is_server_error(),
                Err(_) => true,
            };
            if retryable && attempt < max_retries {
                attempt += 1;
                tracing::warn!(
                    "[HttpClient] {} {} failed, retrying ({}/{})",
                    method,
                    options.url,
                    attempt,
                    max_retries
                );
                tokio::time::sleep(Duration::from_millis(
                    self.config.retry_backoff_ms * attempt as u64,
                ))
                .await;
                continue;
            }

            let metadata = |final_url: Option<String>| HttpResponseMetadata {
                execution_time: start.elapsed().as_millis() as u64,
                url: options.url.clone(),
                method: method.to_string(),
                retries: attempt,
                final_url,
            };

            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    let mut failed =
                        HttpResponse::transport_failure(&options, format!("HTTP request failed: {}", e));
                    failed.metadata = metadata(None);
                    return failed;
                }
            };

            let status = response.status();
            let final_url = response.url().to_string();
            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect();

            let text = match response.text().await {
                Ok(t) => t,
                Err(e) => {
                    let mut failed = HttpResponse::transport_failure(
                        &options,
                        format!("Failed to read response body: {}", e),
                    );
                    failed.status = status.as_u16();
                    failed.metadata = metadata(Some(final_url));
                    return failed;
                }
            };
            let data = if text.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            };

            let status_text = status.canonical_reason().unwrap_or_default().to_string();
            let success = status.is_success();
            let error = (!success).then(|| format!("API returned {} {}", status.as_u16(), status_text));

            tracing::debug!(
                "[HttpClient] {} {} → {} ({} retries)",
                method,
                options.url,
                status.as_u16(),
                attempt
            );

            return HttpResponse {
                success,
                status: status.as_u16(),
                status_text,
                headers,
                data,
                error,
                metadata: metadata(Some(final_url)),
            };
        }
    }
}
