use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tracing::{info_span, warn, Instrument};

const PROXY_VARS: [&str; 6] = [
    "HTTPS_PROXY",
    "https_proxy",
    "HTTP_PROXY",
    "http_proxy",
    "ALL_PROXY",
    "all_proxy",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

fn is_idempotent(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "GET" | "HEAD" | "PUT" | "DELETE" | "OPTIONS"
    )
}

/// Transport failures worth a second attempt over a direct connection. A
/// failed connect never reached the remote; a timeout may have, so only
/// idempotent methods are sent again after one.
pub fn classify_reqwest_error(err: &reqwest::Error, method: &str) -> RetryDisposition {
    if err.is_connect() || (err.is_timeout() && is_idempotent(method)) {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn proxy_env_present() -> bool {
    PROXY_VARS
        .iter()
        .any(|name| std::env::var(name).is_ok_and(|v| !v.trim().is_empty()))
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Explicit proxy URL. When unset, the environment proxy variables apply.
    pub proxy: Option<String>,
    /// Retry once without proxies when the proxied attempt fails in transport.
    pub direct_fallback: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(12),
            user_agent: Some(format!("shelfsync/{}", env!("CARGO_PKG_VERSION"))),
            proxy: None,
            direct_fallback: proxy_env_present(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{method} {url} failed: {source}")]
    Request {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// HTTP client with a bounded per-call timeout. Non-2xx responses
/// are returned as values; only transport failures become errors.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    direct: reqwest::Client,
    direct_fallback: bool,
}

impl HttpTransport {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        let mut direct_builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .no_proxy();

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
            direct_builder = direct_builder.user_agent(user_agent.clone());
        }
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy.as_str())
                    .with_context(|| format!("invalid proxy url {proxy}"))?,
            );
        }

        Ok(Self {
            client: builder.build().context("building reqwest client")?,
            direct: direct_builder
                .build()
                .context("building direct reqwest client")?,
            direct_fallback: config.direct_fallback,
        })
    }

    /// Sends the request built by `build`. When a proxy is configured and the
    /// first attempt fails in transport, the request is rebuilt and sent once
    /// more over a connection that ignores proxy settings.
    pub async fn execute<F>(
        &self,
        method: &str,
        url: &str,
        build: F,
    ) -> Result<HttpResponse, TransportError>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let span = info_span!("remote_call", method, url);
        async {
            let result = match send(build(&self.client)).await {
                Ok(response) => Ok(response),
                Err(err)
                    if self.direct_fallback
                        && classify_reqwest_error(&err, method) == RetryDisposition::Retryable =>
                {
                    warn!(error = %err, "proxied request failed, retrying direct");
                    send(build(&self.direct)).await
                }
                Err(err) => Err(err),
            };
            result.map_err(|source| TransportError::Request {
                method: method.to_string(),
                url: url.to_string(),
                source,
            })
        }
        .instrument(span)
        .await
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<HttpResponse, reqwest::Error> {
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.bytes().await?.to_vec();
    Ok(HttpResponse { status, body })
}
