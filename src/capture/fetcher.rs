// HTTP stream fetcher - opens the media byte stream for one candidate
//
// Requests carry the web player's Origin/Referer pair, a ranged GET from
// byte 0 and, when the resolver produced one, the playback nonce.
// No retries here: fallback happens per candidate.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_LENGTH, ORIGIN, RANGE, REFERER,
    USER_AGENT,
};
use std::time::Duration;
use tokio_util::io::StreamReader;
use url::Url;

use super::errors::AttemptError;
use super::models::PlaybackContext;
use super::traits::{MediaStream, StreamFetcher};
use super::utils::{set_query_param, truncate};

/// Desktop browser user agent used when the resolution context has none
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

pub const DEFAULT_ORIGIN: &str = "https://www.youtube.com";

pub struct HttpStreamFetcher {
    client: reqwest::Client,
    origin: String,
}

impl HttpStreamFetcher {
    pub fn new(client: reqwest::Client, origin: impl Into<String>) -> Self {
        Self {
            client,
            origin: origin.into(),
        }
    }

    /// Build a client suitable for media streaming (no overall timeout, bounded connect)
    pub fn build_client(proxy: Option<&str>) -> Result<reqwest::Client, String> {
        let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(15));
        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| format!("Invalid proxy URL {}: {}", proxy_url, e))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))
    }

    /// URL with the CDN tracking parameters applied
    pub fn request_url(url: &str, context: &PlaybackContext) -> Result<Url, AttemptError> {
        let mut request_url = Url::parse(url)
            .map_err(|e| AttemptError::fetch(None, format!("invalid stream URL: {}", e)))?;

        if let Some(cpn) = &context.playback_nonce {
            set_query_param(&mut request_url, "cpn", cpn);
            set_query_param(&mut request_url, "rbuf", "0");
        }

        Ok(request_url)
    }

    /// Request headers for a streaming fetch
    pub fn request_headers(&self, context: &PlaybackContext) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("DNT", HeaderValue::from_static("?1"));
        headers.insert(RANGE, HeaderValue::from_static("bytes=0-"));

        if let Ok(origin) = HeaderValue::from_str(&self.origin) {
            headers.insert(ORIGIN, origin.clone());
            headers.insert(REFERER, origin);
        }

        let user_agent = context
            .user_agent
            .as_deref()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or(DEFAULT_USER_AGENT);
        let user_agent = HeaderValue::from_str(user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert(USER_AGENT, user_agent);

        headers
    }
}

#[async_trait]
impl StreamFetcher for HttpStreamFetcher {
    async fn open_stream(
        &self,
        url: &str,
        context: &PlaybackContext,
    ) -> Result<MediaStream, AttemptError> {
        let request_url = Self::request_url(url, context)?;

        let response = self
            .client
            .get(request_url.clone())
            .headers(self.request_headers(context))
            .send()
            .await
            .map_err(|e| AttemptError::fetch(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let response_headers: Vec<String> = response
                .headers()
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v.to_str().unwrap_or("<binary>")))
                .collect();
            let error_body = response.text().await.unwrap_or_default();
            let snippet = truncate(&error_body, 200);

            tracing::warn!(
                status = status.as_u16(),
                url = %request_url,
                headers = ?response_headers,
                body = %snippet,
                "stream request rejected"
            );

            return Err(AttemptError::fetch(
                Some(status.as_u16()),
                format!(
                    "{}{}",
                    status.canonical_reason().unwrap_or("non-success status"),
                    if snippet.is_empty() {
                        String::new()
                    } else {
                        format!(" - {}", snippet)
                    }
                ),
            ));
        }

        let declared_empty = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            == Some(0);
        if declared_empty {
            return Err(AttemptError::fetch(
                Some(status.as_u16()),
                "response carries no body",
            ));
        }

        tracing::debug!(status = status.as_u16(), url = %request_url, "stream opened");

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}
