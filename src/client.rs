//! HTTP client for the Readwise v2 and Reader v3 APIs.
//!
//! [`ReadwiseClient`] is async; [`blocking::ReadwiseClient`] wraps it for
//! callers without a runtime.
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::page::{paginate, Page, PageCursor};

pub mod blocking;
mod query;
mod v2;
mod v3;

pub use query::{BookQuery, DocumentQuery, ExportQuery, HighlightQuery};

pub const READWISE_API_V2_BASE: &str = "https://readwise.io/api/v2/";
pub const READWISE_API_V3_BASE: &str = "https://readwise.io/api/v3/";
pub const TOKEN_ENV_VAR: &str = "READWISE_API_KEY";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Boxed stream of items from a paged listing.
pub type ItemStream<T> = BoxStream<'static, Result<T>>;

#[derive(Clone)]
pub struct ClientOptions {
    pub token: String,
    pub v2_base: Url,
    pub v3_base: Url,
    pub timeout: Duration,
    pub max_retries: u32,
    pub user_agent: String,
}

impl ClientOptions {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            v2_base: Url::parse(READWISE_API_V2_BASE).expect("valid default v2 URL"),
            v3_base: Url::parse(READWISE_API_V3_BASE).expect("valid default v3 URL"),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            user_agent: concat!("readwise-sync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Read the token from `READWISE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        match std::env::var(TOKEN_ENV_VAR) {
            Ok(token) if !token.trim().is_empty() => Ok(Self::new(token)),
            _ => Err(ApiError::Validation(format!("{TOKEN_ENV_VAR} is not set"))),
        }
    }

    /// Point both APIs at another host, e.g. a mock server.
    pub fn with_base_urls(mut self, v2_base: &str, v3_base: &str) -> Result<Self> {
        self.v2_base = parse_base(v2_base)?;
        self.v3_base = parse_base(v3_base)?;
        Ok(self)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("v2_base", &self.v2_base.as_str())
            .field("v3_base", &self.v3_base.as_str())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Base URLs must end in `/` for `Url::join` to keep the version segment.
fn parse_base(raw: &str) -> Result<Url> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| ApiError::InvalidUrl(format!("{raw}: {e}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Api {
    V2,
    V3,
}

#[derive(Clone)]
pub struct ReadwiseClient {
    http: Client,
    v2_base: Url,
    v3_base: Url,
    token: String,
    max_retries: u32,
}

impl fmt::Debug for ReadwiseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadwiseClient")
            .field("v2_base", &self.v2_base.as_str())
            .field("v3_base", &self.v3_base.as_str())
            .finish_non_exhaustive()
    }
}

impl ReadwiseClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_options(ClientOptions::new(token))
    }

    pub fn with_options(options: ClientOptions) -> Result<Self> {
        if options.token.trim().is_empty() {
            return Err(ApiError::Validation("Readwise token must be non-empty".into()));
        }
        let http = Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .build()?;
        Ok(Self {
            http,
            v2_base: options.v2_base,
            v3_base: options.v3_base,
            token: options.token,
            max_retries: options.max_retries,
        })
    }

    pub(crate) fn url(&self, api: Api, path: &str) -> Result<Url> {
        let base = match api {
            Api::V2 => &self.v2_base,
            Api::V3 => &self.v3_base,
        };
        base.join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Send one request, retrying rate limits and server errors with
    /// exponential backoff. Only successful responses are returned.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Response> {
        let mut attempt: u32 = 0;
        loop {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, format!("Token {}", self.token));
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%method, path = url.path(), attempt, "sending readwise request");
            let err = match request.send().await {
                Ok(res) if res.status().is_success() => return Ok(res),
                Ok(res) => error_from_response(res, url.path()).await,
                Err(err) => ApiError::Transport(err),
            };

            if attempt >= self.max_retries || !err.is_retryable() {
                return Err(err);
            }
            let delay = retry_delay(&err, attempt);
            warn!(%err, attempt, delay_ms = delay.as_millis() as u64, "readwise request failed; retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<T> {
        let res = self.send(method, url, query, body).await?;
        let text = res.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        api: Api,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let url = self.url(api, path)?;
        self.send_json(Method::GET, url, query, None).await
    }

    /// Fetch one page of a listing. `E` is the page envelope of the API.
    pub(crate) async fn fetch_page<T, E>(
        &self,
        api: Api,
        path: &str,
        query: &[(String, String)],
        cursor: Option<PageCursor>,
    ) -> Result<Page<T>>
    where
        E: DeserializeOwned + Into<Page<T>> + Send,
    {
        let (url, params) = match cursor {
            // The next link already carries every filter.
            Some(PageCursor::Next(next)) => {
                let url = Url::parse(&next).map_err(|e| ApiError::InvalidUrl(format!("{next}: {e}")))?;
                (url, Vec::new())
            }
            Some(PageCursor::Opaque(token)) => {
                let mut params = query.to_vec();
                params.push(("pageCursor".to_string(), token));
                (self.url(api, path)?, params)
            }
            None => (self.url(api, path)?, query.to_vec()),
        };
        let envelope: E = self.send_json(Method::GET, url, &params, None).await?;
        let page: Page<T> = envelope.into();
        debug!(path, items = page.items.len(), has_next = page.next.is_some(), "fetched page");
        Ok(page)
    }

    pub(crate) fn stream_pages<T, E>(
        &self,
        api: Api,
        path: String,
        query: Vec<(String, String)>,
    ) -> ItemStream<T>
    where
        T: Send + 'static,
        E: DeserializeOwned + Into<Page<T>> + Send + 'static,
    {
        let client = self.clone();
        paginate(move |cursor| {
            let client = client.clone();
            let path = path.clone();
            let query = query.clone();
            async move { client.fetch_page::<T, E>(api, &path, &query, cursor).await }
        })
        .boxed()
    }
}

async fn error_from_response(res: Response, target: &str) -> ApiError {
    let status = res.status();
    let retry_after = parse_retry_after(res.headers());
    let body = res.text().await.unwrap_or_default();
    ApiError::from_status(status, body, target, retry_after)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// 1s, 2s, 4s ... capped at 30s; an explicit `Retry-After` wins.
fn retry_delay(err: &ApiError, attempt: u32) -> Duration {
    if let ApiError::RateLimited {
        retry_after: Some(wait),
    } = err
    {
        return (*wait).min(MAX_RETRY_DELAY);
    }
    let factor = 2u32.saturating_pow(attempt);
    INITIAL_RETRY_DELAY
        .checked_mul(factor)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn backoff_doubles_and_caps() {
        let err = ApiError::RateLimited { retry_after: None };
        assert_eq!(retry_delay(&err, 0), Duration::from_secs(1));
        assert_eq!(retry_delay(&err, 1), Duration::from_secs(2));
        assert_eq!(retry_delay(&err, 2), Duration::from_secs(4));
        assert_eq!(retry_delay(&err, 10), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(&err, 40), MAX_RETRY_DELAY);

        let err = ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(retry_delay(&err, 3), Duration::from_secs(7));
    }

    #[test]
    fn retry_after_header_parses_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn debug_hides_token() {
        let client = ReadwiseClient::new("secret-token").unwrap();
        let shown = format!("{client:?}");
        assert!(!shown.contains("secret-token"));
        assert!(shown.contains("readwise.io"));
        let shown = format!("{:?}", ClientOptions::new("secret-token"));
        assert!(!shown.contains("secret-token"));
    }

    #[test]
    fn base_urls_gain_trailing_slash() {
        let opts = ClientOptions::new("t")
            .with_base_urls("http://127.0.0.1:9000/api/v2", "http://127.0.0.1:9000/api/v3/")
            .unwrap();
        let client = ReadwiseClient::with_options(opts).unwrap();
        assert_eq!(
            client.url(Api::V2, "highlights/").unwrap().as_str(),
            "http://127.0.0.1:9000/api/v2/highlights/"
        );
        assert_eq!(
            client.url(Api::V3, "list/").unwrap().as_str(),
            "http://127.0.0.1:9000/api/v3/list/"
        );
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(matches!(
            ReadwiseClient::new("  "),
            Err(ApiError::Validation(_))
        ));
    }
}
