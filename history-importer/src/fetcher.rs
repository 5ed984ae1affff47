use crate::cache::ResponseCache;
use crate::transport::{HttpRequest, HttpTransport};
use crate::types::{ClientConfig, ImporterError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const TOKEN_PARAM: &str = "access_token";
const CACHE_PREFIX: &str = "fb_cached_";

static VERSION_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v\d+(\.\d+)?$").unwrap());

/// A Graph API call described without host, version or credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRequest {
    path: String,
    query: Vec<(String, String)>,
}

impl GraphRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into().trim_matches('/').to_string(),
            query: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Build a request from an absolute URL handed out by the API (e.g. a paging cursor).
    /// The version segment and any access token are dropped.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)?;
        let mut segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        if segments
            .first()
            .is_some_and(|first| VERSION_SEGMENT.is_match(first))
        {
            segments.remove(0);
        }

        let query = parsed
            .query_pairs()
            .filter(|(key, _)| key != TOKEN_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        Ok(Self {
            path: segments.join("/"),
            query,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Cache key: path plus the remaining query, with `/` flattened so it can be a file name.
    pub fn signature(&self) -> String {
        let mut key = self.path.clone();
        if !self.query.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.query.iter())
                .finish();
            key.push('?');
            key.push_str(&query);
        }
        format!("{}{}", CACHE_PREFIX, key.replace('/', "_"))
    }

    fn url(&self, config: &ClientConfig, token: &str) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/{}/{}",
            config.base_url.trim_end_matches('/'),
            config.api_version,
            self.path
        ))?;
        url.query_pairs_mut()
            .extend_pairs(self.query.iter())
            .append_pair(TOKEN_PARAM, token);
        Ok(url)
    }
}

/// Ordered access tokens and a cursor that only moves forward.
#[derive(Debug, Clone)]
pub struct TokenPool {
    tokens: Vec<String>,
    cursor: usize,
}

impl TokenPool {
    pub fn new(tokens: Vec<String>) -> Self {
        Self { tokens, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn current(&self) -> Option<&str> {
        self.tokens.get(self.cursor).map(String::as_str)
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Move to the next token. Returns false once the pool is used up.
    pub fn rotate(&mut self) -> bool {
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        self.cursor < self.tokens.len()
    }
}

/// Seconds between network calls so the whole pool stays under its hourly budget.
pub fn call_interval(pool_size: usize, hourly_limit: u32) -> Duration {
    let calls_per_hour = pool_size as f64 * hourly_limit as f64;
    if calls_per_hour <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(3600.0 / calls_per_hour)
}

/// Rate-limited, disk-cached Graph API client with token rotation.
pub struct CachedFetcher {
    transport: Arc<dyn HttpTransport>,
    config: ClientConfig,
    tokens: TokenPool,
    cache: ResponseCache,
    call_interval: Duration,
    network_calls: usize,
}

impl CachedFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, config: ClientConfig, tokens: Vec<String>) -> Self {
        let tokens = TokenPool::new(tokens);
        let call_interval = call_interval(tokens.len(), config.hourly_limit);
        let cache = ResponseCache::new(config.cache_dir.clone());

        Self {
            transport,
            config,
            tokens,
            cache,
            call_interval,
            network_calls: 0,
        }
    }

    pub fn tokens(&self) -> &TokenPool {
        &self.tokens
    }

    pub fn network_calls(&self) -> usize {
        self.network_calls
    }

    pub fn call_interval(&self) -> Duration {
        self.call_interval
    }

    /// Fetch a request, answering from the cache when possible.
    ///
    /// Returns `Ok(None)` for a 400 (cached, never retried) and, when
    /// `suppress_errors` is set, for 5xx and transport failures.
    pub async fn call(&mut self, request: &GraphRequest, suppress_errors: bool) -> Result<Option<Value>> {
        let signature = request.signature();

        if let Some(body) = self.cache.get(&signature).await? {
            return self.decode(&signature, &body, suppress_errors);
        }

        loop {
            let token = match self.tokens.current() {
                Some(token) => token.to_string(),
                None => {
                    return Err(ImporterError::RateLimitExhausted {
                        tokens: self.tokens.len(),
                        status: 0,
                    })
                }
            };
            let url = request.url(&self.config, &token)?;

            info!("Fetching {}...", signature);
            let outcome = self.transport.send(HttpRequest::get(url.as_str())).await;
            self.network_calls += 1;
            self.pace().await;

            let response = match outcome {
                Ok(response) => response,
                Err(e) => {
                    if suppress_errors {
                        warn!("Error fetching {}: {}", signature, e);
                        return Ok(None);
                    }
                    return Err(e);
                }
            };

            match response.status {
                200..=299 => {
                    self.cache.put(&signature, &response.body).await?;
                    return self.decode(&signature, &response.body, suppress_errors);
                }
                400 => {
                    // never repeat a bad request
                    self.cache.put(&signature, &response.body).await?;
                    warn!("Bad request {}, cached: {}", signature, response.body);
                    return Ok(None);
                }
                401..=499 => {
                    if !self.tokens.rotate() {
                        return Err(ImporterError::RateLimitExhausted {
                            tokens: self.tokens.len(),
                            status: response.status,
                        });
                    }
                    warn!(
                        "Got {}, possibly rate limited, trying token {}/{}",
                        response.status,
                        self.tokens.position() + 1,
                        self.tokens.len()
                    );
                }
                status => {
                    if suppress_errors {
                        info!("Error fetching {}, status {}", signature, status);
                        return Ok(None);
                    }
                    return Err(ImporterError::Upstream {
                        status,
                        url: signature,
                    });
                }
            }
        }
    }

    fn decode(&self, signature: &str, body: &str, suppress_errors: bool) -> Result<Option<Value>> {
        match serde_json::from_str::<Value>(body) {
            // a cached 400 holds the API's error object, not data
            Ok(value) if value.get("error").is_some() => {
                debug!("Cached error response for {}", signature);
                Ok(None)
            }
            Ok(value) => Ok(Some(value)),
            Err(e) if suppress_errors => {
                warn!("Unparseable response for {}: {}", signature, e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn pace(&self) {
        if !self.call_interval.is_zero() {
            debug!("Sleeping {:?} between calls", self.call_interval);
            tokio::time::sleep(self.call_interval).await;
        }
    }
}

/// Swap a short-lived user token for a long-lived one. Not cached.
pub async fn exchange_long_lived_token(
    transport: &dyn HttpTransport,
    config: &ClientConfig,
    app_id: &str,
    app_secret: &str,
    user_token: &str,
) -> Result<String> {
    let mut url = Url::parse(&format!(
        "{}/oauth/access_token",
        config.base_url.trim_end_matches('/')
    ))?;
    url.query_pairs_mut()
        .append_pair("fb_exchange_token", user_token)
        .append_pair("grant_type", "fb_exchange_token")
        .append_pair("client_id", app_id)
        .append_pair("client_secret", app_secret);

    let response = transport.send(HttpRequest::get(url.as_str())).await?;
    if response.status != 200 {
        return Err(ImporterError::TokenExchange {
            status: response.status,
        });
    }

    let result: Value = serde_json::from_str(&response.body)?;
    result
        .get(TOKEN_PARAM)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ImporterError::General("Token exchange response has no access_token".to_string()))
}
