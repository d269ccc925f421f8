//! Shared HTTP layer for the booking backend
//!
//! Wraps a `reqwest` client with timeouts, request pacing, the access code
//! credential and explicit session cookies.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderValue, ACCEPT, COOKIE},
    Client, RequestBuilder, Response,
};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::trace;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::Session;

/// Marker of the backend's virtual waiting room page
pub const WAITING_ROOM_MARKER: &str = "Virtueller Warteraum";

pub struct ApiClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    search_timeout: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("search_timeout", &self.search_timeout)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Build a client from the `[api]` section
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.api.user_agent.as_str())
            .gzip(true)
            .build()
            .map_err(Error::Transport)?;

        let rate = NonZeroU32::new(config.api.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
            search_timeout: config.search_timeout(),
        })
    }

    pub fn search_timeout(&self) -> Duration {
        self.search_timeout
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"))
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client
            .post(url)
            .header(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"))
    }

    /// Attach the access code credential and session cookies
    ///
    /// The backend expects `Basic base64(":" + code)`.
    pub fn authorized(
        &self,
        request: RequestBuilder,
        code: &str,
        session: Option<&Session>,
    ) -> RequestBuilder {
        let request = request.basic_auth("", Some(code));
        with_cookies(request, session)
    }

    /// Send a request once the rate limiter allows it
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.rate_limiter.until_ready().await;
        let response = request.send().await?;
        trace!(status = response.status().as_u16(), url = %response.url(), "Response received");
        Ok(response)
    }

    /// GET `url` and decode a JSON body; non-2xx becomes [`Error::Http`]
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.send(self.get(url)).await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// Attach session cookies as an explicit `Cookie` header
pub fn with_cookies(request: RequestBuilder, session: Option<&Session>) -> RequestBuilder {
    match session {
        Some(session) if !session.is_empty() => match HeaderValue::from_str(&session.header_value()) {
            Ok(value) => request.header(COOKIE, value),
            Err(_) => request,
        },
        _ => request,
    }
}

/// Cut a response body down for error messages
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    }
}
