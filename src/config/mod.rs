//! Configuration management for terminjaeger
//!
//! Values come from a TOML file, with `TERMINJAEGER_*` environment
//! variables layered on top. Every field has a default so a partial file
//! (or none at all) is fine.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Public zone catalog
pub const DEFAULT_CATALOG_URL: &str = "https://www.impfterminservice.de/assets/static/impfzentren.json";

/// Longest accepted cool-down or zone penalty, one year
pub const MAX_PENALTY_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend API access
    pub api: ApiConfig,

    /// Search loop timing
    pub search: SearchConfig,

    /// Browser automation
    pub browser: BrowserConfig,

    /// Booking behaviour
    pub booking: BookingConfig,

    /// Retry behaviour
    pub retry: RetrySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Zone catalog URL
    pub catalog_url: String,

    /// User agent string
    pub user_agent: String,

    /// Default request timeout in seconds
    pub request_timeout_secs: u64,

    /// Slot search timeout in seconds
    pub search_timeout_secs: u64,

    /// Rate limit (requests per second)
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Pause between two iterations
    pub poll_delay_secs: u64,

    /// Cool-down after a missed time window or a lost slot
    pub cool_down_secs: u64,

    /// Pause before the catalog is requested again
    pub catalog_retry_delay_secs: u64,

    /// Catalog attempts before giving up, 0 for unbounded
    pub catalog_max_attempts: u32,

    /// Consecutive lost slots before a zone is skipped for a while
    pub gone_streak_limit: u32,

    /// How long a zone is skipped
    pub zone_penalty_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome binary, if not on the default path
    pub chrome_binary: Option<PathBuf>,

    pub headless: bool,

    /// Time a human gets to interact with the page before cookies are read
    pub manual_window_secs: u64,

    /// How long the fallback keeps the window open after a failed booking
    pub fallback_hold_secs: u64,

    /// Maximum wait for a page element
    pub element_timeout_secs: u64,

    /// Upper bound for a single browser step, including launch
    pub command_timeout_secs: u64,

    /// Random pointer moves after the code was entered
    pub pointer_moves: u32,

    /// Pause before the fallback checks for the booking confirmation
    pub confirmation_wait_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    /// Acquire a fresh session before every booking attempt
    pub fresh_cookies: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts for cookie acquisition
    pub cookie_attempts: u32,

    /// Pause between cookie attempts in seconds
    pub cookie_delay_secs: u64,

    /// Pause between code request attempts in seconds
    pub code_request_delay_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            catalog_url: String::from(DEFAULT_CATALOG_URL),
            user_agent: format!("terminjaeger/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 15,
            search_timeout_secs: 5,
            requests_per_second: 2,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            poll_delay_secs: 60,
            cool_down_secs: 600,
            catalog_retry_delay_secs: 30,
            catalog_max_attempts: 0,
            gone_streak_limit: 3,
            zone_penalty_secs: 600,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_binary: None,
            headless: false,
            manual_window_secs: 30,
            fallback_hold_secs: 600,
            element_timeout_secs: 10,
            command_timeout_secs: 60,
            pointer_moves: 3,
            confirmation_wait_secs: 3,
        }
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            fresh_cookies: true,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            cookie_attempts: 3,
            cookie_delay_secs: 5,
            code_request_delay_secs: 30,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::config(format!("Failed to parse TOML config file {}: {e}", path.display()))
        })
    }

    /// Load defaults overlaid with environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay `TERMINJAEGER_*` environment variables
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("TERMINJAEGER_CATALOG_URL") {
            self.api.catalog_url = url;
        }
        if let Ok(agent) = std::env::var("TERMINJAEGER_USER_AGENT") {
            self.api.user_agent = agent;
        }
        if let Some(secs) = env_parse("TERMINJAEGER_REQUEST_TIMEOUT") {
            self.api.request_timeout_secs = secs;
        }
        if let Some(rps) = env_parse("TERMINJAEGER_RATE_LIMIT") {
            self.api.requests_per_second = rps;
        }
        if let Some(secs) = env_parse("TERMINJAEGER_POLL_DELAY") {
            self.search.poll_delay_secs = secs;
        }
        if let Ok(path) = std::env::var("TERMINJAEGER_CHROME_BIN") {
            self.browser.chrome_binary = Some(PathBuf::from(path));
        }
        if let Some(headless) = env_parse("TERMINJAEGER_HEADLESS") {
            self.browser.headless = headless;
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.requests_per_second == 0 {
            return Err(Error::config("requests_per_second must be greater than 0"));
        }

        if self.api.request_timeout_secs == 0 || self.api.search_timeout_secs == 0 {
            return Err(Error::config("timeouts must be greater than 0"));
        }

        if url::Url::parse(&self.api.catalog_url).is_err() {
            return Err(Error::config(format!(
                "catalog_url is not a valid URL: {}",
                self.api.catalog_url
            )));
        }

        if self.search.gone_streak_limit == 0 {
            return Err(Error::config("gone_streak_limit must be greater than 0"));
        }

        if self.retry.cookie_attempts == 0 {
            return Err(Error::config("cookie_attempts must be greater than 0"));
        }

        if self.browser.command_timeout_secs == 0 {
            return Err(Error::config("command_timeout_secs must be greater than 0"));
        }

        for (name, secs) in [
            ("cool_down_secs", self.search.cool_down_secs),
            ("zone_penalty_secs", self.search.zone_penalty_secs),
        ] {
            if secs > MAX_PENALTY_SECS {
                return Err(Error::config(format!(
                    "{name} must not exceed {MAX_PENALTY_SECS}"
                )));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    #[must_use]
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.api.search_timeout_secs)
    }

    #[must_use]
    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.search.poll_delay_secs)
    }

    #[must_use]
    pub fn cool_down(&self) -> TimeDelta {
        penalty(self.search.cool_down_secs)
    }

    #[must_use]
    pub fn zone_penalty(&self) -> TimeDelta {
        penalty(self.search.zone_penalty_secs)
    }

    #[must_use]
    pub fn catalog_retry_delay(&self) -> Duration {
        Duration::from_secs(self.search.catalog_retry_delay_secs)
    }

    #[must_use]
    pub fn manual_window(&self) -> Duration {
        Duration::from_secs(self.browser.manual_window_secs)
    }

    #[must_use]
    pub fn fallback_hold(&self) -> Duration {
        Duration::from_secs(self.browser.fallback_hold_secs)
    }

    #[must_use]
    pub fn confirmation_wait(&self) -> Duration {
        Duration::from_secs(self.browser.confirmation_wait_secs)
    }

    #[must_use]
    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.browser.element_timeout_secs)
    }
}

/// Clamped to [`MAX_PENALTY_SECS`]; a timestamp plus the penalty cannot overflow
fn penalty(secs: u64) -> TimeDelta {
    i64::try_from(secs.min(MAX_PENALTY_SECS))
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or_else(|| TimeDelta::days(365))
}
