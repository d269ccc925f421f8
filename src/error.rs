//! Unified error handling for terminjaeger
//!
//! Every failure the engine can observe is a variant of [`Error`]. Each
//! variant carries an [`ErrorCategory`] for logging and a [`Disposition`]
//! that tells the retry policy and the search loop what to do with it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use terminjaeger::error::{Disposition, Error};
//!
//! fn handle(err: &Error) {
//!     match err.disposition() {
//!         Disposition::Retry => tracing::warn!(error = %err, "transient failure"),
//!         Disposition::CoolDown => tracing::info!(error = %err, "code parked"),
//!         Disposition::Fatal => tracing::error!(error = %err, "giving up"),
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::browser::BrowserError;
pub use crate::validation::ValidationError;

/// Classification of errors for log output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport failures, timeouts, unexpected status codes
    Network,
    /// Bot mitigation and waiting-room responses
    BotProtection,
    /// Access code problems (invalid for host, no matching slots)
    AccessCode,
    /// Booking conflicts and failed bookings
    Booking,
    /// Browser automation failures
    Browser,
    /// Profile and configuration problems
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label used in structured log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::BotProtection => "bot_protection",
            Self::AccessCode => "access_code",
            Self::Booking => "booking",
            Self::Browser => "browser",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// What a caller should do after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Transient: try the same operation again after a delay
    Retry,
    /// Park the code (or drop it) and move on to the next iteration
    CoolDown,
    /// Stop and report to the caller
    Fatal,
}

/// Unified error type for the terminjaeger crate
#[derive(Error, Debug)]
pub enum Error {
    /// Zone catalog could not be fetched or parsed
    #[error("Zone catalog unavailable: {reason}")]
    CatalogUnavailable { reason: String },

    /// Browser session did not yield the required bot-mitigation cookies
    #[error("Cookie generation failed: {reason}")]
    CookieGenerationFailed { reason: String },

    /// Backend answered 401: the code is not valid for this zone's host
    #[error("Access code not valid for zone {plz}")]
    UnmatchingCode { plz: String },

    /// Slots were found but none matched the time window
    #[error("{rejected} slot pair(s) in {plz} outside the time window")]
    TimeframeMissed { plz: String, rejected: usize },

    /// Someone else booked the slot first
    #[error("Appointment in {plz} no longer available ({backend_code})")]
    AppointmentGone { plz: String, backend_code: String },

    /// Booking failed through both the API and the browser fallback
    #[error("Booking in {plz} failed: {reason}")]
    BookingError { plz: String, reason: String },

    /// Profile validation failed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Backend answered 429: the bot mitigation blocked the request
    #[error("Request to {endpoint} blocked by bot protection")]
    BotMitigation { endpoint: String },

    /// Request timed out
    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// Unexpected HTTP status
    #[error("Unexpected HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    /// Transport-level HTTP failure
    #[error("HTTP transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Response body was not the expected JSON
    #[error("Response decoding failed: {reason}")]
    Decode { reason: String },

    /// Browser automation failure
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Code issuance refused because of the request limit
    #[error("Code request limit reached")]
    RequestLimitReached,

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation aborted by the shutdown signal
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a decode error
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Get the error category for log output
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CatalogUnavailable { .. }
            | Self::Timeout { .. }
            | Self::Http { .. }
            | Self::Transport(_)
            | Self::Decode { .. } => ErrorCategory::Network,
            Self::CookieGenerationFailed { .. } | Self::BotMitigation { .. } => {
                ErrorCategory::BotProtection
            }
            Self::UnmatchingCode { .. }
            | Self::TimeframeMissed { .. }
            | Self::RequestLimitReached => ErrorCategory::AccessCode,
            Self::AppointmentGone { .. } | Self::BookingError { .. } => ErrorCategory::Booking,
            Self::Browser(_) => ErrorCategory::Browser,
            Self::Validation(_) | Self::Config(_) => ErrorCategory::Config,
            Self::Io(_) | Self::Cancelled => ErrorCategory::Other,
        }
    }

    /// Decide how callers should react to this error
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::CatalogUnavailable { .. }
            | Self::CookieGenerationFailed { .. }
            | Self::BotMitigation { .. }
            | Self::Timeout { .. }
            | Self::Http { .. }
            | Self::Transport(_)
            | Self::Decode { .. }
            | Self::Browser(_)
            | Self::Io(_) => Disposition::Retry,
            Self::UnmatchingCode { .. }
            | Self::TimeframeMissed { .. }
            | Self::AppointmentGone { .. }
            | Self::BookingError { .. } => Disposition::CoolDown,
            Self::Validation(_)
            | Self::Config(_)
            | Self::RequestLimitReached
            | Self::Cancelled => Disposition::Fatal,
        }
    }

    /// Check if this error is recoverable (anything but fatal)
    pub fn is_recoverable(&self) -> bool {
        self.disposition() != Disposition::Fatal
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let endpoint = err
                .url()
                .map(|u| u.path().to_string())
                .unwrap_or_else(|| String::from("unknown"));
            Self::Timeout { endpoint }
        } else if err.is_decode() {
            Self::Decode {
                reason: err.to_string(),
            }
        } else {
            Self::Transport(err)
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            reason: err.to_string(),
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
