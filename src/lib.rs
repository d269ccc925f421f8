//! terminjaeger - appointment finder for the regional vaccination booking backend
//!
//! Polls the slot search endpoint of one or more vaccination centres with a
//! pool of access codes, filters offers against a user time window and books
//! the first matching pair through the REST API, falling back to browser
//! automation when the API refuses.
//!
//! # Architecture
//!
//! - [`catalog`] - Zone catalog download and lookup
//! - [`codepool`] - Per-host access code pools with cool-downs
//! - [`filter`] - Time window matching for slot pairs
//! - [`finder`] - Slot search against one zone
//! - [`booking`] - API booking with browser fallback
//! - [`cookies`] and [`browser`] - Bot-mitigation cookies via headless Chrome
//! - [`engine`] - The search loop tying everything together
//! - [`codegen`] - Access code issuance via SMS PIN
//! - [`config`], [`profile`], [`validation`] - Settings and user input
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use terminjaeger::config::Config;
//! use terminjaeger::engine::{Outcome, Terminsuche};
//! use terminjaeger::profile::Profile;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let profile = Profile::from_file(Path::new("profile.json"))?;
//!     let mut engine = Terminsuche::builder(profile, Config::from_env()).build().await?;
//!     if let Outcome::Booked(reservation) = engine.run().await? {
//!         println!("Booked in {}", reservation.zone);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod booking;
pub mod browser;
pub mod catalog;
pub mod codegen;
pub mod codepool;
pub mod config;
pub mod cookies;
pub mod engine;
pub mod error;
pub mod filter;
pub mod finder;
pub mod models;
pub mod notify;
pub mod profile;
pub mod session;
pub mod utils;
pub mod validation;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::engine::{Outcome, Terminsuche};
    pub use crate::error::{Disposition, Error, ErrorCategory, Result};
    pub use crate::models::{Contact, Reservation, SlotPair, Zone};
    pub use crate::profile::Profile;
    pub use crate::session::Session;
}

pub use error::{Error, Result};
