//! User profile: access codes, target zones, contact and time window
//!
//! Read from a JSON file that is never written back.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::filter::{TimeWindow, TimeWindowSpec};
use crate::models::Contact;
use crate::validation::{
    validate_codes, validate_contact, validate_target_zones, validate_time_window,
    ValidationError,
};

/// File layout; `code` is the single-code format of older profiles
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    #[serde(default)]
    codes: Vec<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    plz_impfzentren: Vec<String>,
    kontakt: Contact,
    #[serde(default)]
    zeitrahmen: TimeWindowSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub codes: Vec<String>,
    #[serde(rename = "plz_impfzentren")]
    pub target_zones: Vec<String>,
    #[serde(rename = "kontakt")]
    pub contact: Contact,
    #[serde(rename = "zeitrahmen")]
    pub time_window: TimeWindowSpec,
}

impl Profile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read profile {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Parse a profile, merging a legacy `code` into `codes`
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawProfile = serde_json::from_str(content)
            .map_err(|e| ValidationError::new("profile", e.to_string()))?;

        let mut codes = raw.codes;
        if let Some(code) = raw.code {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }

        Ok(Self {
            codes,
            target_zones: raw.plz_impfzentren,
            contact: raw.kontakt,
            time_window: raw.zeitrahmen,
        })
    }

    /// Check every section; returns the parsed time window
    pub fn validate(&self) -> std::result::Result<Option<TimeWindow>, ValidationError> {
        validate_codes(&self.codes)?;
        validate_target_zones(&self.target_zones)?;
        validate_contact(&self.contact)?;
        validate_time_window(&self.time_window)
    }
}
