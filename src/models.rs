// Core data structures for the reservation engine

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A bookable zone (one vaccination centre) served by a backend host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zone {
    #[serde(rename = "PLZ")]
    pub plz: String,
    #[serde(rename = "Zentrumsname")]
    pub name: String,
    #[serde(rename = "Ort")]
    pub city: String,
    #[serde(rename = "URL")]
    pub host_url: String,
    #[serde(rename = "Bundesland", default)]
    pub state: String,
    #[serde(rename = "Adresse", default)]
    pub address: String,
}

impl Zone {
    /// Landing page of this zone's booking UI
    pub fn landing_url(&self) -> String {
        format!("{}impftermine/service?plz={}", self.host_url, self.plz)
    }

    /// Slot search endpoint
    pub fn search_url(&self) -> String {
        format!("{}rest/suche/impfterminsuche?plz={}", self.host_url, self.plz)
    }

    /// Booking endpoint
    pub fn booking_url(&self) -> String {
        format!("{}rest/buchung", self.host_url)
    }

    /// Deep link a human can use to finish a booking by hand
    pub fn manual_booking_url(&self, code: &str) -> String {
        format!("{}impftermine/suche/{}/{}", self.host_url, code, self.plz)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' in {} {}", self.name.trim(), self.plz, self.city)
    }
}

/// An access code with its cool-down timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codepoint {
    pub code: String,
    pub next_usable_at: DateTime<Utc>,
}

impl Codepoint {
    /// Create a codepoint that is usable right away
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            next_usable_at: Utc::now(),
        }
    }

    /// Whether the code may be used at `now`
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.next_usable_at <= now
    }
}

/// A single appointment slot as returned by the search endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    #[serde(rename = "slotId")]
    pub slot_id: String,
    /// Begin of the slot in epoch milliseconds
    pub begin: i64,
    #[serde(default)]
    pub bsnr: Option<String>,
}

impl Slot {
    /// Begin of the slot in the given time zone
    pub fn begin_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        tz.timestamp_millis_opt(self.begin).single()
    }

    /// Begin of the slot as local wall-clock time
    pub fn begin_local(&self) -> Option<DateTime<Local>> {
        self.begin_in(&Local)
    }
}

/// Two linked slots that are always booked together
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotPair {
    pub slots: Vec<Slot>,
}

impl SlotPair {
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    /// Slot IDs in booking order
    pub fn slot_ids(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.slot_id.clone()).collect()
    }

    /// Human readable begin times, one per slot
    pub fn describe(&self) -> Vec<String> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| match slot.begin_local() {
                Some(ts) => format!("{}. slot: {}", i + 1, ts.format("%d.%m.%Y %H:%M")),
                None => format!("{}. slot: invalid timestamp {}", i + 1, slot.begin),
            })
            .collect()
    }
}

/// Response body of the slot search endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub termine: Option<Vec<SlotPair>>,
}

/// A found slot pair ready to be booked with a specific code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub code: String,
    pub zone: Zone,
    pub slot_pair: SlotPair,
}

/// Contact details of the person the appointment is booked for
///
/// Field names on the wire are the backend's own.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Contact {
    #[serde(rename = "anrede")]
    pub salutation: String,
    #[serde(rename = "vorname")]
    pub first_name: String,
    #[serde(rename = "nachname")]
    pub last_name: String,
    #[serde(rename = "strasse")]
    pub street: String,
    #[serde(rename = "hausnummer")]
    pub house_number: String,
    pub plz: String,
    #[serde(rename = "ort")]
    pub city: String,
    pub phone: String,
    #[serde(rename = "notificationChannel", default = "default_channel")]
    pub notification_channel: String,
    #[serde(rename = "notificationReceiver")]
    pub notification_receiver: String,
}

fn default_channel() -> String {
    String::from("email")
}

/// Booking request body
#[derive(Debug, Clone, Serialize)]
pub struct BookingRequest<'a> {
    pub plz: &'a str,
    pub slots: Vec<String>,
    pub qualifikationen: Vec<String>,
    pub contact: &'a Contact,
}

/// Error body returned by the booking endpoint
///
/// Example: `{"errors":[{"code":"WP011","text":"..."}]}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendErrors {
    #[serde(default)]
    pub errors: Vec<BackendErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendErrorEntry {
    pub code: String,
    #[serde(default)]
    pub text: String,
}

/// One entry of a host's vaccine qualification list
#[derive(Debug, Clone, Deserialize)]
pub struct Qualification {
    pub qualification: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tssname: Option<String>,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub age: Option<String>,
}

impl Qualification {
    /// Vaccines covered by this qualification
    pub fn vaccines(&self) -> Vec<String> {
        self.tssname
            .as_deref()
            .unwrap_or("N/A")
            .replace(' ', "")
            .split(',')
            .map(str::to_string)
            .collect()
    }
}
