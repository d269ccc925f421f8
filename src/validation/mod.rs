//! Profile validation
//!
//! All checks run once, before the engine touches the network. A failure is
//! fatal and names the offending key, e.g. `kontakt.plz`.

use chrono::{NaiveDate, NaiveTime, Weekday};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

use crate::filter::{AppliesTo, TimeWindow, TimeWindowSpec};
use crate::models::Contact;

/// German weekday names; any prefix of two or more characters is accepted
const WEEKDAY_NAMES: [(&str, Weekday); 7] = [
    ("montag", Weekday::Mon),
    ("dienstag", Weekday::Tue),
    ("mittwoch", Weekday::Wed),
    ("donnerstag", Weekday::Thu),
    ("freitag", Weekday::Fri),
    ("samstag", Weekday::Sat),
    ("sonntag", Weekday::Sun),
];

pub const DATE_FORMAT: &str = "%d.%m.%Y";
pub const TIME_FORMAT: &str = "%H:%M";

/// A rejected profile value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid key \"{key}\": {reason}")]
pub struct ValidationError {
    pub key: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Prefix the key with its parent, e.g. `plz` -> `kontakt.plz`
    fn within(mut self, parent: &str) -> Self {
        self.key = format!("{parent}.{}", self.key);
        self
    }
}

type Validation<T = ()> = Result<T, ValidationError>;

fn code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[0-9a-zA-Z]{4}-[0-9a-zA-Z]{4}-[0-9a-zA-Z]{4}$").expect("Invalid regex pattern")
    })
}

fn plz_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{5}$").expect("Invalid regex pattern"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+49[1-9][0-9]+$").expect("Invalid regex pattern"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s<>]+@[^@\s<>]+\.[^@\s<>]+$").expect("Invalid regex pattern"))
}

/// Validate access codes of the form `XXXX-XXXX-XXXX`
pub fn validate_codes(codes: &[String]) -> Validation {
    if codes.is_empty() {
        return Err(ValidationError::new("codes", "at least one code is required"));
    }
    for code in codes {
        if !code_re().is_match(code) {
            return Err(ValidationError::new(
                "codes",
                format!("\"{code}\" does not match the pattern \"XXXX-XXXX-XXXX\""),
            ));
        }
    }
    Ok(())
}

/// Validate a five digit postal code
pub fn validate_plz(plz: &str) -> Validation {
    if !plz_re().is_match(plz) {
        return Err(ValidationError::new(
            "plz",
            format!("\"{plz}\" must consist of exactly 5 digits"),
        ));
    }
    Ok(())
}

/// Validate the list of target zone postal codes
pub fn validate_target_zones(plzs: &[String]) -> Validation {
    if plzs.is_empty() {
        return Err(ValidationError::new(
            "plz_impfzentren",
            "at least one zone is required",
        ));
    }
    for plz in plzs {
        validate_plz(plz).map_err(|_| {
            ValidationError::new(
                "plz_impfzentren",
                format!("\"{plz}\" must consist of exactly 5 digits"),
            )
        })?;
    }
    Ok(())
}

/// Validate a phone number with German country prefix
pub fn validate_phone(phone: &str) -> Validation {
    if !phone_re().is_match(phone) {
        return Err(ValidationError::new(
            "phone",
            format!("invalid phone number \"{phone}\", expected +49..."),
        ));
    }
    Ok(())
}

/// Validate an e-mail address; the backend rejects plus addressing
pub fn validate_email(email: &str) -> Validation {
    if !email_re().is_match(email) {
        return Err(ValidationError::new(
            "notificationReceiver",
            format!("invalid e-mail address \"{email}\""),
        ));
    }
    if email.contains('+') {
        return Err(ValidationError::new(
            "notificationReceiver",
            format!("invalid e-mail address \"{email}\" (plus sign not supported)"),
        ));
    }
    Ok(())
}

fn validate_house_number(value: &str) -> Validation {
    if value.trim().is_empty() {
        return Err(ValidationError::new("hausnummer", "must not be empty"));
    }
    if value.chars().count() > 20 {
        return Err(ValidationError::new(
            "hausnummer",
            format!("\"{value}\" is too long, at most 20 characters allowed"),
        ));
    }
    Ok(())
}

fn non_empty(key: &str, value: &str) -> Validation {
    if value.trim().is_empty() {
        return Err(ValidationError::new(key, "must not be empty"));
    }
    Ok(())
}

/// Validate the contact block used for booking
pub fn validate_contact(contact: &Contact) -> Validation {
    let check = || -> Validation {
        non_empty("anrede", &contact.salutation)?;
        non_empty("vorname", &contact.first_name)?;
        non_empty("nachname", &contact.last_name)?;
        non_empty("strasse", &contact.street)?;
        non_empty("ort", &contact.city)?;
        validate_house_number(&contact.house_number)?;
        validate_plz(&contact.plz)?;
        validate_phone(&contact.phone)?;
        if contact.notification_channel != "email" {
            return Err(ValidationError::new(
                "notificationChannel",
                "must be set to \"email\"",
            ));
        }
        validate_email(&contact.notification_receiver)
    };
    check().map_err(|e| e.within("kontakt"))
}

/// Decode a German weekday name or a prefix of at least two characters
pub fn decode_weekday(name: &str) -> Validation<Weekday> {
    let lower = name.trim().to_lowercase();
    if lower.chars().count() >= 2 {
        if let Some((_, day)) = WEEKDAY_NAMES.iter().find(|(n, _)| n.starts_with(&lower)) {
            return Ok(*day);
        }
    }
    Err(ValidationError::new(
        "wochentage",
        format!("invalid weekday \"{name}\", allowed: Mo, Di, Mi, Do, Fr, Sa, So"),
    ))
}

/// Two letter abbreviation of a weekday, compatible with [`decode_weekday`]
pub fn encode_weekday(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mo",
        Weekday::Tue => "Di",
        Weekday::Wed => "Mi",
        Weekday::Thu => "Do",
        Weekday::Fri => "Fr",
        Weekday::Sat => "Sa",
        Weekday::Sun => "So",
    }
}

fn parse_date(key: &str, value: &str) -> Validation<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
        ValidationError::new(key, format!("\"{value}\" is not a date like 30.11.1970 ({e})"))
    })
}

fn parse_time(key: &str, value: &str) -> Validation<NaiveTime> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .map_err(|e| ValidationError::new(key, format!("\"{value}\" is not a time like 14:35 ({e})")))
}

fn parse_applies_to(value: &str) -> Validation<AppliesTo> {
    match value {
        "1" => Ok(AppliesTo::First),
        "2" => Ok(AppliesTo::Second),
        "beide" => Ok(AppliesTo::Both),
        other => Err(ValidationError::new(
            "einhalten_bei",
            format!("\"{other}\" not allowed, expected \"1\", \"2\" or \"beide\""),
        )),
    }
}

/// Validate a raw time window and turn it into a [`TimeWindow`]
///
/// An empty window yields `None`, which accepts every slot pair.
pub fn validate_time_window(spec: &TimeWindowSpec) -> Validation<Option<TimeWindow>> {
    let check = || -> Validation<Option<TimeWindow>> {
        if spec.is_empty() {
            return Ok(None);
        }
        let applies_to = match spec.einhalten_bei.as_deref() {
            Some(value) => parse_applies_to(value)?,
            None => {
                return Err(ValidationError::new(
                    "einhalten_bei",
                    "required as soon as any other key is set",
                ))
            }
        };

        let from_date = spec
            .von_datum
            .as_deref()
            .map(|v| parse_date("von_datum", v))
            .transpose()?;
        let to_date = spec
            .bis_datum
            .as_deref()
            .map(|v| parse_date("bis_datum", v))
            .transpose()?;
        let from_time = spec
            .von_uhrzeit
            .as_deref()
            .map(|v| parse_time("von_uhrzeit", v))
            .transpose()?;
        let to_time = spec
            .bis_uhrzeit
            .as_deref()
            .map(|v| parse_time("bis_uhrzeit", v))
            .transpose()?;

        let weekdays = match &spec.wochentage {
            Some(names) if names.is_empty() => {
                return Err(ValidationError::new("wochentage", "must not be an empty list"))
            }
            Some(names) => Some(
                names
                    .iter()
                    .map(|n| decode_weekday(n))
                    .collect::<Validation<HashSet<Weekday>>>()?,
            ),
            None => None,
        };

        if let (Some(from), Some(to)) = (from_date, to_date) {
            if from > to {
                return Err(ValidationError::new(
                    "von_datum",
                    "\"von_datum\" lies after \"bis_datum\"",
                ));
            }
        }
        if let (Some(from), Some(to)) = (from_time, to_time) {
            if from > to {
                return Err(ValidationError::new(
                    "von_uhrzeit",
                    "\"von_uhrzeit\" lies after \"bis_uhrzeit\"",
                ));
            }
        }

        Ok(Some(TimeWindow {
            from_date,
            to_date,
            from_time,
            to_time,
            weekdays,
            applies_to,
        }))
    };
    check().map_err(|e| e.within("zeitrahmen"))
}
