//! Slot filtering against a user supplied time window

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveTime, TimeZone, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::SlotPair;

/// Which slot(s) of a pair the window constrains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppliesTo {
    First,
    Second,
    Both,
}

impl AppliesTo {
    fn covers(self, index: usize) -> bool {
        match self {
            Self::First => index == 0,
            Self::Second => index == 1,
            Self::Both => true,
        }
    }
}

/// Time window as it appears in the profile (`zeitrahmen`)
///
/// Parsed and checked by [`crate::validation::validate_time_window`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeWindowSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub von_datum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bis_datum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub von_uhrzeit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bis_uhrzeit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wochentage: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub einhalten_bei: Option<String>,
}

impl TimeWindowSpec {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A validated time window. Unset bounds are open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub from_time: Option<NaiveTime>,
    /// Inclusive through second :59 of this minute
    pub to_time: Option<NaiveTime>,
    pub weekdays: Option<HashSet<Weekday>>,
    pub applies_to: AppliesTo,
}

impl TimeWindow {
    /// A window without bounds that still constrains both slots
    pub fn open(applies_to: AppliesTo) -> Self {
        Self {
            from_date: None,
            to_date: None,
            from_time: None,
            to_time: None,
            weekdays: None,
            applies_to,
        }
    }

    fn contains(&self, date: NaiveDate, time: NaiveTime) -> bool {
        if self.from_date.is_some_and(|from| date < from) {
            return false;
        }
        if self.to_date.is_some_and(|to| date > to) {
            return false;
        }
        if self.from_time.is_some_and(|from| time < from) {
            return false;
        }
        if let Some(to) = self.to_time {
            let (end, _) = to.overflowing_add_signed(Duration::seconds(59));
            if time > end {
                return false;
            }
        }
        match &self.weekdays {
            Some(days) => days.contains(&date.weekday()),
            None => true,
        }
    }
}

/// Whether `pair` satisfies `window` in local wall-clock time
pub fn accepts(pair: &SlotPair, window: Option<&TimeWindow>) -> bool {
    accepts_in(pair, window, &Local)
}

/// Whether `pair` satisfies `window`, evaluated in the time zone `tz`
///
/// Slots with a timestamp that cannot be represented are rejected.
pub fn accepts_in<Tz: TimeZone>(pair: &SlotPair, window: Option<&TimeWindow>, tz: &Tz) -> bool {
    let Some(window) = window else {
        return true;
    };

    pair.slots
        .iter()
        .enumerate()
        .filter(|(index, _)| window.applies_to.covers(*index))
        .all(|(_, slot)| match slot.begin_in(tz) {
            Some(begin) => window.contains(begin.date_naive(), begin.time()),
            None => false,
        })
}
