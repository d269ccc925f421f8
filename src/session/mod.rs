//! Session cookies harvested from a browser run
//!
//! A [`Session`] is a plain value: the engine passes it to every request
//! that needs it and replaces it when the cookies are renewed.

use std::collections::BTreeMap;

/// Cookies the backend's bot mitigation insists on
pub const REQUIRED_COOKIES: [&str; 2] = ["bm_sz", "akavpau_User_allowed"];

/// Waiting-room pass; renamed to the regular pass to skip the queue
pub const WAITING_ROOM_COOKIE: &str = "akavpwr_User_allowed";
pub const ALLOWED_COOKIE: &str = "akavpau_User_allowed";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    cookies: BTreeMap<String, String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Required cookie names not present in this session
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_COOKIES
            .iter()
            .copied()
            .filter(|name| !self.contains(name))
            .collect()
    }

    /// Keep only the required cookies
    pub fn retain_required(&mut self) {
        self.cookies
            .retain(|name, _| REQUIRED_COOKIES.contains(&name.as_str()));
    }

    /// Value for a `Cookie` request header
    pub fn header_value(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Short fingerprint for logs: the tail of `bm_sz`
    pub fn fingerprint(&self) -> String {
        match self.get("bm_sz") {
            Some(value) => {
                let tail: String = value
                    .chars()
                    .rev()
                    .take(6)
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                format!("*{tail}")
            }
            None => String::from("-"),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Session {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut session = Session::new();
        for (name, value) in iter {
            session.insert(name, value);
        }
        session
    }
}
