//! Zone catalog: every bookable zone, grouped by backend host

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::models::{Qualification, Zone};
use crate::utils::normalize_host_url;

#[derive(Debug, Clone, Default)]
pub struct ZoneCatalog {
    by_host: BTreeMap<String, Vec<Zone>>,
}

impl ZoneCatalog {
    /// Fetch and parse the public catalog
    pub async fn load(api: &ApiClient, url: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<Value>> =
            api.fetch_json(url)
                .await
                .map_err(|e| Error::CatalogUnavailable {
                    reason: e.to_string(),
                })?;

        let catalog = Self::from_regions(raw);
        info!(
            zones = catalog.len(),
            hosts = catalog.by_host.len(),
            "Zone catalog loaded"
        );
        Ok(catalog)
    }

    /// Parse a catalog body of the form `{ "<region>": [zone, ...], ... }`
    pub fn parse(body: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<Value>> =
            serde_json::from_str(body).map_err(|e| Error::CatalogUnavailable {
                reason: e.to_string(),
            })?;
        Ok(Self::from_regions(raw))
    }

    fn from_regions(raw: HashMap<String, Vec<Value>>) -> Self {
        let zones = raw
            .into_iter()
            .flat_map(|(region, entries)| entries.into_iter().map(move |e| (region.clone(), e)))
            .filter_map(|(region, entry)| match serde_json::from_value::<Zone>(entry) {
                Ok(zone) => Some(zone),
                Err(e) => {
                    warn!(region = %region, error = %e, "Skipping malformed zone record");
                    None
                }
            });
        Self::from_zones(zones)
    }

    /// Build a catalog from zone records
    ///
    /// Host URLs are normalised to end in `/`. Records with an empty PLZ or
    /// an unusable URL are dropped.
    pub fn from_zones(zones: impl IntoIterator<Item = Zone>) -> Self {
        let mut by_host: BTreeMap<String, Vec<Zone>> = BTreeMap::new();
        for mut zone in zones {
            let plz = zone.plz.trim().to_string();
            if plz.is_empty() {
                warn!(zone = %zone.name.trim(), "Skipping zone without PLZ");
                continue;
            }
            let Some(host) = normalize_host_url(&zone.host_url) else {
                warn!(plz = %plz, url = %zone.host_url, "Skipping zone with invalid URL");
                continue;
            };
            zone.plz = plz;
            zone.host_url = host.clone();
            by_host.entry(host).or_default().push(zone);
        }
        Self { by_host }
    }

    /// Zone with the given PLZ
    pub fn by_plz(&self, plz: &str) -> Option<&Zone> {
        self.iter().find(|z| z.plz == plz)
    }

    /// Zones served by one host
    pub fn zones_for_host(&self, host: &str) -> &[Zone] {
        self.by_host.get(host).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.by_host.keys().map(String::as_str)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, &[Zone])> {
        self.by_host.iter().map(|(h, z)| (h.as_str(), z.as_slice()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.by_host.values().flatten()
    }

    /// Total number of zones
    pub fn len(&self) -> usize {
        self.by_host.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_host.is_empty()
    }
}

/// Fetch the vaccine qualification list of a host
pub async fn load_qualifications(api: &ApiClient, host: &str) -> Result<Vec<Qualification>> {
    let url = format!("{host}assets/static/its/vaccination-list.json");
    api.fetch_json(&url).await
}

/// Log each qualification on one line
pub fn log_qualifications(qualifications: &[Qualification]) {
    for q in qualifications {
        info!(
            qualification = %q.qualification,
            age = q.age.as_deref().unwrap_or("N/A"),
            interval = ?q.interval,
            vaccines = ?q.vaccines(),
            "Qualification available"
        );
    }
}
