//! Slot search for one zone with one access code

use rand::seq::SliceRandom;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::{truncate, ApiClient, WAITING_ROOM_MARKER};
use crate::error::{Error, Result};
use crate::filter::{accepts, TimeWindow};
use crate::models::{Reservation, SearchResponse, SlotPair, Zone};
use crate::notify::Notifier;
use crate::session::Session;
use crate::utils::mask_code;

const SEARCH_ENDPOINT: &str = "rest/suche/impfterminsuche";

pub struct ReservationFinder {
    api: Arc<ApiClient>,
    notifier: Arc<dyn Notifier>,
}

impl ReservationFinder {
    pub fn new(api: Arc<ApiClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self { api, notifier }
    }

    /// Look for a slot pair in `zone` that fits `window`
    ///
    /// `Ok(None)` means nothing is offered right now (or the waiting room
    /// answered). Slots that were offered but all miss the window yield
    /// [`Error::TimeframeMissed`].
    pub async fn search(
        &self,
        zone: &Zone,
        code: &str,
        window: Option<&TimeWindow>,
        session: Option<&Session>,
    ) -> Result<Option<Reservation>> {
        let request = self
            .api
            .get(&zone.search_url())
            .timeout(self.api.search_timeout());
        let request = self.api.authorized(request, code, session);
        let response = self.api.send(request).await?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => {
                return Err(Error::UnmatchingCode {
                    plz: zone.plz.clone(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(Error::BotMitigation {
                    endpoint: SEARCH_ENDPOINT.to_string(),
                })
            }
            _ => {}
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        if body.contains(WAITING_ROOM_MARKER) {
            debug!(zone = %zone.plz, "Waiting room, no result yet");
            return Ok(None);
        }

        let parsed: SearchResponse = serde_json::from_str(&body)?;
        let pairs = parsed.termine.unwrap_or_default();
        if pairs.is_empty() {
            debug!(zone = %zone.plz, code = %mask_code(code), "No slots offered");
            return Ok(None);
        }

        self.notifier.cue();
        info!(zone = %zone, count = pairs.len(), "Slot pairs offered");

        let (accepted, rejected): (Vec<&SlotPair>, Vec<&SlotPair>) =
            pairs.iter().partition(|pair| accepts(pair, window));

        for pair in &rejected {
            info!(zone = %zone.plz, slots = ?pair.describe(), "Slot pair outside the time window");
        }

        let Some(chosen) = pick_random(&accepted) else {
            return Err(Error::TimeframeMissed {
                plz: zone.plz.clone(),
                rejected: rejected.len(),
            });
        };

        info!(zone = %zone, slots = ?chosen.describe(), "Slot pair selected");
        Ok(Some(Reservation {
            code: code.to_string(),
            zone: zone.clone(),
            slot_pair: (*chosen).clone(),
        }))
    }
}

/// Uniformly random element of `items`
pub fn pick_random<T>(items: &[T]) -> Option<&T> {
    items.choose(&mut rand::thread_rng())
}
