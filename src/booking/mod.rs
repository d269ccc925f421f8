//! Booking a found reservation
//!
//! The API path is tried first. Conflicts (someone else was faster) are
//! reported as [`Error::AppointmentGone`]; anything unexpected hands the
//! reservation to a browser that clicks through the booking UI.

use reqwest::StatusCode;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::api::{truncate, ApiClient};
use crate::browser::{open_with_code, selectors, BrowserSession};
use crate::config::Config;
use crate::cookies::CookieProvider;
use crate::error::{Error, Result};
use crate::models::{BackendErrors, BookingRequest, Contact, Reservation};
use crate::notify::{notify_best_effort, Notifier};
use crate::session::Session;
use crate::utils::mask_code;
use crate::utils::shutdown::ShutdownSignal;

/// Backend error codes meaning the slot is taken
const CONFLICT_CODES: [&str; 2] = ["WP009", "WP011"];

/// Only one browser fallback may run in the process at a time
fn fallback_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

pub struct BookingExecutor {
    api: Arc<ApiClient>,
    cookies: Arc<CookieProvider>,
    notifier: Arc<dyn Notifier>,
    contact: Contact,
    fresh_cookies: bool,
    fallback_hold: Duration,
    confirmation_wait: Duration,
    pointer_moves: u32,
}

impl BookingExecutor {
    pub fn new(
        api: Arc<ApiClient>,
        cookies: Arc<CookieProvider>,
        notifier: Arc<dyn Notifier>,
        contact: Contact,
        config: &Config,
    ) -> Self {
        Self {
            api,
            cookies,
            notifier,
            contact,
            fresh_cookies: config.booking.fresh_cookies,
            fallback_hold: config.fallback_hold(),
            confirmation_wait: config.confirmation_wait(),
            pointer_moves: config.browser.pointer_moves,
        }
    }

    /// Book `reservation`
    ///
    /// `session` is used as is unless fresh cookies are configured.
    pub async fn book(
        &self,
        reservation: &Reservation,
        session: Option<&Session>,
        shutdown: &ShutdownSignal,
    ) -> Result<()> {
        let zone = &reservation.zone;

        let fresh;
        let session = if self.fresh_cookies {
            match self.cookies.acquire(zone, false, shutdown).await {
                Ok(s) => {
                    fresh = s;
                    Some(&fresh)
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(zone = %zone.plz, error = %e, "No fresh cookies for booking");
                    return self.book_in_browser(reservation, shutdown).await;
                }
            }
        } else {
            session
        };

        info!(
            zone = %zone,
            code = %mask_code(&reservation.code),
            "Booking appointment"
        );

        let body = BookingRequest {
            plz: &zone.plz,
            slots: reservation.slot_pair.slot_ids(),
            qualifikationen: Vec::new(),
            contact: &self.contact,
        };
        let request = self.api.post(&zone.booking_url()).json(&body);
        let request = self.api.authorized(request, &reservation.code, session);

        let response = match self.api.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(zone = %zone.plz, error = %e, "Booking request failed");
                return self.book_in_browser(reservation, shutdown).await;
            }
        };

        let status = response.status();
        if status == StatusCode::CREATED {
            self.announce(reservation).await;
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        let backend: BackendErrors = serde_json::from_str(&text).unwrap_or_default();
        if let Some(conflict) = backend
            .errors
            .iter()
            .find(|e| CONFLICT_CODES.contains(&e.code.as_str()))
        {
            warn!(
                zone = %zone.plz,
                backend_code = %conflict.code,
                text = %conflict.text,
                "Appointment no longer available"
            );
            return Err(Error::AppointmentGone {
                plz: zone.plz.clone(),
                backend_code: conflict.code.clone(),
            });
        }

        warn!(
            zone = %zone.plz,
            status = status.as_u16(),
            body = %truncate(&text, 200),
            "Booking through the API failed"
        );
        self.book_in_browser(reservation, shutdown).await
    }

    async fn announce(&self, reservation: &Reservation) {
        let slots = reservation.slot_pair.describe().join(", ");
        info!(zone = %reservation.zone, slots = %slots, "Appointment booked");
        let message = format!(
            "Booked in {}: {slots}. Check your e-mail for the confirmation.",
            reservation.zone
        );
        notify_best_effort(self.notifier.as_ref(), "Appointment booked", &message).await;
    }

    /// Click through the booking UI; exclusive across the process
    async fn book_in_browser(
        &self,
        reservation: &Reservation,
        shutdown: &ShutdownSignal,
    ) -> Result<()> {
        let _guard = fallback_lock().lock().await;
        let zone = &reservation.zone;
        let manual_link = zone.manual_booking_url(&reservation.code);

        info!(zone = %zone.plz, "Booking through the browser");
        let browser = match self.cookies.launcher().launch().await {
            Ok(browser) => browser,
            Err(e) => {
                error!(error = %e, link = %manual_link, "Browser unavailable, book manually");
                return Err(Error::BookingError {
                    plz: zone.plz.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let outcome = self.drive(browser.as_ref(), reservation, shutdown).await;
        let result = match outcome {
            Ok(true) => {
                self.announce(reservation).await;
                Ok(())
            }
            Ok(false) => {
                error!(zone = %zone.plz, "Automated booking failed");
                error!(link = %manual_link, "Book manually in the open window or in your browser");
                match shutdown.sleep(self.fallback_hold).await {
                    Ok(()) => Err(Error::BookingError {
                        plz: zone.plz.clone(),
                        reason: "confirmation page not shown".to_string(),
                    }),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = browser.close().await {
            warn!(error = %e, "Failed to close browser");
        }
        result
    }

    /// Run every UI step, logging failures; report whether the page confirms
    async fn drive(
        &self,
        browser: &dyn BrowserSession,
        reservation: &Reservation,
        shutdown: &ShutdownSignal,
    ) -> Result<bool> {
        let zone = &reservation.zone;

        match open_with_code(browser, zone, &reservation.code, self.pointer_moves, shutdown).await {
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => error!(error = %e, "Code could not be entered"),
            Ok(()) => {}
        }
        if let Err(e) = browser.select_slot().await {
            error!(error = %e, "Slot could not be selected");
        }
        if let Err(e) = browser.submit_contact_form(&self.contact).await {
            error!(error = %e, "Contact details could not be entered");
        }
        if let Err(e) = browser.confirm_booking().await {
            error!(error = %e, "Booking button could not be pressed");
        }

        shutdown.sleep(self.confirmation_wait).await?;

        match browser.page_source().await {
            Ok(page) => Ok(page.contains(selectors::BOOKED_MARKER)),
            Err(e) => {
                error!(error = %e, "Page could not be read");
                Ok(false)
            }
        }
    }
}
