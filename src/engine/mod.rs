//! Search loop: round-robin over target zones until one booking succeeds
//!
//! ```text
//!   ┌─────────────┐   next zone    ┌──────────────┐  candidate  ┌─────────┐
//!   │  Searching  │ ─────────────▶ │ ReservationF │ ──────────▶ │ Booking │
//!   │             │ ◀───────────── │    inder     │             │         │
//!   └─────────────┘  pool update   └──────────────┘             └────┬────┘
//!          ▲                                                          │ 201
//!          └──────────────────── conflict / failure ──────────────────┤
//!                                                                     ▼
//!                                                               ┌─────────┐
//!                                                               │ Booked  │
//!                                                               └─────────┘
//! ```

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::booking::BookingExecutor;
use crate::browser::{BrowserLauncher, ChromeLauncher};
use crate::catalog::{load_qualifications, log_qualifications, ZoneCatalog};
use crate::codepool::CodePool;
use crate::config::Config;
use crate::cookies::CookieProvider;
use crate::error::{Error, Result};
use crate::filter::TimeWindow;
use crate::finder::ReservationFinder;
use crate::models::{Reservation, Zone};
use crate::notify::{notify_best_effort, LogNotifier, Notifier};
use crate::profile::Profile;
use crate::session::Session;
use crate::utils::mask_code;
use crate::utils::retry::RetryPolicy;
use crate::utils::shutdown::ShutdownSignal;
use crate::validation::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Searching,
    /// Terminal
    Booked,
}

/// What a single iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Booked(Reservation),
    /// Nothing offered, or the waiting room answered
    NothingFound,
    /// Every code of the zone's host is cooling down
    NoUsableCode,
    /// Zone is deprioritised after repeated conflicts
    ZoneSkipped,
    CodeRemoved,
    TimeframeMissed,
    AppointmentGone,
    SessionRenewed,
    /// Logged and ignored
    Failed,
    /// The engine already booked
    Finished,
}

/// How [`Terminsuche::run`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Booked(Reservation),
    Cancelled,
    /// No target zone has a code left
    CodesExhausted,
}

#[derive(Debug, Clone, Default)]
struct ZoneHealth {
    gone_streak: u32,
    skip_until: Option<DateTime<Utc>>,
}

pub struct Terminsuche {
    targets: Vec<Zone>,
    window: Option<TimeWindow>,
    pool: CodePool,
    finder: ReservationFinder,
    booking: BookingExecutor,
    cookies: Arc<CookieProvider>,
    notifier: Arc<dyn Notifier>,
    cookie_retry: RetryPolicy,
    session: Option<Session>,
    shutdown: ShutdownSignal,
    cursor: usize,
    state: EngineState,
    health: HashMap<String, ZoneHealth>,
    poll_delay: Duration,
    cool_down: chrono::Duration,
    gone_streak_limit: u32,
    zone_penalty: chrono::Duration,
}

pub struct TerminsucheBuilder {
    profile: Profile,
    config: Config,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    notifier: Option<Arc<dyn Notifier>>,
    shutdown: Option<ShutdownSignal>,
    catalog: Option<ZoneCatalog>,
}

impl TerminsucheBuilder {
    pub fn launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Use this catalog instead of downloading one
    pub fn catalog(mut self, catalog: ZoneCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Validate the profile, load the catalog and set up the code pools
    ///
    /// Validation happens before any network access and is fatal. The
    /// catalog download is retried with a fixed delay.
    pub async fn build(self) -> Result<Terminsuche> {
        let Self {
            profile,
            config,
            launcher,
            notifier,
            shutdown,
            catalog,
        } = self;

        config.validate()?;
        let window = profile.validate()?;
        let shutdown = shutdown.unwrap_or_else(ShutdownSignal::never);

        let api = Arc::new(ApiClient::new(&config)?);

        let catalog = match catalog {
            Some(catalog) => catalog,
            None => load_catalog(&api, &config, &shutdown).await?,
        };

        let targets = resolve_targets(&catalog, &profile.target_zones)?;

        if let Some(host) = catalog.hosts().next() {
            match load_qualifications(&api, host).await {
                Ok(list) => log_qualifications(&list),
                Err(e) => warn!(error = %e, "Vaccine list unavailable"),
            }
        }

        let pool = CodePool::new(catalog.hosts(), &profile.codes);

        let launcher = launcher
            .unwrap_or_else(|| Arc::new(ChromeLauncher::new(config.browser.clone())));
        let notifier = notifier.unwrap_or_else(|| Arc::new(LogNotifier::new(true)));

        let cookies = Arc::new(CookieProvider::new(launcher, &config));
        let finder = ReservationFinder::new(Arc::clone(&api), Arc::clone(&notifier));
        let booking = BookingExecutor::new(
            Arc::clone(&api),
            Arc::clone(&cookies),
            Arc::clone(&notifier),
            profile.contact.clone(),
            &config,
        );

        info!(
            contact = %format!("{} {}", profile.contact.first_name, profile.contact.last_name),
            zones = ?targets.iter().map(|z| z.plz.as_str()).collect::<Vec<_>>(),
            codes = profile.codes.len(),
            "Search configured"
        );

        Ok(Terminsuche {
            targets,
            window,
            pool,
            finder,
            booking,
            cookies,
            notifier,
            cookie_retry: RetryPolicy::fixed(
                config.retry.cookie_attempts,
                Duration::from_secs(config.retry.cookie_delay_secs),
            ),
            session: None,
            shutdown,
            cursor: 0,
            state: EngineState::Searching,
            health: HashMap::new(),
            poll_delay: config.poll_delay(),
            cool_down: config.cool_down(),
            gone_streak_limit: config.search.gone_streak_limit,
            zone_penalty: config.zone_penalty(),
        })
    }
}

async fn load_catalog(
    api: &ApiClient,
    config: &Config,
    shutdown: &ShutdownSignal,
) -> Result<ZoneCatalog> {
    let policy = RetryPolicy {
        max_attempts: match config.search.catalog_max_attempts {
            0 => None,
            n => Some(n),
        },
        ..RetryPolicy::forever(config.catalog_retry_delay())
    }
    .with_classifier(|e| matches!(e, Error::CatalogUnavailable { .. }));

    let url = config.api.catalog_url.as_str();
    policy
        .run(shutdown, move || ZoneCatalog::load(api, url))
        .await
}

/// Look up every target PLZ; unknown ones are a validation error
fn resolve_targets(catalog: &ZoneCatalog, plzs: &[String]) -> Result<Vec<Zone>> {
    let mut targets = Vec::with_capacity(plzs.len());
    for plz in plzs {
        let zone = catalog.by_plz(plz).ok_or_else(|| {
            ValidationError::new("plz_impfzentren", format!("zone \"{plz}\" not in the catalog"))
        })?;
        if !targets.iter().any(|z: &Zone| z.plz == zone.plz) {
            targets.push(zone.clone());
        }
    }
    if targets.is_empty() {
        return Err(ValidationError::new("plz_impfzentren", "no target zone").into());
    }
    Ok(targets)
}

impl Terminsuche {
    pub fn builder(profile: Profile, config: Config) -> TerminsucheBuilder {
        TerminsucheBuilder {
            profile,
            config,
            launcher: None,
            notifier: None,
            shutdown: None,
            catalog: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn pool(&self) -> &CodePool {
        &self.pool
    }

    pub fn targets(&self) -> &[Zone] {
        &self.targets
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether `plz` is currently deprioritised
    pub fn is_zone_skipped(&self, plz: &str) -> bool {
        self.health
            .get(plz)
            .and_then(|h| h.skip_until)
            .is_some_and(|until| until > Utc::now())
    }

    fn target_hosts(&self) -> BTreeSet<&str> {
        self.targets.iter().map(|z| z.host_url.as_str()).collect()
    }

    /// True once no target host has any code left
    pub fn codes_exhausted(&self) -> bool {
        self.target_hosts().iter().all(|h| self.pool.is_empty(h))
    }

    /// Poll until a booking succeeds, shutdown is requested or codes run out
    pub async fn run(&mut self) -> Result<Outcome> {
        info!(zones = self.targets.len(), "Search started");

        loop {
            if self.codes_exhausted() {
                error!("No valid code left for any target zone");
                return Ok(Outcome::CodesExhausted);
            }

            match self.step().await {
                Ok(IterationOutcome::Booked(reservation)) => return Ok(Outcome::Booked(reservation)),
                Ok(outcome) => debug!(outcome = ?outcome, "Iteration finished"),
                Err(Error::Cancelled) => return Ok(Outcome::Cancelled),
                Err(e) => return Err(e),
            }

            match self.shutdown.sleep(self.poll_delay).await {
                Ok(()) => {}
                Err(Error::Cancelled) => return Ok(Outcome::Cancelled),
                Err(e) => return Err(e),
            }
        }
    }

    /// One search of one zone with one code
    ///
    /// Only cancellation is returned as an error; everything else is
    /// logged and turned into a pool update.
    pub async fn step(&mut self) -> Result<IterationOutcome> {
        if self.state == EngineState::Booked {
            return Ok(IterationOutcome::Finished);
        }
        self.shutdown.check()?;

        let zone = self.targets[self.cursor].clone();
        let outcome = self.poll_zone(&zone).await;
        self.advance();
        outcome
    }

    fn advance(&mut self) {
        self.cursor += 1;
        if self.cursor >= self.targets.len() {
            self.cursor = 0;
            let hosts: Vec<String> = self.target_hosts().into_iter().map(String::from).collect();
            for host in hosts {
                self.pool.rotate(&host);
            }
        }
    }

    async fn poll_zone(&mut self, zone: &Zone) -> Result<IterationOutcome> {
        let host = zone.host_url.as_str();

        if self.is_zone_skipped(&zone.plz) {
            debug!(zone = %zone.plz, "Zone deprioritised, skipping");
            return Ok(IterationOutcome::ZoneSkipped);
        }

        let Some(codepoint) = self.pool.usable(host) else {
            if self.pool.is_empty(host) {
                warn!(zone = %zone.plz, "No valid code left for this zone");
            } else {
                debug!(zone = %zone.plz, "All codes cooling down");
            }
            return Ok(IterationOutcome::NoUsableCode);
        };
        let code = codepoint.code;

        let found = self
            .finder
            .search(zone, &code, self.window.as_ref(), self.session.as_ref())
            .await;

        match found {
            Ok(Some(reservation)) => self.book(reservation).await,
            Ok(None) => {
                self.reset_streak(&zone.plz);
                Ok(IterationOutcome::NothingFound)
            }
            Err(Error::UnmatchingCode { .. }) => {
                info!(zone = %zone.plz, code = %mask_code(&code), "Code not valid for this zone, dropping it");
                self.pool.remove(host, &code);
                self.reset_streak(&zone.plz);
                Ok(IterationOutcome::CodeRemoved)
            }
            Err(Error::TimeframeMissed { rejected, .. }) => {
                info!(zone = %zone.plz, rejected = rejected, "No offered slot fits the time window");
                self.pool.cool_down(host, &code, self.cool_down);
                self.reset_streak(&zone.plz);
                Ok(IterationOutcome::TimeframeMissed)
            }
            Err(Error::BotMitigation { .. }) => {
                warn!(zone = %zone.plz, "Blocked by bot protection, cookies have to be generated manually");
                self.renew_session(zone).await
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!(
                    zone = %zone.plz,
                    code = %mask_code(&code),
                    category = e.category().as_str(),
                    error = %e,
                    "Search failed"
                );
                Ok(IterationOutcome::Failed)
            }
        }
    }

    async fn book(&mut self, reservation: Reservation) -> Result<IterationOutcome> {
        let zone = &reservation.zone;
        let host = zone.host_url.as_str();

        match self
            .booking
            .book(&reservation, self.session.as_ref(), &self.shutdown)
            .await
        {
            Ok(()) => {
                self.state = EngineState::Booked;
                self.reset_streak(&zone.plz);
                Ok(IterationOutcome::Booked(reservation))
            }
            Err(Error::AppointmentGone { .. }) => {
                self.pool.rotate(host);
                self.pool.cool_down(host, &reservation.code, self.cool_down);
                self.record_gone(&zone.plz);
                let message = format!("The offered slot in {zone} was taken, searching on.");
                notify_best_effort(
                    self.notifier.as_ref(),
                    "Appointment no longer available",
                    &message,
                )
                .await;
                Ok(IterationOutcome::AppointmentGone)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                error!(
                    zone = %zone.plz,
                    code = %mask_code(&reservation.code),
                    category = e.category().as_str(),
                    error = %e,
                    "Booking failed"
                );
                self.reset_streak(&zone.plz);
                if matches!(e, Error::BookingError { .. }) {
                    let message = format!("Booking in {zone} failed: {e}");
                    notify_best_effort(
                        self.notifier.as_ref(),
                        "Appointment could not be booked",
                        &message,
                    )
                    .await;
                }
                Ok(IterationOutcome::Failed)
            }
        }
    }

    async fn renew_session(&mut self, zone: &Zone) -> Result<IterationOutcome> {
        let cookies = self.cookies.as_ref();
        let shutdown = &self.shutdown;
        let renewed = self
            .cookie_retry
            .run(shutdown, move || cookies.acquire(zone, true, shutdown))
            .await;

        match renewed {
            Ok(session) => {
                self.session = Some(session);
                Ok(IterationOutcome::SessionRenewed)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                error!(zone = %zone.plz, error = %e, "Cookie renewal failed");
                Ok(IterationOutcome::Failed)
            }
        }
    }

    fn reset_streak(&mut self, plz: &str) {
        if let Some(health) = self.health.get_mut(plz) {
            health.gone_streak = 0;
        }
    }

    fn record_gone(&mut self, plz: &str) {
        let health = self.health.entry(plz.to_string()).or_default();
        health.gone_streak += 1;
        if health.gone_streak >= self.gone_streak_limit {
            let until = Utc::now() + self.zone_penalty;
            warn!(
                zone = %plz,
                streak = health.gone_streak,
                until = %until,
                "Slots keep disappearing, skipping zone for a while"
            );
            health.gone_streak = 0;
            health.skip_until = Some(until);
        }
    }
}
