//! Browser automation seam
//!
//! The engine only talks to [`BrowserSession`] and [`BrowserLauncher`].
//! [`chrome`] drives a real Chrome over DevTools; tests plug in scripted
//! sessions.

pub mod chrome;
pub mod selectors;

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::WAITING_ROOM_MARKER;
use crate::error::Result;
use crate::models::{Contact, Zone};
use crate::session::{Session, ALLOWED_COOKIE, WAITING_ROOM_COOKIE};
use crate::utils::shutdown::ShutdownSignal;

pub use chrome::{ChromeLauncher, ChromeSession};

/// Browser automation failures
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Chrome could not be started
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    /// DevTools call failed
    #[error("Chrome error: {0:#}")]
    Chrome(#[from] anyhow::Error),

    /// Element did not appear in time
    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    /// A browser step did not finish in time
    #[error("Browser step {action} timed out after {after:?}")]
    Timeout {
        action: &'static str,
        after: std::time::Duration,
    },
}

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

/// One open browser window
///
/// Page-level steps are expressed in booking terms; how they map to the
/// DOM is the implementation's business.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> BrowserResult<()>;

    async fn reload(&self) -> BrowserResult<()>;

    async fn page_source(&self) -> BrowserResult<String>;

    /// Value of a single cookie, `None` if unset
    async fn cookie(&self, name: &str) -> BrowserResult<Option<String>>;

    async fn add_cookie(&self, name: &str, value: &str) -> BrowserResult<()>;

    /// All cookies of the current page
    async fn cookies(&self) -> BrowserResult<Session>;

    /// Close the cookie consent banner
    async fn dismiss_consent(&self) -> BrowserResult<()>;

    /// Choose "I have a code", type `code` and submit
    async fn enter_code(&self, code: &str) -> BrowserResult<()>;

    /// Move the pointer by a relative offset
    async fn move_pointer(&self, dx: i64, dy: i64) -> BrowserResult<()>;

    /// Open the appointment search and pick the first offered slot pair
    async fn select_slot(&self) -> BrowserResult<()>;

    async fn submit_contact_form(&self, contact: &Contact) -> BrowserResult<()>;

    /// Press the final booking button
    async fn confirm_booking(&self) -> BrowserResult<()>;

    async fn close(&self) -> BrowserResult<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserSession>>;
}

/// Pause between waiting-room reloads
pub const WAITING_ROOM_RELOAD_DELAY: Duration = Duration::from_secs(5);

/// Load the zone's landing page, get past the waiting room and enter `code`
///
/// Afterwards the pointer is moved `pointer_moves` times with short random
/// pauses. Shared by cookie harvesting and the booking fallback.
pub async fn open_with_code(
    browser: &dyn BrowserSession,
    zone: &Zone,
    code: &str,
    pointer_moves: u32,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    let landing = zone.landing_url();
    browser.goto(&landing).await?;

    loop {
        let Some(pass) = browser.cookie(WAITING_ROOM_COOKIE).await? else {
            break;
        };
        if !browser.page_source().await?.contains(WAITING_ROOM_MARKER) {
            break;
        }
        info!(zone = %zone.plz, "In the waiting room, reloading");
        browser.add_cookie(ALLOWED_COOKIE, &pass).await?;
        shutdown.sleep(WAITING_ROOM_RELOAD_DELAY).await?;
        browser.goto(&landing).await?;
        browser.reload().await?;
    }

    browser.dismiss_consent().await?;
    browser.enter_code(code).await?;

    for _ in 0..pointer_moves {
        let (dx, dy, pause) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(1..=100),
                rng.gen_range(1..=100),
                rng.gen_range(1..=3u64),
            )
        };
        if let Err(e) = browser.move_pointer(dx, dy).await {
            debug!(error = %e, "Pointer move failed");
        }
        shutdown.sleep(Duration::from_secs(pause)).await?;
    }
    Ok(())
}
