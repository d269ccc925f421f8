//! Bot-mitigation cookies from a scripted browser run
//!
//! The backend only answers API calls that carry the cookies its bot
//! protection sets in a real browser. [`CookieProvider`] opens a zone's
//! landing page, enters a made-up access code and harvests them.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::{open_with_code, BrowserLauncher, BrowserSession};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::Zone;
use crate::session::Session;
use crate::utils::shutdown::ShutdownSignal;
use crate::utils::synthetic_code;

pub struct CookieProvider {
    launcher: Arc<dyn BrowserLauncher>,
    manual_window: Duration,
    pointer_moves: u32,
}

impl CookieProvider {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: &Config) -> Self {
        Self {
            launcher,
            manual_window: config.manual_window(),
            pointer_moves: config.browser.pointer_moves,
        }
    }

    pub fn launcher(&self) -> &Arc<dyn BrowserLauncher> {
        &self.launcher
    }

    /// Run a browser session against `zone` and return the required cookies
    ///
    /// With `manual` set, a human gets the manual window to click around
    /// before the cookies are read. The browser is closed in every case.
    pub async fn acquire(
        &self,
        zone: &Zone,
        manual: bool,
        shutdown: &ShutdownSignal,
    ) -> Result<Session> {
        info!(zone = %zone.plz, manual = manual, "Generating browser cookies");

        let browser = self
            .launcher
            .launch()
            .await
            .map_err(|e| Error::CookieGenerationFailed {
                reason: e.to_string(),
            })?;

        let result = self.harvest(browser.as_ref(), zone, manual, shutdown).await;

        if let Err(e) = browser.close().await {
            warn!(error = %e, "Failed to close browser");
        }
        result
    }

    async fn harvest(
        &self,
        browser: &dyn BrowserSession,
        zone: &Zone,
        manual: bool,
        shutdown: &ShutdownSignal,
    ) -> Result<Session> {
        let code = synthetic_code(&mut rand::thread_rng());

        open_with_code(browser, zone, &code, self.pointer_moves, shutdown)
            .await
            .map_err(as_cookie_failure)?;

        if manual {
            warn!(
                seconds = self.manual_window.as_secs(),
                "Click around in the browser window now, it closes automatically"
            );
            shutdown.sleep(self.manual_window).await?;
        }

        let mut session = browser
            .cookies()
            .await
            .map_err(|e| as_cookie_failure(e.into()))?;
        session.retain_required();

        let missing = session.missing_required();
        if !missing.is_empty() {
            return Err(Error::CookieGenerationFailed {
                reason: format!("missing cookie(s): {}", missing.join(", ")),
            });
        }

        info!(cookie = %session.fingerprint(), "Browser cookies generated");
        Ok(session)
    }
}

fn as_cookie_failure(err: Error) -> Error {
    match err {
        Error::Browser(e) => Error::CookieGenerationFailed {
            reason: e.to_string(),
        },
        other => other,
    }
}
