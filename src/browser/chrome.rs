//! Chrome over the DevTools protocol via `headless_chrome`
//!
//! `headless_chrome` is blocking, so every step runs on the blocking pool
//! and is cut off after `command_timeout_secs`.

use async_trait::async_trait;
use headless_chrome::browser::tab::point::Point;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::json;
use std::ffi::OsStr;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use super::selectors;
use super::{BrowserError, BrowserLauncher, BrowserResult, BrowserSession};
use crate::config::BrowserConfig;
use crate::models::Contact;
use crate::session::Session;
use crate::utils::local_phone;

const CHROME_ARGS: [&str; 3] = [
    "--disable-infobars",
    "--disable-dev-shm-usage",
    // headless Chrome hangs without an explicit user agent
    "--user-agent=Mozilla/5.0",
];

/// Launch options for the booking UI
///
/// The idle timeout has to outlast the manual window and the fallback
/// hold, during which no DevTools traffic happens.
pub fn launch_options(config: &BrowserConfig) -> BrowserResult<LaunchOptions<'static>> {
    let idle = config.manual_window_secs.max(config.fallback_hold_secs)
        + config.command_timeout_secs;

    LaunchOptions::default_builder()
        .headless(config.headless)
        .path(config.chrome_binary.clone())
        .idle_browser_timeout(Duration::from_secs(idle))
        .args(CHROME_ARGS.into_iter().map(OsStr::new).collect())
        .ignore_default_args(vec![OsStr::new("--enable-automation")])
        .build()
        .map_err(|e| BrowserError::Launch(e.to_string()))
}

/// Await `task`, giving up after `limit`
///
/// A blocking DevTools call cannot be cancelled; the caller is released
/// and the worker thread finishes on its own.
pub async fn bounded<T, F>(action: &'static str, limit: Duration, task: F) -> BrowserResult<T>
where
    F: Future<Output = Result<BrowserResult<T>, tokio::task::JoinError>>,
{
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(BrowserError::Chrome(anyhow::anyhow!("{action} worker failed: {e}"))),
        Err(_) => Err(BrowserError::Timeout {
            action,
            after: limit,
        }),
    }
}

pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    tab: Arc<Tab>,
    pointer: Mutex<(f64, f64)>,
    command_timeout: Duration,
}

impl std::fmt::Debug for ChromeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromeSession")
            .field("url", &self.tab.get_url())
            .finish_non_exhaustive()
    }
}

impl ChromeSession {
    /// Run `op` against the tab on the blocking pool
    async fn on_tab<T, F>(&self, action: &'static str, op: F) -> BrowserResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> BrowserResult<T> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        let task = tokio::task::spawn_blocking(move || op(&tab));
        bounded(action, self.command_timeout, task).await
    }

    async fn click(&self, xpath: &str) -> BrowserResult<()> {
        let xpath = xpath.to_string();
        self.on_tab("click", move |tab| {
            let element = tab
                .wait_for_xpath(&xpath)
                .map_err(|_| BrowserError::ElementNotFound { selector: xpath })?;
            element.click()?;
            Ok(())
        })
        .await
    }

    async fn type_into(&self, xpath: &str, text: &str) -> BrowserResult<()> {
        let xpath = xpath.to_string();
        let text = text.to_string();
        self.on_tab("type", move |tab| {
            let element = tab
                .wait_for_xpath(&xpath)
                .map_err(|_| BrowserError::ElementNotFound { selector: xpath })?;
            element.focus()?.type_into(&text)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        let url = url.to_string();
        self.on_tab("goto", move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn reload(&self) -> BrowserResult<()> {
        self.on_tab("reload", |tab| {
            tab.reload(false, None)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn page_source(&self) -> BrowserResult<String> {
        self.on_tab("page_source", |tab| Ok(tab.get_content()?)).await
    }

    async fn cookie(&self, name: &str) -> BrowserResult<Option<String>> {
        let name = name.to_string();
        self.on_tab("cookie", move |tab| {
            Ok(tab
                .get_cookies()?
                .into_iter()
                .find(|c| c.name == name)
                .map(|c| c.value))
        })
        .await
    }

    async fn add_cookie(&self, name: &str, value: &str) -> BrowserResult<()> {
        // url is filled in from the current page
        let param: CookieParam = serde_json::from_value(json!({ "name": name, "value": value }))
            .map_err(|e| BrowserError::Chrome(anyhow::anyhow!("cookie {name}: {e}")))?;
        self.on_tab("add_cookie", move |tab| {
            tab.set_cookies(vec![param])?;
            Ok(())
        })
        .await
    }

    async fn cookies(&self) -> BrowserResult<Session> {
        self.on_tab("cookies", |tab| {
            Ok(tab
                .get_cookies()?
                .into_iter()
                .map(|c| (c.name, c.value))
                .collect())
        })
        .await
    }

    async fn dismiss_consent(&self) -> BrowserResult<()> {
        self.click(selectors::CONSENT_CLOSE).await
    }

    async fn enter_code(&self, code: &str) -> BrowserResult<()> {
        self.click(selectors::HAVE_CODE).await?;
        self.type_into(selectors::CODE_INPUT, code).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.click(selectors::CODE_SUBMIT).await
    }

    async fn move_pointer(&self, dx: i64, dy: i64) -> BrowserResult<()> {
        let target = {
            let mut pointer = self
                .pointer
                .lock()
                .map_err(|_| BrowserError::Chrome(anyhow::anyhow!("pointer state poisoned")))?;
            pointer.0 += dx as f64;
            pointer.1 += dy as f64;
            Point {
                x: pointer.0,
                y: pointer.1,
            }
        };
        self.on_tab("move_pointer", move |tab| {
            tab.move_mouse_to_point(target)?;
            Ok(())
        })
        .await
    }

    async fn select_slot(&self) -> BrowserResult<()> {
        self.click(selectors::OPEN_SLOT_SEARCH).await?;
        self.click(selectors::FIRST_SLOT).await?;
        self.click(selectors::SLOT_SUBMIT).await
    }

    async fn submit_contact_form(&self, contact: &Contact) -> BrowserResult<()> {
        self.click(selectors::OPEN_CONTACT_FORM).await?;
        self.click(&selectors::salutation(&contact.salutation)).await?;

        let fields = [
            ("firstname", contact.first_name.as_str()),
            ("lastname", contact.last_name.as_str()),
            ("zip", contact.plz.as_str()),
            ("city", contact.city.as_str()),
            ("street", contact.street.as_str()),
            ("housenumber", contact.house_number.as_str()),
            ("phone", local_phone(&contact.phone)),
            ("notificationReceiver", contact.notification_receiver.as_str()),
        ];
        for (control, text) in fields {
            self.type_into(&selectors::contact_input(control), text).await?;
        }

        self.click(selectors::CONTACT_SUBMIT).await
    }

    async fn confirm_booking(&self) -> BrowserResult<()> {
        self.click(selectors::CONFIRM_BOOKING).await
    }

    async fn close(&self) -> BrowserResult<()> {
        let browser = self
            .browser
            .lock()
            .map_err(|_| BrowserError::Chrome(anyhow::anyhow!("browser state poisoned")))?
            .take();
        self.on_tab("close", move |tab| {
            if let Err(e) = tab.close(false) {
                debug!(error = %e, "Tab already gone");
            }
            // dropping the handle stops Chrome
            drop(browser);
            Ok(())
        })
        .await
    }
}

/// Starts a fresh Chrome per browser session
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserSession>> {
        let options = launch_options(&self.config)?;
        let element_timeout = Duration::from_secs(self.config.element_timeout_secs);
        let command_timeout = Duration::from_secs(self.config.command_timeout_secs);

        let task = tokio::task::spawn_blocking(move || -> BrowserResult<_> {
            let browser =
                Browser::new(options).map_err(|e| BrowserError::Launch(format!("{e:#}")))?;
            let tab = browser
                .new_tab()
                .map_err(|e| BrowserError::Launch(format!("{e:#}")))?;
            tab.set_default_timeout(element_timeout);
            Ok((browser, tab))
        });
        let (browser, tab) = bounded("launch", command_timeout, task).await?;

        info!(headless = self.config.headless, "Browser started");
        Ok(Box::new(ChromeSession {
            browser: Mutex::new(Some(browser)),
            tab,
            pointer: Mutex::new((0.0, 0.0)),
            command_timeout,
        }))
    }
}
