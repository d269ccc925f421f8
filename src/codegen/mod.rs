//! Access code issuance: request an SMS PIN, then verify it
//!
//! Both calls need bot-mitigation cookies. A 429 answer means the cookies
//! were rejected; they are then regenerated with a human at the browser.

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::api::{truncate, with_cookies, ApiClient};
use crate::config::Config;
use crate::cookies::CookieProvider;
use crate::error::{Error, Result};
use crate::models::Zone;
use crate::session::Session;
use crate::utils::shutdown::ShutdownSignal;
use crate::validation::{validate_email, validate_phone, validate_plz, ValidationError};

/// Body the backend sends once the daily request limit is used up
const LIMIT_REACHED: &str = "Anfragelimit erreicht.";

/// Who the code is requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRequest {
    pub plz: String,
    pub email: String,
    pub phone: String,
    pub birthday: NaiveDate,
}

impl CodeRequest {
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        validate_plz(&self.plz)?;
        validate_email(&self.email)?;
        validate_phone(&self.phone)
    }
}

#[derive(Serialize)]
struct PinRequestBody<'a> {
    plz: &'a str,
    email: &'a str,
    phone: &'a str,
    birthday: String,
    einzeltermin: bool,
}

#[derive(Serialize)]
struct PinVerificationBody<'a> {
    token: &'a str,
    smspin: &'a str,
}

/// A requested code waiting for its SMS PIN
#[derive(Debug, Clone)]
pub struct PendingCode {
    pub token: String,
    pub zone: Zone,
    session: Option<Session>,
}

/// Outcome of one exchange with the backend
enum Step<T> {
    Done(Result<T>),
    Retry,
}

pub struct CodeRequester {
    api: Arc<ApiClient>,
    cookies: Arc<CookieProvider>,
    retry_delay: Duration,
}

impl CodeRequester {
    pub fn new(api: Arc<ApiClient>, cookies: Arc<CookieProvider>, config: &Config) -> Self {
        Self {
            api,
            cookies,
            retry_delay: Duration::from_secs(config.retry.code_request_delay_secs),
        }
    }

    /// Ask the backend to send an SMS PIN for a new access code
    pub async fn request(
        &self,
        zone: &Zone,
        request: &CodeRequest,
        shutdown: &ShutdownSignal,
    ) -> Result<PendingCode> {
        let body = PinRequestBody {
            plz: &request.plz,
            email: &request.email,
            phone: &request.phone,
            birthday: request.birthday.format("%Y-%m-%d").to_string(),
            einzeltermin: false,
        };
        let body = serde_json::to_value(&body)?;
        let url = format!("{}rest/smspin/anforderung", zone.host_url);

        let mut session = None;
        let token = self
            .exchange(zone, &url, &body, &mut session, shutdown, classify_pin_request)
            .await?;

        info!(zone = %zone.plz, "SMS PIN requested");
        Ok(PendingCode {
            token,
            zone: zone.clone(),
            session,
        })
    }

    /// Confirm the code with the PIN from the SMS; `false` if the PIN is wrong
    pub async fn verify(
        &self,
        pending: &mut PendingCode,
        pin: &str,
        shutdown: &ShutdownSignal,
    ) -> Result<bool> {
        let body = serde_json::to_value(PinVerificationBody {
            token: &pending.token,
            smspin: pin.trim(),
        })?;
        let url = format!("{}rest/smspin/verifikation", pending.zone.host_url);
        let zone = pending.zone.clone();

        self.exchange(
            &zone,
            &url,
            &body,
            &mut pending.session,
            shutdown,
            classify_pin_verification,
        )
        .await
    }

    async fn exchange<T>(
        &self,
        zone: &Zone,
        url: &str,
        body: &Value,
        session: &mut Option<Session>,
        shutdown: &ShutdownSignal,
        classify: fn(StatusCode, &str) -> Step<T>,
    ) -> Result<T> {
        let mut manual = false;

        loop {
            shutdown.check()?;

            let current = match session.clone() {
                Some(s) => s,
                None => match self.cookies.acquire(zone, manual, shutdown).await {
                    Ok(s) => {
                        *session = Some(s.clone());
                        s
                    }
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(e) => {
                        error!(error = %e, "Cookie generation failed");
                        shutdown.sleep(self.retry_delay).await?;
                        continue;
                    }
                },
            };

            let request = with_cookies(self.api.post(url).json(body), Some(&current));
            let response = match self.api.send(request).await {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "Request failed, retrying in {}s", self.retry_delay.as_secs());
                    shutdown.sleep(self.retry_delay).await?;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("Blocked by bot protection, cookies have to be generated manually");
                *session = None;
                manual = true;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            match classify(status, &text) {
                Step::Done(result) => return result,
                Step::Retry => {
                    error!(
                        status = status.as_u16(),
                        body = %truncate(&text, 200),
                        "Unexpected answer, retrying in {}s",
                        self.retry_delay.as_secs()
                    );
                    shutdown.sleep(self.retry_delay).await?;
                }
            }
        }
    }
}

fn is_limit_reached(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(|e| e == LIMIT_REACHED))
        .unwrap_or(false)
}

fn classify_pin_request(status: StatusCode, body: &str) -> Step<String> {
    if status == StatusCode::BAD_REQUEST && is_limit_reached(body) {
        return Step::Done(Err(Error::RequestLimitReached));
    }
    if !status.is_success() {
        return Step::Retry;
    }
    let token = serde_json::from_str::<Value>(body)
        .map_err(Error::from)
        .and_then(|v| {
            v.get("token")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::decode("token missing in response"))
        });
    Step::Done(token)
}

fn classify_pin_verification(status: StatusCode, _body: &str) -> Step<bool> {
    if status == StatusCode::BAD_REQUEST {
        return Step::Done(Ok(false));
    }
    if status.is_success() {
        return Step::Done(Ok(true));
    }
    Step::Retry
}
