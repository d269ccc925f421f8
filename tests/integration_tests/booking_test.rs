//! Booking through the API and the browser fallback

use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use terminjaeger::api::ApiClient;
use terminjaeger::booking::BookingExecutor;
use terminjaeger::cookies::CookieProvider;
use terminjaeger::error::Error;
use terminjaeger::models::{Reservation, SlotPair};
use terminjaeger::utils::shutdown::ShutdownSignal;

use crate::common::{
    contact, local_millis, test_config, zone, RecordingNotifier, ScriptedLauncher, AUTH_A, CODE_A,
};

const PLZ: &str = "69123";

fn executor(
    server: &MockServer,
    launcher: Arc<ScriptedLauncher>,
    notifier: Arc<RecordingNotifier>,
    fresh_cookies: bool,
) -> BookingExecutor {
    let mut config = test_config(&server.uri());
    config.booking.fresh_cookies = fresh_cookies;
    let api = Arc::new(ApiClient::new(&config).unwrap());
    let cookies = Arc::new(CookieProvider::new(launcher, &config));
    BookingExecutor::new(api, cookies, notifier, contact(), &config)
}

fn reservation(server: &MockServer) -> Reservation {
    let pair: SlotPair = serde_json::from_value(json!([
        {"slotId": "slot-1", "begin": local_millis(2031, 6, 3, 9, 0)},
        {"slotId": "slot-2", "begin": local_millis(2031, 7, 15, 9, 0)}
    ]))
    .unwrap();
    Reservation {
        code: CODE_A.to_string(),
        zone: zone(&format!("{}/", server.uri()), PLZ),
        slot_pair: pair,
    }
}

async fn mount_booking(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/rest/buchung"))
        .and(header("authorization", AUTH_A))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_conflict_reports_appointment_gone() {
    let server = MockServer::start().await;
    mount_booking(
        &server,
        ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{"code": "WP011", "text": "Termin nicht mehr verfügbar"}]
        })),
    )
    .await;

    let launcher = Arc::new(ScriptedLauncher::with_cookies());
    let notifier = Arc::new(RecordingNotifier::default());
    let booking = executor(&server, launcher.clone(), notifier.clone(), false);

    let err = booking
        .book(&reservation(&server), None, &ShutdownSignal::never())
        .await
        .unwrap_err();

    match err {
        Error::AppointmentGone { plz, backend_code } => {
            assert_eq!(plz, PLZ);
            assert_eq!(backend_code, "WP011");
        }
        other => panic!("expected AppointmentGone, got {other}"),
    }
    assert_eq!(launcher.launch_count(), 0);
    assert!(notifier.titles().is_empty());
}

#[tokio::test]
async fn test_wp009_is_a_conflict_too() {
    let server = MockServer::start().await;
    mount_booking(
        &server,
        ResponseTemplate::new(409).set_body_json(json!({"errors": [{"code": "WP009"}]})),
    )
    .await;

    let booking = executor(
        &server,
        Arc::new(ScriptedLauncher::with_cookies()),
        Arc::new(RecordingNotifier::default()),
        false,
    );
    let err = booking
        .book(&reservation(&server), None, &ShutdownSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AppointmentGone { .. }));
}

#[tokio::test]
async fn test_api_failure_falls_back_to_browser() {
    let server = MockServer::start().await;
    mount_booking(&server, ResponseTemplate::new(500)).await;

    let launcher = Arc::new(
        ScriptedLauncher::with_cookies().showing("<h1>Ihr Termin am 03.06.2031 um 09:00</h1>"),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let booking = executor(&server, launcher.clone(), notifier.clone(), false);

    booking
        .book(&reservation(&server), None, &ShutdownSignal::never())
        .await
        .unwrap();

    let calls = launcher.log.calls();
    assert!(calls[0].starts_with("goto ") && calls[0].contains("impftermine/service?plz=69123"));
    assert!(launcher.log.contains(&format!("enter_code {CODE_A}")));
    assert!(launcher.log.contains("select_slot"));
    assert!(launcher.log.contains("submit_contact_form Mustermann"));
    assert!(launcher.log.contains("confirm_booking"));
    assert_eq!(calls.last().map(String::as_str), Some("close"));
    assert_eq!(notifier.titles(), vec!["Appointment booked"]);
}

#[tokio::test]
async fn test_fallback_without_confirmation_fails() {
    let server = MockServer::start().await;
    mount_booking(&server, ResponseTemplate::new(500)).await;

    let launcher = Arc::new(ScriptedLauncher::with_cookies().showing("<h1>Fehler</h1>"));
    let notifier = Arc::new(RecordingNotifier::default());
    let booking = executor(&server, launcher.clone(), notifier.clone(), false);

    let err = booking
        .book(&reservation(&server), None, &ShutdownSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BookingError { ref plz, .. } if plz == PLZ));
    assert!(launcher.log.contains("close"));
    assert!(notifier.titles().is_empty());
}

#[tokio::test]
async fn test_fallback_without_browser_fails() {
    let server = MockServer::start().await;
    mount_booking(&server, ResponseTemplate::new(502)).await;

    let launcher = Arc::new(ScriptedLauncher::failing());
    let booking = executor(
        &server,
        launcher.clone(),
        Arc::new(RecordingNotifier::default()),
        false,
    );

    let err = booking
        .book(&reservation(&server), None, &ShutdownSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BookingError { .. }));
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test]
async fn test_fresh_cookies_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/buchung"))
        .and(header(
            "cookie",
            "akavpau_User_allowed=1700000000~id=abc; bm_sz=A1B2C3D4E5F6G7H8",
        ))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let launcher = Arc::new(ScriptedLauncher::with_cookies());
    let booking = executor(
        &server,
        launcher.clone(),
        Arc::new(RecordingNotifier::default()),
        true,
    );

    booking
        .book(&reservation(&server), None, &ShutdownSignal::never())
        .await
        .unwrap();
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test]
async fn test_missing_cookies_skip_the_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/buchung"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let launcher = Arc::new(ScriptedLauncher::without_cookies());
    let booking = executor(
        &server,
        launcher.clone(),
        Arc::new(RecordingNotifier::default()),
        true,
    );

    let err = booking
        .book(&reservation(&server), None, &ShutdownSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BookingError { .. }));
    // One launch for the cookies, one for the fallback
    assert_eq!(launcher.launch_count(), 2);
}
