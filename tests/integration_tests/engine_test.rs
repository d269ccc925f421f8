//! Search loop scenarios against a mock backend

use chrono::Utc;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use terminjaeger::engine::{EngineState, IterationOutcome, Outcome, Terminsuche};
use terminjaeger::error::Error;
use terminjaeger::utils::shutdown;

use crate::common::{
    catalog, local_millis, profile, search_body, test_config, RecordingNotifier,
    ScriptedLauncher, AUTH_A, AUTH_B, CODE_A, CODE_B,
};

const PLZ: &str = "70629";

async fn engine(
    server: &MockServer,
    codes: &[&str],
    window: serde_json::Value,
    launcher: Arc<ScriptedLauncher>,
    notifier: Arc<RecordingNotifier>,
) -> Terminsuche {
    Terminsuche::builder(profile(codes, &[PLZ], window), test_config(&server.uri()))
        .catalog(catalog(&server.uri(), &[PLZ]))
        .launcher(launcher)
        .notifier(notifier)
        .build()
        .await
        .unwrap()
}

fn offer() -> serde_json::Value {
    search_body(local_millis(2031, 6, 3, 9, 0), local_millis(2031, 7, 15, 9, 0))
}

#[tokio::test]
async fn test_books_matching_offer_in_one_iteration() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .and(query_param("plz", PLZ))
        .and(header("authorization", AUTH_A))
        .respond_with(ResponseTemplate::new(200).set_body_json(offer()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/buchung"))
        .and(body_partial_json(json!({
            "plz": PLZ,
            "slots": ["slot-1", "slot-2"],
            "contact": {"nachname": "Mustermann"}
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let launcher = Arc::new(ScriptedLauncher::failing());
    let mut engine = engine(&server, &[CODE_A], json!({}), launcher.clone(), notifier.clone()).await;

    let outcome = engine.step().await.unwrap();
    match outcome {
        IterationOutcome::Booked(reservation) => {
            assert_eq!(reservation.code, CODE_A);
            assert_eq!(reservation.zone.plz, PLZ);
            assert_eq!(reservation.slot_pair.slot_ids(), vec!["slot-1", "slot-2"]);
        }
        other => panic!("expected a booking, got {other:?}"),
    }

    assert_eq!(engine.state(), EngineState::Booked);
    assert_eq!(notifier.titles(), vec!["Appointment booked"]);
    assert_eq!(notifier.cues.load(Ordering::SeqCst), 1);
    assert_eq!(launcher.launch_count(), 0);

    // Terminal: no further requests
    assert_eq!(engine.step().await.unwrap(), IterationOutcome::Finished);
}

#[tokio::test]
async fn test_run_returns_booking() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .respond_with(ResponseTemplate::new(200).set_body_json(offer()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/buchung"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let mut engine = engine(
        &server,
        &[CODE_A],
        json!({}),
        Arc::new(ScriptedLauncher::failing()),
        Arc::new(RecordingNotifier::default()),
    )
    .await;

    let outcome = engine.run().await.unwrap();
    assert!(matches!(outcome, Outcome::Booked(ref r) if r.zone.plz == PLZ));
}

#[tokio::test]
async fn test_excluded_weekday_cools_code_down() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .respond_with(ResponseTemplate::new(200).set_body_json(offer()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/buchung"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    // Both offered slots fall on a Tuesday
    let window = json!({"wochentage": ["Mo"], "einhalten_bei": "beide"});
    let mut engine = engine(
        &server,
        &[CODE_A],
        window,
        Arc::new(ScriptedLauncher::failing()),
        notifier.clone(),
    )
    .await;

    let before = Utc::now();
    assert_eq!(engine.step().await.unwrap(), IterationOutcome::TimeframeMissed);
    let after = Utc::now();

    let host = engine.targets()[0].host_url.clone();
    let codes = engine.pool().codes(&host);
    assert_eq!(codes.len(), 1);
    assert!(codes[0].next_usable_at >= before + chrono::Duration::minutes(10));
    assert!(codes[0].next_usable_at <= after + chrono::Duration::minutes(10));

    assert_eq!(engine.state(), EngineState::Searching);
    assert!(notifier.titles().is_empty());

    // Code is parked, the next iteration does not search
    assert_eq!(engine.step().await.unwrap(), IterationOutcome::NoUsableCode);
}

#[tokio::test]
async fn test_unauthorized_code_is_dropped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .and(header("authorization", AUTH_A))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .and(header("authorization", AUTH_B))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"termine": []})))
        .mount(&server)
        .await;

    let mut engine = engine(
        &server,
        &[CODE_A, CODE_B],
        json!({}),
        Arc::new(ScriptedLauncher::failing()),
        Arc::new(RecordingNotifier::default()),
    )
    .await;
    let host = engine.targets()[0].host_url.clone();

    assert_eq!(engine.step().await.unwrap(), IterationOutcome::CodeRemoved);
    for _ in 0..3 {
        assert_eq!(engine.step().await.unwrap(), IterationOutcome::NothingFound);
    }

    let codes: Vec<String> = engine.pool().codes(&host).into_iter().map(|c| c.code).collect();
    assert_eq!(codes, vec![CODE_B]);
}

#[tokio::test]
async fn test_all_codes_rejected_ends_run() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let mut engine = engine(
        &server,
        &[CODE_A],
        json!({}),
        Arc::new(ScriptedLauncher::failing()),
        Arc::new(RecordingNotifier::default()),
    )
    .await;

    assert_eq!(engine.run().await.unwrap(), Outcome::CodesExhausted);
    assert!(engine.codes_exhausted());
}

#[tokio::test]
async fn test_repeated_conflicts_skip_zone() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .respond_with(ResponseTemplate::new(200).set_body_json(offer()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/buchung"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{"code": "WP011", "text": "Termin nicht mehr verfügbar"}]
        })))
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.search.gone_streak_limit = 2;
    let mut engine = Terminsuche::builder(profile(&[CODE_A, CODE_B], &[PLZ], json!({})), config)
        .catalog(catalog(&server.uri(), &[PLZ]))
        .launcher(Arc::new(ScriptedLauncher::failing()))
        .notifier(Arc::new(RecordingNotifier::default()))
        .build()
        .await
        .unwrap();

    assert_eq!(engine.step().await.unwrap(), IterationOutcome::AppointmentGone);
    assert!(!engine.is_zone_skipped(PLZ));
    assert_eq!(engine.step().await.unwrap(), IterationOutcome::AppointmentGone);
    assert!(engine.is_zone_skipped(PLZ));
    assert_eq!(engine.step().await.unwrap(), IterationOutcome::ZoneSkipped);
}

#[tokio::test]
async fn test_conflict_keeps_code_cooled_down() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .respond_with(ResponseTemplate::new(200).set_body_json(offer()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/buchung"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{"code": "WP009", "text": "Termin bereits vergeben"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = engine(
        &server,
        &[CODE_A, CODE_B],
        json!({}),
        Arc::new(ScriptedLauncher::failing()),
        notifier.clone(),
    )
    .await;

    let before = Utc::now();
    assert_eq!(engine.step().await.unwrap(), IterationOutcome::AppointmentGone);
    let after = Utc::now();

    let host = engine.targets()[0].host_url.clone();
    let codes = engine.pool().codes(&host);
    assert_eq!(codes.len(), 2);
    let cooled = codes.iter().find(|c| c.code == CODE_A).unwrap();
    assert!(cooled.next_usable_at >= before + chrono::Duration::minutes(10));
    assert!(cooled.next_usable_at <= after + chrono::Duration::minutes(10));
    assert_eq!(engine.pool().usable(&host).unwrap().code, CODE_B);

    assert_eq!(engine.state(), EngineState::Searching);
    assert_eq!(notifier.titles(), vec!["Appointment no longer available"]);
}

#[tokio::test]
async fn test_failed_booking_is_announced() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .respond_with(ResponseTemplate::new(200).set_body_json(offer()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/buchung"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let launcher = Arc::new(ScriptedLauncher::failing());
    let mut engine = engine(
        &server,
        &[CODE_A],
        json!({}),
        launcher.clone(),
        notifier.clone(),
    )
    .await;

    assert_eq!(engine.step().await.unwrap(), IterationOutcome::Failed);
    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(engine.state(), EngineState::Searching);
    assert_eq!(notifier.titles(), vec!["Appointment could not be booked"]);
}

#[tokio::test]
async fn test_bot_mitigation_renews_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .and(header(
            "cookie",
            "akavpau_User_allowed=1700000000~id=abc; bm_sz=A1B2C3D4E5F6G7H8",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"termine": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let launcher = Arc::new(ScriptedLauncher::with_cookies());
    let mut engine = engine(
        &server,
        &[CODE_A],
        json!({}),
        launcher.clone(),
        Arc::new(RecordingNotifier::default()),
    )
    .await;

    assert_eq!(engine.step().await.unwrap(), IterationOutcome::SessionRenewed);
    assert_eq!(launcher.launch_count(), 1);
    let session = engine.session().unwrap();
    assert!(session.contains("bm_sz"));
    assert!(!session.contains("_ga"));

    assert_eq!(engine.step().await.unwrap(), IterationOutcome::NothingFound);
}

#[tokio::test]
async fn test_failed_renewal_keeps_searching() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let launcher = Arc::new(ScriptedLauncher::without_cookies());
    let mut engine = engine(
        &server,
        &[CODE_A],
        json!({}),
        launcher.clone(),
        Arc::new(RecordingNotifier::default()),
    )
    .await;

    assert_eq!(engine.step().await.unwrap(), IterationOutcome::Failed);
    assert!(engine.session().is_none());
    assert_eq!(engine.state(), EngineState::Searching);
}

#[tokio::test]
async fn test_server_error_is_logged_and_ignored() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let mut engine = engine(
        &server,
        &[CODE_A],
        json!({}),
        Arc::new(ScriptedLauncher::failing()),
        Arc::new(RecordingNotifier::default()),
    )
    .await;
    let host = engine.targets()[0].host_url.clone();

    assert_eq!(engine.step().await.unwrap(), IterationOutcome::Failed);
    assert!(engine.pool().usable(&host).is_some());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let server = MockServer::start().await;
    let (handle, signal) = shutdown::channel();

    let mut engine = Terminsuche::builder(profile(&[CODE_A], &[PLZ], json!({})), test_config(&server.uri()))
        .catalog(catalog(&server.uri(), &[PLZ]))
        .launcher(Arc::new(ScriptedLauncher::failing()))
        .notifier(Arc::new(RecordingNotifier::default()))
        .shutdown(signal)
        .build()
        .await
        .unwrap();

    handle.shutdown();
    assert!(matches!(engine.step().await, Err(Error::Cancelled)));
    assert_eq!(engine.run().await.unwrap(), Outcome::Cancelled);
}

#[tokio::test]
async fn test_unknown_zone_is_rejected_before_search() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/suche/impfterminsuche"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = Terminsuche::builder(profile(&[CODE_A], &["10115"], json!({})), test_config(&server.uri()))
        .catalog(catalog(&server.uri(), &[PLZ]))
        .launcher(Arc::new(ScriptedLauncher::failing()))
        .build()
        .await;

    match result {
        Err(Error::Validation(e)) => assert_eq!(e.key, "plz_impfzentren"),
        Err(other) => panic!("expected a validation error, got {other}"),
        Ok(_) => panic!("expected a validation error"),
    }
}

#[tokio::test]
async fn test_catalog_is_downloaded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/assets/static/impfzentren.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Baden-Württemberg": [{
                "PLZ": PLZ,
                "Zentrumsname": "Landesmesse Stuttgart",
                "Ort": "Stuttgart",
                "URL": format!("{}/", server.uri()),
                "Bundesland": "Baden-Württemberg",
                "Adresse": "Messepiazza 1"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = Terminsuche::builder(profile(&[CODE_A], &[PLZ], json!({})), test_config(&server.uri()))
        .launcher(Arc::new(ScriptedLauncher::failing()))
        .notifier(Arc::new(RecordingNotifier::default()))
        .build()
        .await
        .unwrap();

    assert_eq!(engine.targets().len(), 1);
    assert_eq!(engine.targets()[0].name, "Landesmesse Stuttgart");
    let host = engine.targets()[0].host_url.clone();
    assert_eq!(engine.pool().len(&host), 1);
}

#[tokio::test]
async fn test_unavailable_catalog_is_fatal_after_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/assets/static/impfzentren.json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.search.catalog_max_attempts = 2;
    let result = Terminsuche::builder(profile(&[CODE_A], &[PLZ], json!({})), config)
        .launcher(Arc::new(ScriptedLauncher::failing()))
        .build()
        .await;

    assert!(matches!(result, Err(Error::CatalogUnavailable { .. })));
}
