//! Access code issuance against a mock backend

use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use terminjaeger::api::ApiClient;
use terminjaeger::codegen::{CodeRequest, CodeRequester};
use terminjaeger::cookies::CookieProvider;
use terminjaeger::error::Error;
use terminjaeger::models::Zone;
use terminjaeger::utils::shutdown::ShutdownSignal;

use crate::common::{test_config, zone, ScriptedLauncher};

const COOKIE: &str = "akavpau_User_allowed=1700000000~id=abc; bm_sz=A1B2C3D4E5F6G7H8";

fn requester(server: &MockServer, launcher: Arc<ScriptedLauncher>) -> CodeRequester {
    let config = test_config(&server.uri());
    let api = Arc::new(ApiClient::new(&config).unwrap());
    let cookies = Arc::new(CookieProvider::new(launcher, &config));
    CodeRequester::new(api, cookies, &config)
}

fn target(server: &MockServer) -> Zone {
    zone(&format!("{}/", server.uri()), "69123")
}

fn request() -> CodeRequest {
    CodeRequest {
        plz: "69123".to_string(),
        email: "erika@example.org".to_string(),
        phone: "+4915112345678".to_string(),
        birthday: NaiveDate::from_ymd_opt(1970, 11, 30).unwrap(),
    }
}

#[tokio::test]
async fn test_request_and_verify() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/smspin/anforderung"))
        .and(header("cookie", COOKIE))
        .and(body_json(json!({
            "plz": "69123",
            "email": "erika@example.org",
            "phone": "+4915112345678",
            "birthday": "1970-11-30",
            "einzeltermin": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-123"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/smspin/verifikation"))
        .and(body_json(json!({"token": "tok-123", "smspin": "111111"})))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/smspin/verifikation"))
        .and(body_json(json!({"token": "tok-123", "smspin": "424242"})))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let launcher = Arc::new(ScriptedLauncher::with_cookies());
    let requester = requester(&server, launcher.clone());
    let shutdown = ShutdownSignal::never();

    let mut pending = requester
        .request(&target(&server), &request(), &shutdown)
        .await
        .unwrap();
    assert_eq!(pending.token, "tok-123");

    assert!(!requester.verify(&mut pending, "111111", &shutdown).await.unwrap());
    assert!(requester.verify(&mut pending, " 424242\n", &shutdown).await.unwrap());

    // Cookies of the request are reused for verification
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test]
async fn test_request_limit_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/smspin/anforderung"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "Anfragelimit erreicht."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let requester = requester(&server, Arc::new(ScriptedLauncher::with_cookies()));
    let err = requester
        .request(&target(&server), &request(), &ShutdownSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestLimitReached));
}

#[tokio::test]
async fn test_blocked_request_regenerates_cookies() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/smspin/anforderung"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/smspin/anforderung"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-456"})))
        .mount(&server)
        .await;

    let launcher = Arc::new(ScriptedLauncher::with_cookies());
    let requester = requester(&server, launcher.clone());

    let pending = requester
        .request(&target(&server), &request(), &ShutdownSignal::never())
        .await
        .unwrap();
    assert_eq!(pending.token, "tok-456");
    assert_eq!(launcher.launch_count(), 2);
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/smspin/anforderung"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/smspin/anforderung"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-789"})))
        .mount(&server)
        .await;

    let launcher = Arc::new(ScriptedLauncher::with_cookies());
    let requester = requester(&server, launcher.clone());

    let pending = requester
        .request(&target(&server), &request(), &ShutdownSignal::never())
        .await
        .unwrap();
    assert_eq!(pending.token, "tok-789");
    assert_eq!(launcher.launch_count(), 1);
}

#[test]
fn test_request_validation() {
    assert!(request().validate().is_ok());

    let mut bad = request();
    bad.email = "erika+impf@example.org".to_string();
    assert_eq!(bad.validate().unwrap_err().key, "notificationReceiver");

    let mut bad = request();
    bad.phone = "015112345678".to_string();
    assert_eq!(bad.validate().unwrap_err().key, "phone");
}
