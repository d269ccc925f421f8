//! Cookie generation with a scripted browser

use std::sync::Arc;

use terminjaeger::config::Config;
use terminjaeger::cookies::CookieProvider;
use terminjaeger::error::Error;
use terminjaeger::utils::shutdown::{self, ShutdownSignal};

use crate::common::{zone, ScriptedLauncher};

fn config() -> Config {
    let mut config = Config::default();
    config.browser.manual_window_secs = 0;
    config.browser.pointer_moves = 0;
    config
}

#[tokio::test]
async fn test_acquire_keeps_required_cookies() {
    let launcher = Arc::new(ScriptedLauncher::with_cookies());
    let provider = CookieProvider::new(launcher.clone(), &config());
    let zone = zone("https://001-iz.impfterminservice.de/", "70174");

    let session = provider
        .acquire(&zone, false, &ShutdownSignal::never())
        .await
        .unwrap();

    assert_eq!(session.len(), 2);
    assert_eq!(session.get("bm_sz"), Some("A1B2C3D4E5F6G7H8"));
    assert!(session.contains("akavpau_User_allowed"));
    assert!(session.missing_required().is_empty());

    let calls = launcher.log.calls();
    assert_eq!(
        calls[0],
        "goto https://001-iz.impfterminservice.de/impftermine/service?plz=70174"
    );
    assert!(calls.iter().any(|c| c.starts_with("enter_code VACC-IPY")));
    assert_eq!(calls.last().map(String::as_str), Some("close"));
}

#[tokio::test]
async fn test_missing_cookie_fails() {
    let launcher = Arc::new(ScriptedLauncher::without_cookies());
    let provider = CookieProvider::new(launcher.clone(), &config());
    let zone = zone("https://001-iz.impfterminservice.de/", "70174");

    let err = provider
        .acquire(&zone, true, &ShutdownSignal::never())
        .await
        .unwrap_err();

    match err {
        Error::CookieGenerationFailed { reason } => assert!(reason.contains("bm_sz")),
        other => panic!("expected CookieGenerationFailed, got {other}"),
    }
    assert!(launcher.log.contains("close"));
}

#[tokio::test]
async fn test_launch_failure() {
    let provider = CookieProvider::new(Arc::new(ScriptedLauncher::failing()), &config());
    let zone = zone("https://001-iz.impfterminservice.de/", "70174");

    let err = provider
        .acquire(&zone, false, &ShutdownSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CookieGenerationFailed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_manual_window_is_cancellable() {
    let mut config = config();
    config.browser.manual_window_secs = 3600;
    let launcher = Arc::new(ScriptedLauncher::with_cookies());
    let provider = CookieProvider::new(launcher.clone(), &config);
    let zone = zone("https://001-iz.impfterminservice.de/", "70174");
    let (handle, signal) = shutdown::channel();

    let task = tokio::spawn(async move { provider.acquire(&zone, true, &signal).await });
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    handle.shutdown();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(launcher.log.contains("close"));
}
