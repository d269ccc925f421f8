//! Outbound notifications
//!
//! The engine reports a finished booking through a single [`Notifier`]. Real
//! channels (desktop popups, push services, chat bots) live outside this
//! crate; [`LogNotifier`] writes to the log and rings the terminal bell.

use async_trait::async_trait;
use std::io::Write;
use tracing::{info, warn};

/// Result type for notifier operations
pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel temporarily unavailable
    #[error("Notifier unavailable: {0}")]
    Unavailable(String),

    #[error("Notifier error: {0}")]
    Other(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver a message
    async fn notify(&self, title: &str, message: &str) -> NotifyResult<()>;

    /// Short audible cue; slots were just offered
    fn cue(&self) {}
}

/// Send and swallow failures; notifications never abort the engine
pub async fn notify_best_effort(notifier: &dyn Notifier, title: &str, message: &str) {
    if let Err(e) = notifier.notify(title, message).await {
        warn!(notifier = notifier.name(), error = %e, "Notification failed");
    }
}

/// Logs notifications; the cue is the terminal bell
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    bell: bool,
}

impl LogNotifier {
    pub fn new(bell: bool) -> Self {
        Self { bell }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, title: &str, message: &str) -> NotifyResult<()> {
        info!(title = %title, "{message}");
        Ok(())
    }

    fn cue(&self) {
        if self.bell {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(b"\x07");
            let _ = stderr.flush();
        }
    }
}
