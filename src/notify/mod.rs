//! Alert notification sinks.
//!
//! A `Notifier` delivers an alert message (and a best-effort evidence still)
//! to an external channel. Notifier failures are isolated: the dispatcher
//! logs them and neither the archiver nor the capture/analysis path is
//! affected.

pub mod telegram;

use std::time::SystemTime;

use anyhow::Result;

pub use telegram::{TelegramConfig, TelegramNotifier};

pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver one alert. `evidence_image` is an optional JPEG of the most
    /// recent frame; delivery of the image is best-effort and must not fail
    /// the message itself.
    fn notify(
        &self,
        message: &str,
        timestamp: SystemTime,
        evidence_image: Option<&[u8]>,
    ) -> Result<()>;
}

/// Notifier that only writes to the log. Default when no external channel is
/// configured; also keeps demo runs self-contained.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(
        &self,
        message: &str,
        _timestamp: SystemTime,
        evidence_image: Option<&[u8]>,
    ) -> Result<()> {
        log::warn!(
            "notification ({} byte evidence image): {}",
            evidence_image.map(|img| img.len()).unwrap_or(0),
            message
        );
        Ok(())
    }
}
