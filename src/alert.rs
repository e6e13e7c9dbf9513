//! Alert dispatch and history.
//!
//! The dispatcher is invoked only with a positive verdict that has already
//! passed the cooldown gate. It performs one synchronous action (structured
//! log plus history append) and hands the notifier and archiver jobs to the
//! bounded worker pool, returning immediately. Sink failures stay inside
//! their jobs: a dead notifier cannot affect the archiver, and neither can
//! reach back into the capture or analysis path.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::classify::Verdict;
use crate::evidence::EvidenceArchiver;
use crate::frame::AnalysisRequest;
use crate::notify::Notifier;
use crate::workers::WorkerPool;

// ----------------------------------------------------------------------------
// History
// ----------------------------------------------------------------------------

/// One accepted alert. The only place a verdict outlives its dispatch.
#[derive(Clone, Debug)]
pub struct AlertEvent {
    pub verdict: Verdict,
    pub evidence_ref: Option<PathBuf>,
    pub created_at: SystemTime,
}

/// In-memory append-only alert history. Process lifetime only; the length
/// bound is a configuration concern, not a correctness one.
pub struct AlertHistory {
    events: Mutex<Vec<AlertEvent>>,
    limit: usize,
}

impl AlertHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            limit: limit.max(1),
        }
    }

    pub fn append(&self, event: AlertEvent) {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        if events.len() == self.limit {
            events.remove(0);
        }
        events.push(event);
    }

    /// Copy of the history for display or export.
    pub fn snapshot(&self) -> Vec<AlertEvent> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

pub struct AlertDispatcher {
    history: Arc<AlertHistory>,
    pool: Arc<WorkerPool>,
    notifier: Option<Arc<dyn Notifier>>,
    archiver: Option<Arc<EvidenceArchiver>>,
    source: String,
    detection_method: String,
}

impl AlertDispatcher {
    pub fn new(
        history: Arc<AlertHistory>,
        pool: Arc<WorkerPool>,
        notifier: Option<Arc<dyn Notifier>>,
        archiver: Option<Arc<EvidenceArchiver>>,
        source: impl Into<String>,
        detection_method: impl Into<String>,
    ) -> Self {
        Self {
            history,
            pool,
            notifier,
            archiver,
            source: source.into(),
            detection_method: detection_method.into(),
        }
    }

    /// Fan an accepted positive verdict out to the sinks.
    ///
    /// Synchronous part: alert log line and history append. Everything else
    /// is queued on the worker pool; this method never waits on a sink.
    pub fn dispatch(&self, verdict: Verdict, request: &AnalysisRequest) {
        let created_at = verdict.produced_at;
        let stamp: DateTime<Utc> = created_at.into();
        let evidence_ref = self
            .archiver
            .as_ref()
            .map(|archiver| archiver.destination_for(request.taken_at));

        log::warn!(
            "ALERT at {}: source={} method={} detail={:?}",
            stamp.format("%Y-%m-%d %H:%M:%S"),
            self.source,
            self.detection_method,
            verdict.raw_text
        );
        self.history.append(AlertEvent {
            verdict: verdict.clone(),
            evidence_ref,
            created_at,
        });

        if let Some(notifier) = &self.notifier {
            let notifier = notifier.clone();
            let message = self.compose_message(&verdict, stamp);
            let evidence_image = request.frames.last().cloned();
            let submitted = self.pool.submit("notify", move || {
                let image = evidence_image.as_ref().map(|frame| frame.jpeg());
                if let Err(e) = notifier.notify(&message, created_at, image) {
                    log::error!("{} notifier failed: {:#}", notifier.name(), e);
                }
            });
            if let Err(e) = submitted {
                log::warn!("notification skipped: {}", e);
            }
        }

        if let Some(archiver) = &self.archiver {
            let archiver = archiver.clone();
            let frames = request.frames.clone();
            let taken_at = request.taken_at;
            let source = self.source.clone();
            let method = self.detection_method.clone();
            let submitted = self.pool.submit("archive", move || {
                if let Err(e) = archiver.archive(&frames, taken_at, &source, &method) {
                    log::error!("evidence archival failed: {:#}", e);
                }
            });
            if let Err(e) = submitted {
                log::warn!("evidence archival skipped: {}", e);
            }
        }
    }

    fn compose_message(&self, verdict: &Verdict, stamp: DateTime<Utc>) -> String {
        format!(
            "FALL ALERT\n\nTime: {}\nSource: {}\nDetail: {}\n\nPlease check immediately.",
            stamp.format("%Y-%m-%d %H:%M:%S"),
            self.source,
            verdict.raw_text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Verdict, VerdictKind};
    use crate::evidence::SaveFormat;
    use crate::frame::Frame;
    use crate::notify::Notifier;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, UNIX_EPOCH};

    struct CountingNotifier {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Notifier for CountingNotifier {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn notify(
            &self,
            _message: &str,
            _timestamp: SystemTime,
            _evidence_image: Option<&[u8]>,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow::anyhow!("transport down"))
            } else {
                Ok(())
            }
        }
    }

    fn positive_verdict(secs: u64) -> Verdict {
        Verdict {
            kind: VerdictKind::Positive,
            raw_text: "FALL_DETECTED: test".to_string(),
            produced_at: UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    fn request(secs: u64) -> AnalysisRequest {
        AnalysisRequest {
            frames: vec![Frame::new(
                vec![1, 2, 3],
                UNIX_EPOCH + Duration::from_secs(secs),
                0,
            )],
            taken_at: UNIX_EPOCH + Duration::from_secs(secs),
        }
    }

    #[test]
    fn dispatch_appends_history_synchronously() {
        let history = Arc::new(AlertHistory::new(8));
        let pool = Arc::new(WorkerPool::new(1, 4));
        let dispatcher =
            AlertDispatcher::new(history.clone(), pool, None, None, "cam", "stub");

        dispatcher.dispatch(positive_verdict(100), &request(100));

        assert_eq!(history.len(), 1);
        let event = &history.snapshot()[0];
        assert_eq!(event.verdict.kind, VerdictKind::Positive);
        assert!(event.evidence_ref.is_none());
    }

    #[test]
    fn notifier_failure_does_not_block_archiver() {
        let root = tempfile::tempdir().unwrap();
        let history = Arc::new(AlertHistory::new(8));
        let pool = Arc::new(WorkerPool::new(2, 8));
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let archiver = Arc::new(EvidenceArchiver::new(
            root.path(),
            vec![SaveFormat::Still],
        ));
        let dispatcher = AlertDispatcher::new(
            history.clone(),
            pool.clone(),
            Some(notifier.clone()),
            Some(archiver.clone()),
            "cam",
            "stub",
        );

        let req = request(100);
        dispatcher.dispatch(positive_verdict(100), &req);
        // Drain the pool so both sink jobs have run.
        drop(dispatcher);
        match Arc::try_unwrap(pool) {
            Ok(pool) => pool.stop(),
            Err(_) => panic!("pool still shared"),
        }

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
        let evidence_dir = archiver.destination_for(req.taken_at);
        assert!(evidence_dir.join("manifest.txt").exists());
        assert_eq!(
            history.snapshot()[0].evidence_ref.as_deref(),
            Some(evidence_dir.as_path())
        );
    }

    #[test]
    fn history_is_bounded() {
        let history = AlertHistory::new(2);
        for s in 0..5 {
            history.append(AlertEvent {
                verdict: positive_verdict(s),
                evidence_ref: None,
                created_at: UNIX_EPOCH + Duration::from_secs(s),
            });
        }
        let events = history.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].created_at,
            UNIX_EPOCH + Duration::from_secs(4)
        );
    }
}
