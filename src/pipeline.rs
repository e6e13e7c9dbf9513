//! Pipeline wiring and the capture loop.
//!
//! Ownership layout: the capture loop is the single writer of the window
//! buffer; the scheduler thread takes snapshots; the cooldown gate and the
//! scheduler's busy flag are the only other shared mutable values, both
//! atomic. Each pipeline instance owns its own cooldown gate, so a recorded
//! replay run never shares alert debouncing with a live camera run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::alert::{AlertDispatcher, AlertHistory};
use crate::classify::{Classifier, VerdictParser};
use crate::config::FallwatchConfig;
use crate::cooldown::CooldownGate;
use crate::evidence::EvidenceArchiver;
use crate::frame::SlidingWindowBuffer;
use crate::ingest::FrameSource;
use crate::notify::Notifier;
use crate::schedule::{AnalysisScheduler, SchedulerConfig, SchedulerStats};
use crate::workers::WorkerPool;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct PipelineReport {
    pub frames_captured: u64,
    pub alerts: usize,
    pub scheduler: SchedulerStats,
}

pub struct Pipeline {
    buffer: Arc<Mutex<SlidingWindowBuffer>>,
    scheduler: AnalysisScheduler,
    history: Arc<AlertHistory>,
}

impl Pipeline {
    pub fn new(
        cfg: &FallwatchConfig,
        classifier: Arc<dyn Classifier>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        let buffer = Arc::new(Mutex::new(SlidingWindowBuffer::new(cfg.window_duration)));
        let history = Arc::new(AlertHistory::new(cfg.history_limit));
        let pool = Arc::new(WorkerPool::new(cfg.worker_threads, cfg.worker_queue_depth));
        let archiver = Arc::new(EvidenceArchiver::new(
            cfg.evidence_root.clone(),
            cfg.save_formats.clone(),
        ));
        let detection_method = classifier.name();
        let dispatcher = Arc::new(AlertDispatcher::new(
            history.clone(),
            pool,
            notifier,
            Some(archiver),
            cfg.source_url.clone(),
            detection_method,
        ));
        let scheduler = AnalysisScheduler::new(
            SchedulerConfig {
                interval: cfg.analysis_interval,
                max_frames_per_analysis: cfg.max_frames_per_analysis,
            },
            buffer.clone(),
            classifier,
            VerdictParser::new(&cfg.positive_marker, &cfg.negative_marker),
            Arc::new(CooldownGate::new(cfg.cooldown)),
            dispatcher,
        );
        Self {
            buffer,
            scheduler,
            history,
        }
    }

    pub fn history(&self) -> Arc<AlertHistory> {
        self.history.clone()
    }

    /// Run the capture loop until the source ends, it fails, or `shutdown`
    /// is set.
    ///
    /// Only a failing source is an error: it terminates the pipeline with no
    /// automatic restart. On any exit the scheduler thread is stopped and
    /// joined; an in-flight analysis and any queued sink jobs are left to
    /// run to completion on their own threads.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        shutdown: Arc<AtomicBool>,
    ) -> Result<PipelineReport> {
        log::info!("pipeline running, source {}", source.name());
        let scheduler_handle = self.scheduler.spawn(shutdown.clone());

        let mut frames_captured = 0u64;
        let mut last_health = Instant::now();
        let outcome = loop {
            if shutdown.load(Ordering::SeqCst) {
                log::info!("shutdown requested, stopping capture");
                break Ok(());
            }
            match source.next_frame() {
                Ok(Some(frame)) => {
                    frames_captured += 1;
                    let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
                    buffer.append(frame);
                }
                Ok(None) => {
                    log::info!("frame source ended after {} frames", frames_captured);
                    break Ok(());
                }
                Err(e) => {
                    break Err(anyhow!("frame source unavailable: {:#}", e));
                }
            }
            if last_health.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.scheduler.stats();
                let buffered = self.buffer.lock().unwrap_or_else(|p| p.into_inner()).len();
                log::info!(
                    "health: frames={} buffered={} analyses={} dropped_ticks={} alerts={}",
                    frames_captured,
                    buffered,
                    stats.analyses,
                    stats.dropped_ticks,
                    self.history.len()
                );
                last_health = Instant::now();
            }
        };

        // Stop the tick loop; the capture loop owns the source and releases
        // it deterministically by returning.
        shutdown.store(true, Ordering::SeqCst);
        if scheduler_handle.join().is_err() {
            log::error!("scheduler thread panicked");
        }

        outcome.map(|_| PipelineReport {
            frames_captured,
            alerts: self.history.len(),
            scheduler: self.scheduler.stats(),
        })
    }
}
